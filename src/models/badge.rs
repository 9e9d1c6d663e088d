// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Earned achievement badges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A badge earned by a user. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Icon asset reference
    pub icon_name: String,
    pub earned_at: DateTime<Utc>,
}

impl Badge {
    /// Create a badge earned now.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        icon_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            icon_name: icon_name.into(),
            earned_at: Utc::now(),
        }
    }
}
