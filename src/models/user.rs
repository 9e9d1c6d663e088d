//! User model for the local session snapshot and the remote profile store.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::Badge;

/// Level assigned to a freshly created user.
pub const STARTING_LEVEL: u32 = 1;

/// Display name used when neither the provider nor the email yields one.
pub const FALLBACK_DISPLAY_NAME: &str = "User";

/// Signed-in user profile.
///
/// Stored in the local snapshot and at `profiles/{id}` in Firestore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Provider user ID (stable across sign-ins)
    pub id: String,
    /// Email address (empty when the provider did not share one)
    pub email: String,
    /// Display name
    pub name: String,
    /// Avatar image reference
    #[serde(default)]
    pub avatar: Option<String>,

    // ─── Progress ────────────────────────────────────────────────
    /// Free-text learning goals
    #[serde(default)]
    pub learning_goals: Vec<String>,
    /// Cumulative score across sessions
    #[serde(default)]
    pub total_score: u64,
    /// Number of completed coaching sessions
    #[serde(default)]
    pub completed_sessions: u32,
    /// Cumulative time spent in sessions (seconds)
    #[serde(default)]
    pub time_spent_secs: u64,
    /// Badges in the order they were earned
    #[serde(default)]
    pub badges: Vec<Badge>,
    #[serde(default = "starting_level")]
    pub current_level: u32,
}

fn starting_level() -> u32 {
    STARTING_LEVEL
}

impl User {
    /// Create a user with no recorded progress.
    pub fn new(id: impl Into<String>, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
            avatar: None,
            learning_goals: Vec::new(),
            total_score: 0,
            completed_sessions: 0,
            time_spent_secs: 0,
            badges: Vec::new(),
            current_level: STARTING_LEVEL,
        }
    }

    /// Uppercased first character of the name, for avatar placeholders.
    pub fn initial(&self) -> String {
        self.name
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_else(|| "U".to_string())
    }

    /// Total time spent as a `Duration`.
    pub fn time_spent(&self) -> Duration {
        Duration::from_secs(self.time_spent_secs)
    }

    /// Record one completed session.
    pub fn record_session(&mut self, score: u64, duration: Duration) {
        self.total_score = self.total_score.saturating_add(score);
        self.completed_sessions = self.completed_sessions.saturating_add(1);
        self.time_spent_secs = self.time_spent_secs.saturating_add(duration.as_secs());
    }

    /// Append a badge unless one with the same ID was already earned.
    ///
    /// Returns `true` if the badge was added.
    pub fn award_badge(&mut self, badge: Badge) -> bool {
        if self.has_badge(&badge.id) {
            return false;
        }
        self.badges.push(badge);
        true
    }

    pub fn has_badge(&self, badge_id: &str) -> bool {
        self.badges.iter().any(|b| b.id == badge_id)
    }
}

/// Display name derived from an email address: its local part.
///
/// Empty local parts fall back to [`FALLBACK_DISPLAY_NAME`].
pub fn name_from_email(email: &str) -> String {
    email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .unwrap_or(FALLBACK_DISPLAY_NAME)
        .to_string()
}
