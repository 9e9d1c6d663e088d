// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local key-value persistence and the session snapshot codec.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::StorageError;
use crate::models::User;

/// Key holding the combined authenticated flag and user snapshot.
pub const SESSION_KEY: &str = "session";

/// Key holding the identity provider's tokens between runs.
pub const PROVIDER_SESSION_KEY: &str = "provider_session";

/// Key holding the Google access token kept for revocation.
pub const GOOGLE_TOKEN_KEY: &str = "google_token";

/// Synchronous, process-local byte store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Read a JSON record.
///
/// Unreadable and absent records are `None`; an undecodable record is
/// also removed.
pub fn load_record<T: DeserializeOwned>(backend: &dyn KeyValueStore, key: &str) -> Option<T> {
    let bytes = match backend.get(key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(error = %e, key, "Failed to read stored record");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(error = %e, key, "Discarding undecodable record");
            if let Err(e) = backend.remove(key) {
                tracing::warn!(error = %e, key, "Failed to remove corrupt record");
            }
            None
        }
    }
}

pub fn save_record<T: Serialize>(
    backend: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(value)?;
    backend.set(key, &bytes)
}

/// Flag and snapshot written as one value so they cannot diverge.
#[derive(Serialize, Deserialize)]
struct SessionRecord {
    authenticated: bool,
    user: User,
}

/// Reads and writes the persisted session.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Restore the signed-in user.
    ///
    /// Absent, unreadable or undecodable records all mean "not signed in".
    pub fn load(&self) -> Option<User> {
        load_record::<SessionRecord>(self.backend.as_ref(), SESSION_KEY)
            .filter(|record| record.authenticated)
            .map(|record| record.user)
    }

    pub fn save(&self, user: &User) -> Result<(), StorageError> {
        let record = SessionRecord {
            authenticated: true,
            user: user.clone(),
        };
        save_record(self.backend.as_ref(), SESSION_KEY, &record)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.backend.remove(SESSION_KEY)
    }
}
