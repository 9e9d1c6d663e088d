//! Remote profile store (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::models::User;

/// Collection names as constants.
pub mod collections {
    /// User profiles keyed by provider user ID
    pub const PROFILES: &str = "profiles";
}

/// Durable copy of user profiles that follows the user across installs.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<User>, StorageError>;

    async fn save_profile(&self, user: &User) -> Result<(), StorageError>;

    async fn delete_profile(&self, user_id: &str) -> Result<(), StorageError>;
}
