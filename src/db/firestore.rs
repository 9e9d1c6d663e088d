// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed [`ProfileStore`].
//!
//! Profiles live at `profiles/{user_id}` and are written whole on every
//! change, so the last writer wins.

use async_trait::async_trait;

use crate::db::{collections, ProfileStore};
use crate::error::StorageError;
use crate::models::User;

/// Profile store over a Firestore project, or an offline stand-in.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Connect to `project_id` with application default credentials.
    ///
    /// With FIRESTORE_EMULATOR_HOST set, connects to the emulator instead.
    pub async fn new(project_id: &str) -> Result<Self, StorageError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
            StorageError::Database(format!("Firestore connection failed: {e}"))
        })?;

        tracing::info!(project = project_id, "Profile store connected");

        Ok(Self {
            client: Some(client),
        })
    }

    /// The emulator accepts any bearer token, so skip credential discovery.
    async fn create_emulator_client(project_id: &str) -> Result<Self, StorageError> {
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            StorageError::Database(format!("Firestore emulator connection failed: {e}"))
        })?;

        tracing::info!(project = project_id, "Profile store connected to emulator");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Store with no connection; every call fails with a database error.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, StorageError> {
        self.client.as_ref().ok_or_else(|| {
            StorageError::Database("Database not connected (offline mode)".to_string())
        })
    }
}

#[async_trait]
impl ProfileStore for FirestoreDb {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<User>, StorageError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PROFILES)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn save_profile(&self, user: &User) -> Result<(), StorageError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PROFILES)
            .document_id(&user.id)
            .object(user)
            .execute()
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_profile(&self, user_id: &str) -> Result<(), StorageError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::PROFILES)
            .document_id(user_id)
            .execute()
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }
}
