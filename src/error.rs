// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication error taxonomy and storage errors.
//!
//! The `Display` text of every [`AuthError`] is the message shown to the
//! user, so the session manager can surface exactly one string per failure.

use crate::providers::{ProviderError, ProviderErrorKind};

/// Authentication failure as seen by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Please enter both email and password")]
    MissingCredentials,

    #[error("Please fill in all fields")]
    MissingFields,

    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Password should be at least 6 characters")]
    WeakPassword,

    #[error("This email is already registered")]
    EmailAlreadyInUse,

    #[error("No account found with this email")]
    UserNotFound,

    #[error("Incorrect password. Please try again")]
    WrongPassword,

    #[error("Network error. Please check your connection")]
    NetworkError,

    #[error("Invalid state: A login callback was received, but no login request was sent")]
    InvalidState,

    #[error("No user is signed in")]
    NotSignedIn,

    #[error("Failed to sign out: {0}")]
    SignOutFailed(String),

    #[error("{0}")]
    Unknown(String),
}

impl AuthError {
    /// True for failures raised before any provider was contacted.
    pub fn is_local_validation(&self) -> bool {
        matches!(
            self,
            AuthError::MissingCredentials
                | AuthError::MissingFields
                | AuthError::InvalidEmail
                | AuthError::WeakPassword
        )
    }
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        match err.kind {
            ProviderErrorKind::InvalidEmail => AuthError::InvalidEmail,
            ProviderErrorKind::WeakPassword => AuthError::WeakPassword,
            ProviderErrorKind::EmailAlreadyInUse => AuthError::EmailAlreadyInUse,
            ProviderErrorKind::UserNotFound => AuthError::UserNotFound,
            ProviderErrorKind::WrongPassword => AuthError::WrongPassword,
            ProviderErrorKind::Network => AuthError::NetworkError,
            ProviderErrorKind::SessionExpired
            | ProviderErrorKind::Cancelled
            | ProviderErrorKind::Other => AuthError::Unknown(err.message),
        }
    }
}

/// Local or remote persistence failure.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, AuthError>;
