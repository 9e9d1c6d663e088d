// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! External identity capabilities consumed by the session manager.
//!
//! Each capability is a trait so the manager can be driven by the real
//! network clients in this module or by in-process fakes in tests.

pub mod apple;
pub mod google;
pub mod identity_toolkit;
pub mod loopback;
pub mod prompt;

pub use apple::AppleWebBroker;
pub use google::GoogleOAuthClient;
pub use identity_toolkit::IdentityToolkitClient;
pub use prompt::{ConsolePrompt, InteractivePrompt};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// User record as returned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl ProviderUser {
    /// Display name if the provider has a non-blank one on file.
    pub fn known_display_name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// Provider failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    InvalidEmail,
    WeakPassword,
    EmailAlreadyInUse,
    UserNotFound,
    WrongPassword,
    /// Transport failure (connect, timeout, DNS)
    Network,
    /// The provider session is no longer valid (revoked, disabled, expired)
    SessionExpired,
    /// The user abandoned an interactive flow
    Cancelled,
    Other,
}

/// Provider failure with the provider's own message text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Other, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Cancelled, message)
    }

    /// Classify a `reqwest` failure.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            Self::network(err.to_string())
        } else {
            Self::other(err.to_string())
        }
    }
}

/// Token from a federated identity source, exchanged for a provider session.
#[derive(Clone, PartialEq, Eq)]
pub enum FederatedCredential {
    Apple {
        id_token: String,
        /// The unhashed nonce whose SHA-256 is embedded in `id_token`
        raw_nonce: String,
    },
    Google {
        id_token: String,
        access_token: String,
    },
}

impl FederatedCredential {
    pub fn provider_id(&self) -> &'static str {
        match self {
            FederatedCredential::Apple { .. } => "apple.com",
            FederatedCredential::Google { .. } => "google.com",
        }
    }
}

impl fmt::Debug for FederatedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederatedCredential")
            .field("provider_id", &self.provider_id())
            .finish_non_exhaustive()
    }
}

/// Identity claims requested from the platform broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerScope {
    FullName,
    Email,
}

/// A single authorization request to the platform identity broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRequest {
    pub scopes: Vec<BrokerScope>,
    /// Hex SHA-256 of the raw nonce; the broker embeds it in the identity token.
    pub hashed_nonce: String,
}

/// Name components the broker may share on first authorization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonName {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

impl PersonName {
    /// "Given Family", skipping missing or blank parts.
    pub fn formatted(&self) -> String {
        [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a completed broker authorization.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerAuthorization {
    /// Opaque JWT issued by the broker
    pub identity_token: String,
    pub full_name: Option<PersonName>,
    pub email: Option<String>,
}

impl fmt::Debug for BrokerAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerAuthorization")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Tokens issued by the federated OAuth SDK.
#[derive(Clone, PartialEq, Eq)]
pub struct FederatedTokens {
    pub id_token: String,
    pub access_token: String,
}

impl fmt::Debug for FederatedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FederatedTokens { .. }")
    }
}

/// The identity provider that actually authenticates credentials.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderUser, ProviderError>;

    async fn create_user(&self, email: &str, password: &str)
        -> Result<ProviderUser, ProviderError>;

    async fn sign_in_with_credential(
        &self,
        credential: FederatedCredential,
    ) -> Result<ProviderUser, ProviderError>;

    /// Set the display name of the currently signed-in provider user.
    async fn update_display_name(&self, name: &str) -> Result<ProviderUser, ProviderError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Current provider user, updated whenever the provider session changes.
    fn session_changes(&self) -> watch::Receiver<Option<ProviderUser>>;
}

/// Platform identity broker ("Sign in with Apple").
#[async_trait]
pub trait IdentityBroker: Send + Sync {
    async fn authorize(&self, request: BrokerRequest)
        -> Result<BrokerAuthorization, ProviderError>;
}

/// Federated OAuth SDK ("Sign in with Google").
#[async_trait]
pub trait FederatedSignIn: Send + Sync {
    async fn sign_in(&self) -> Result<FederatedTokens, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;
}
