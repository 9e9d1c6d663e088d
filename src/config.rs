// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honored for local development.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const DEFAULT_SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";
const DEFAULT_APPLE_REDIRECT_URI: &str = "https://localhost/auth/apple/callback";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Client configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Identity provider ---
    /// Firebase Web API key
    pub firebase_api_key: String,
    /// Identity Toolkit base URL (overridable for the Auth emulator)
    pub identity_toolkit_url: String,
    /// Secure Token base URL used for ID token refresh
    pub secure_token_url: String,

    // --- Federated sign-in ---
    /// Google OAuth client ID
    pub google_client_id: Option<String>,
    /// Google OAuth client secret (installed apps ship a non-confidential one)
    pub google_client_secret: Option<String>,
    /// Apple services ID
    pub apple_service_id: Option<String>,
    /// Redirect URI registered for the Apple services ID
    pub apple_redirect_uri: String,
    /// Port for the Google loopback redirect (0 picks a free port)
    pub loopback_port: u16,

    // --- Storage ---
    /// Directory holding the local session snapshot
    pub session_dir: PathBuf,
    /// GCP project for Firestore profile mirroring; unset disables it
    pub gcp_project_id: Option<String>,

    /// Timeout applied to every outbound HTTP request
    pub http_timeout: Duration,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            firebase_api_key: "test_api_key".to_string(),
            identity_toolkit_url: "http://127.0.0.1:9099/identitytoolkit.googleapis.com/v1"
                .to_string(),
            secure_token_url: "http://127.0.0.1:9099/securetoken.googleapis.com/v1".to_string(),
            google_client_id: Some("test-client.apps.googleusercontent.com".to_string()),
            google_client_secret: None,
            apple_service_id: Some("com.example.coach.web".to_string()),
            apple_redirect_uri: DEFAULT_APPLE_REDIRECT_URI.to_string(),
            loopback_port: 0,
            session_dir: env::temp_dir().join("coach-session-test"),
            gcp_project_id: None,
            http_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Deterministic configuration for tests.
    pub fn test_default() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let loopback_port = match env::var("OAUTH_LOOPBACK_PORT") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("OAUTH_LOOPBACK_PORT", raw))?,
            Err(_) => 0,
        };

        let http_timeout_secs = match env::var("HTTP_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("HTTP_TIMEOUT_SECS", raw))?,
            Err(_) => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        let session_dir = env::var("SESSION_DIR")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::data_local_dir().map(|dir| dir.join("coach-session")))
            .ok_or(ConfigError::Missing("SESSION_DIR"))?;

        Ok(Self {
            firebase_api_key: env::var("FIREBASE_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("FIREBASE_API_KEY"))?,
            identity_toolkit_url: env::var("IDENTITY_TOOLKIT_URL")
                .unwrap_or_else(|_| DEFAULT_IDENTITY_TOOLKIT_URL.to_string()),
            secure_token_url: env::var("SECURE_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_SECURE_TOKEN_URL.to_string()),
            google_client_id: optional_var("GOOGLE_CLIENT_ID"),
            google_client_secret: optional_var("GOOGLE_CLIENT_SECRET"),
            apple_service_id: optional_var("APPLE_SERVICE_ID"),
            apple_redirect_uri: env::var("APPLE_REDIRECT_URI")
                .unwrap_or_else(|_| DEFAULT_APPLE_REDIRECT_URI.to_string()),
            loopback_port,
            session_dir,
            gcp_project_id: optional_var("GCP_PROJECT_ID"),
            http_timeout: Duration::from_secs(http_timeout_secs),
        })
    }

    /// Build the shared HTTP client with the configured timeout.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder().timeout(self.http_timeout).build()
    }
}

/// Read an env var, treating blank values as unset.
fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
