// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase Authentication REST client (Identity Toolkit + Secure Token).
//!
//! Handles:
//! - Password sign-in and sign-up
//! - Federated credential exchange (`accounts:signInWithIdp`)
//! - Display name updates and password-reset dispatch
//! - ID token refresh, ending the session when the refresh token is revoked
//! - Keeping the session across runs when given a token store

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::config::Config;
use crate::providers::{
    FederatedCredential, IdentityProvider, ProviderError, ProviderErrorKind, ProviderUser,
};
use crate::store::{load_record, save_record, KeyValueStore, PROVIDER_SESSION_KEY};

/// Margin before ID token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Lifetime assumed when the provider omits `expiresIn`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// `requestUri` sent with IdP sign-ins from a native client.
const IDP_REQUEST_URI: &str = "http://localhost";

/// Tokens backing the current provider session.
#[derive(Clone, Serialize, Deserialize)]
struct ProviderSession {
    user: ProviderUser,
    id_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

/// Identity Toolkit client holding at most one provider session.
pub struct IdentityToolkitClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    token_url: String,
    session: Mutex<Option<ProviderSession>>,
    changes: watch::Sender<Option<ProviderUser>>,
    tokens: Option<Arc<dyn KeyValueStore>>,
}

impl IdentityToolkitClient {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            http,
            api_key: config.firebase_api_key.clone(),
            base_url: config.identity_toolkit_url.trim_end_matches('/').to_string(),
            token_url: config.secure_token_url.trim_end_matches('/').to_string(),
            session: Mutex::new(None),
            changes,
            tokens: None,
        }
    }

    /// Keep provider tokens in `store`, resuming any session saved there.
    pub fn with_token_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        if let Some(session) = load_record::<ProviderSession>(store.as_ref(), PROVIDER_SESSION_KEY)
        {
            tracing::debug!(uid = %session.user.uid, "Resumed provider session");
            self.changes.send_replace(Some(session.user.clone()));
            *self.lock_session() = Some(session);
        }
        self.tokens = Some(store);
        self
    }

    /// Currently signed-in provider user, if any.
    pub fn current_user(&self) -> Option<ProviderUser> {
        self.changes.borrow().clone()
    }

    /// Refresh the ID token if it expires within the refresh margin.
    ///
    /// A refresh token rejected by the provider ends the session.
    pub async fn ensure_fresh_token(&self) -> Result<String, ProviderError> {
        let session = self.session_snapshot().ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::SessionExpired, "No provider session")
        })?;

        if Utc::now() + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < session.expires_at {
            return Ok(session.id_token);
        }

        tracing::debug!(uid = %session.user.uid, "Refreshing provider ID token");
        self.refresh(&session.refresh_token).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<String, ProviderError> {
        let url = format!("{}/token", self.token_url);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        let refreshed: RefreshResponse = match check_response_json(response).await {
            Ok(refreshed) => refreshed,
            Err(e) if e.kind == ProviderErrorKind::SessionExpired => {
                tracing::warn!(error = %e, "Provider rejected refresh token; ending session");
                self.end_session();
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let mut guard = self.lock_session();
        let Some(session) = guard.as_mut() else {
            return Err(ProviderError::new(
                ProviderErrorKind::SessionExpired,
                "Provider session ended during refresh",
            ));
        };
        session.id_token = refreshed.id_token.clone();
        session.refresh_token = refreshed.refresh_token;
        session.expires_at = expiry_from(refreshed.expires_in.as_deref());
        self.persist_session(Some(&*session));
        Ok(refreshed.id_token)
    }

    async fn post_accounts<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let url = format!("{}/accounts:{}", self.base_url, method);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        check_response_json(response).await
    }

    /// Adopt the tokens from a sign-in response and publish the new user.
    fn start_session(&self, response: AuthResponse) -> Result<ProviderUser, ProviderError> {
        if let Some(code) = response.error_message.as_deref() {
            return Err(classify_error_message(code));
        }

        let user = response.user();
        let (Some(id_token), Some(refresh_token)) = (response.id_token, response.refresh_token)
        else {
            return Err(ProviderError::other(
                "Identity provider response did not include session tokens",
            ));
        };

        let session = ProviderSession {
            user: user.clone(),
            id_token,
            refresh_token,
            expires_at: expiry_from(response.expires_in.as_deref()),
        };
        self.persist_session(Some(&session));
        *self.lock_session() = Some(session);
        self.changes.send_replace(Some(user.clone()));

        tracing::info!(uid = %user.uid, "Provider session started");
        Ok(user)
    }

    fn end_session(&self) {
        self.lock_session().take();
        self.persist_session(None);
        self.changes.send_replace(None);
    }

    fn persist_session(&self, session: Option<&ProviderSession>) {
        let Some(store) = self.tokens.as_deref() else {
            return;
        };
        let result = match session {
            Some(session) => save_record(store, PROVIDER_SESSION_KEY, session),
            None => store.remove(PROVIDER_SESSION_KEY),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to persist provider session");
        }
    }

    fn session_snapshot(&self) -> Option<ProviderSession> {
        self.lock_session().clone()
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<ProviderSession>> {
        // Session data stays consistent even if a holder panicked.
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkitClient {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderUser, ProviderError> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });
        let response = self.post_accounts("signInWithPassword", &body).await?;
        self.start_session(response)
    }

    async fn create_user(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderUser, ProviderError> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });
        let response = self.post_accounts("signUp", &body).await?;
        self.start_session(response)
    }

    async fn sign_in_with_credential(
        &self,
        credential: FederatedCredential,
    ) -> Result<ProviderUser, ProviderError> {
        let body = serde_json::json!({
            "postBody": idp_post_body(&credential),
            "requestUri": IDP_REQUEST_URI,
            "returnSecureToken": true,
            "returnIdpCredential": true,
        });
        let response = self.post_accounts("signInWithIdp", &body).await?;
        self.start_session(response)
    }

    async fn update_display_name(&self, name: &str) -> Result<ProviderUser, ProviderError> {
        let id_token = self.ensure_fresh_token().await?;
        let body = serde_json::json!({
            "idToken": id_token,
            "displayName": name,
            "returnSecureToken": true,
        });
        let response: AuthResponse = self.post_accounts("update", &body).await?;

        let user = {
            let mut guard = self.lock_session();
            let Some(session) = guard.as_mut() else {
                return Err(ProviderError::new(
                    ProviderErrorKind::SessionExpired,
                    "Provider session ended during profile update",
                ));
            };
            session.user.display_name = response
                .display_name
                .clone()
                .or_else(|| Some(name.to_string()));
            if let (Some(id_token), Some(refresh_token)) =
                (response.id_token.clone(), response.refresh_token.clone())
            {
                session.id_token = id_token;
                session.refresh_token = refresh_token;
                session.expires_at = expiry_from(response.expires_in.as_deref());
            }
            self.persist_session(Some(&*session));
            session.user.clone()
        };

        self.changes.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        let body = serde_json::json!({
            "requestType": "PASSWORD_RESET",
            "email": email,
        });
        let _: serde_json::Value = self.post_accounts("sendOobCode", &body).await?;
        tracing::info!("Password reset email requested");
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        // Identity Toolkit sessions are bearer tokens; dropping them is the sign-out.
        self.end_session();
        Ok(())
    }

    fn session_changes(&self) -> watch::Receiver<Option<ProviderUser>> {
        self.changes.subscribe()
    }
}

/// Sign-in response shared by the password, sign-up, IdP and update endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    #[serde(default)]
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<String>,
    /// Set by `signInWithIdp` on a 200 response that still failed
    error_message: Option<String>,
}

impl AuthResponse {
    fn user(&self) -> ProviderUser {
        ProviderUser {
            uid: self.local_id.clone(),
            email: self.email.clone().filter(|e| !e.is_empty()),
            display_name: self.display_name.clone().filter(|n| !n.is_empty()),
        }
    }
}

/// Secure Token refresh response (snake_case, unlike Identity Toolkit).
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let err = parse_error_body(&body)
            .unwrap_or_else(|| ProviderError::other(format!("HTTP {}: {}", status, body)));
        tracing::debug!(status = %status, kind = ?err.kind, "Identity provider request failed");
        return Err(err);
    }

    response
        .json()
        .await
        .map_err(|e| ProviderError::other(format!("JSON parse error: {}", e)))
}

fn parse_error_body(body: &str) -> Option<ProviderError> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    Some(classify_error_message(&envelope.error.message))
}

/// Map a provider message such as `"WEAK_PASSWORD : Password should be..."`.
fn classify_error_message(message: &str) -> ProviderError {
    let code = message.split(" : ").next().unwrap_or(message).trim();
    let kind = match code {
        "INVALID_EMAIL" | "MISSING_EMAIL" => ProviderErrorKind::InvalidEmail,
        "WEAK_PASSWORD" => ProviderErrorKind::WeakPassword,
        "EMAIL_EXISTS" => ProviderErrorKind::EmailAlreadyInUse,
        "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => ProviderErrorKind::UserNotFound,
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => ProviderErrorKind::WrongPassword,
        "TOKEN_EXPIRED" | "USER_DISABLED" | "INVALID_REFRESH_TOKEN" | "INVALID_ID_TOKEN"
        | "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => ProviderErrorKind::SessionExpired,
        _ => ProviderErrorKind::Other,
    };
    ProviderError::new(kind, message)
}

/// URL-encoded `postBody` for `accounts:signInWithIdp`.
fn idp_post_body(credential: &FederatedCredential) -> String {
    match credential {
        FederatedCredential::Apple {
            id_token,
            raw_nonce,
        } => format!(
            "id_token={}&providerId={}&nonce={}",
            urlencoding::encode(id_token),
            credential.provider_id(),
            urlencoding::encode(raw_nonce)
        ),
        FederatedCredential::Google {
            id_token,
            access_token,
        } => format!(
            "id_token={}&access_token={}&providerId={}",
            urlencoding::encode(id_token),
            urlencoding::encode(access_token),
            credential.provider_id()
        ),
    }
}

fn expiry_from(expires_in: Option<&str>) -> DateTime<Utc> {
    let secs = expires_in
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    Utc::now() + Duration::seconds(secs)
}
