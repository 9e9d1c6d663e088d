// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth 2.0 installed-app sign-in (PKCE + loopback redirect).

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};
use subtle::ConstantTimeEq;

use crate::config::Config;
use crate::providers::loopback::LoopbackReceiver;
use crate::providers::{FederatedSignIn, FederatedTokens, InteractivePrompt, ProviderError};
use crate::store::{load_record, save_record, KeyValueStore, GOOGLE_TOKEN_KEY};

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
const SCOPES: &str = "openid email profile";

/// Google sign-in via the system browser.
pub struct GoogleOAuthClient {
    http: reqwest::Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    loopback_port: u16,
    prompt: Arc<dyn InteractivePrompt>,
    rng: SystemRandom,
    revoke_url: String,
    /// Access token of the last sign-in, revoked on sign-out
    access_token: Mutex<Option<String>>,
    tokens: Option<Arc<dyn KeyValueStore>>,
}

/// Access token saved so a later run can revoke it.
#[derive(Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
}

impl GoogleOAuthClient {
    pub fn new(http: reqwest::Client, config: &Config, prompt: Arc<dyn InteractivePrompt>) -> Self {
        Self {
            http,
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
            loopback_port: config.loopback_port,
            prompt,
            rng: SystemRandom::new(),
            revoke_url: REVOKE_URL.to_string(),
            access_token: Mutex::new(None),
            tokens: None,
        }
    }

    /// Keep the access token in `store`, picking up one saved by an earlier run.
    pub fn with_token_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        if let Some(stored) = load_record::<StoredToken>(store.as_ref(), GOOGLE_TOKEN_KEY) {
            tracing::debug!("Resumed Google access token");
            self.access_token = Mutex::new(Some(stored.access_token));
        }
        self.tokens = Some(store);
        self
    }

    fn random_token(&self) -> Result<String, ProviderError> {
        let mut bytes = [0u8; 32];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| ProviderError::other("Unable to generate random bytes"))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    async fn exchange_code(
        &self,
        client_id: &str,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, ProviderError> {
        let mut form = vec![
            ("code", code),
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
            ("code_verifier", verifier),
        ];
        if let Some(secret) = self.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = self
            .http
            .post(TOKEN_URL)
            .form(&form)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::other(format!(
                "Google token exchange failed (HTTP {}): {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::other(format!("JSON parse error: {}", e)))
    }

    fn store_access_token(&self, token: Option<String>) -> Option<String> {
        if let Some(store) = self.tokens.as_deref() {
            let result = match &token {
                Some(access_token) => save_record(
                    store,
                    GOOGLE_TOKEN_KEY,
                    &StoredToken {
                        access_token: access_token.clone(),
                    },
                ),
                None => store.remove(GOOGLE_TOKEN_KEY),
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to persist Google access token");
            }
        }

        let mut guard = self
            .access_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, token)
    }
}

#[async_trait]
impl FederatedSignIn for GoogleOAuthClient {
    async fn sign_in(&self) -> Result<FederatedTokens, ProviderError> {
        let client_id = self
            .client_id
            .clone()
            .ok_or_else(|| ProviderError::other("Google client ID not found"))?;

        let receiver = LoopbackReceiver::bind(self.loopback_port).await?;
        let redirect_uri = receiver.redirect_uri().to_string();

        let verifier = self.random_token()?;
        let state = self.random_token()?;
        let url = authorize_url(&client_id, &redirect_uri, &pkce_challenge(&verifier), &state);

        self.prompt
            .show_url("Open this URL to sign in with Google", &url)
            .await?;

        let callback = receiver.wait_for_callback().await?;

        if let Some(error) = callback.error {
            tracing::warn!(error = %error, "Google authorization was not granted");
            return Err(ProviderError::cancelled(format!(
                "Google sign-in failed: {error}"
            )));
        }

        let returned_state = callback.state.unwrap_or_default();
        if !bool::from(returned_state.as_bytes().ct_eq(state.as_bytes())) {
            tracing::error!("OAuth state mismatch on Google redirect");
            return Err(ProviderError::other("Google sign-in state mismatch"));
        }

        let code = callback
            .code
            .ok_or_else(|| ProviderError::other("Google redirect did not include a code"))?;

        let tokens = self
            .exchange_code(&client_id, &code, &verifier, &redirect_uri)
            .await?;
        let id_token = tokens
            .id_token
            .ok_or_else(|| ProviderError::other("Failed to get Google credentials"))?;

        self.store_access_token(Some(tokens.access_token.clone()));
        tracing::info!("Google authorization complete");

        Ok(FederatedTokens {
            id_token,
            access_token: tokens.access_token,
        })
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let Some(token) = self.store_access_token(None) else {
            return Ok(());
        };

        let response = self
            .http
            .post(&self.revoke_url)
            .form(&[("token", token.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        // 400 means the token was already invalid, which is the goal.
        if response.status().is_success() || response.status().as_u16() == 400 {
            return Ok(());
        }

        Err(ProviderError::other(format!(
            "Google token revocation failed (HTTP {})",
            response.status()
        )))
    }
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    id_token: Option<String>,
}

/// S256 PKCE code challenge for a verifier.
fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn authorize_url(client_id: &str, redirect_uri: &str, challenge: &str, state: &str) -> String {
    format!(
        "{}?\
         client_id={}&\
         redirect_uri={}&\
         response_type=code&\
         scope={}&\
         code_challenge={}&\
         code_challenge_method=S256&\
         state={}",
        AUTHORIZE_URL,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(SCOPES),
        challenge,
        state
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ConsolePrompt;
    use crate::store::MemoryStore;
    use axum::{extract::State, http::StatusCode, routing::post, Form, Router};
    use std::collections::HashMap;

    type Revoked = Arc<Mutex<Vec<String>>>;

    fn prompt() -> Arc<dyn InteractivePrompt> {
        Arc::new(ConsolePrompt::from_reader(&b""[..]))
    }

    async fn revoke(
        State(revoked): State<Revoked>,
        Form(form): Form<HashMap<String, String>>,
    ) -> StatusCode {
        revoked
            .lock()
            .unwrap()
            .push(form.get("token").cloned().unwrap_or_default());
        StatusCode::OK
    }

    /// Local stand-in for the revoke endpoint; returns its URL.
    async fn revoke_server(revoked: Revoked) -> String {
        let app = Router::new()
            .route("/revoke", post(revoke))
            .with_state(revoked);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/revoke")
    }

    #[test]
    fn pkce_challenge_matches_rfc7636_example() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-1J0bZt8hQRYbLmSPG5TnBw2-nqlzZ0"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn authorize_url_encodes_parameters() {
        let url = authorize_url(
            "client.apps.googleusercontent.com",
            "http://127.0.0.1:4567/callback",
            "challenge",
            "state123",
        );
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?client_id="));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A4567%2Fcallback"));
        assert!(url.contains("scope=openid%20email%20profile"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.ends_with("&state=state123"));
    }

    #[tokio::test]
    async fn sign_in_without_client_id_fails() {
        let mut config = Config::test_default();
        config.google_client_id = None;
        let client = GoogleOAuthClient::new(reqwest::Client::new(), &config, prompt());

        let err = client.sign_in().await.unwrap_err();
        assert_eq!(err.message, "Google client ID not found");
    }

    #[tokio::test]
    async fn sign_out_without_token_is_noop() {
        let config = Config::test_default();
        let client = GoogleOAuthClient::new(reqwest::Client::new(), &config, prompt());
        assert!(client.sign_out().await.is_ok());
    }

    #[tokio::test]
    async fn sign_out_revokes_token_saved_by_earlier_run() {
        let revoked = Revoked::default();
        let url = revoke_server(revoked.clone()).await;
        let config = Config::test_default();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let first = GoogleOAuthClient::new(reqwest::Client::new(), &config, prompt())
            .with_token_store(store.clone());
        first.store_access_token(Some("ya29.first-run".to_string()));
        drop(first);

        let mut second = GoogleOAuthClient::new(reqwest::Client::new(), &config, prompt())
            .with_token_store(store.clone());
        second.revoke_url = url;
        second.sign_out().await.unwrap();

        assert_eq!(*revoked.lock().unwrap(), vec!["ya29.first-run".to_string()]);
        assert_eq!(store.get(GOOGLE_TOKEN_KEY).unwrap(), None);

        // Nothing left to revoke.
        second.sign_out().await.unwrap();
        assert_eq!(revoked.lock().unwrap().len(), 1);
    }
}
