// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! "Sign in with Apple" through the web authorization endpoint.
//!
//! Apple only posts its response to a registered HTTPS redirect, so the
//! identity token (and the `user` JSON Apple sends on first authorization)
//! is handed back through an [`InteractivePrompt`].

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::Config;
use crate::providers::{
    BrokerAuthorization, BrokerRequest, BrokerScope, IdentityBroker, InteractivePrompt,
    PersonName, ProviderError,
};

const AUTHORIZE_URL: &str = "https://appleid.apple.com/auth/authorize";

/// Apple identity broker driven by a prompt.
pub struct AppleWebBroker {
    service_id: Option<String>,
    redirect_uri: String,
    prompt: Arc<dyn InteractivePrompt>,
}

impl AppleWebBroker {
    pub fn new(config: &Config, prompt: Arc<dyn InteractivePrompt>) -> Self {
        Self {
            service_id: config.apple_service_id.clone(),
            redirect_uri: config.apple_redirect_uri.clone(),
            prompt,
        }
    }
}

#[async_trait]
impl IdentityBroker for AppleWebBroker {
    async fn authorize(
        &self,
        request: BrokerRequest,
    ) -> Result<BrokerAuthorization, ProviderError> {
        let service_id = self
            .service_id
            .as_deref()
            .ok_or_else(|| ProviderError::other("Sign in with Apple is not configured"))?;

        let url = authorize_url(service_id, &self.redirect_uri, &request);
        self.prompt
            .show_url("Open this URL to sign in with Apple", &url)
            .await?;

        let identity_token = self
            .prompt
            .ask("Paste the id_token Apple posted to the redirect URI")
            .await?;
        if identity_token.is_empty() {
            return Err(ProviderError::cancelled("Failed to fetch identity token"));
        }

        let user_json = self
            .prompt
            .ask("Paste the user JSON if Apple sent one (leave blank otherwise)")
            .await?;
        let user = parse_user_json(&user_json)?;

        Ok(BrokerAuthorization {
            identity_token,
            full_name: user.as_ref().and_then(|u| u.name.clone()).map(Into::into),
            email: user.and_then(|u| u.email),
        })
    }
}

/// `user` form field Apple sends on the first authorization only.
#[derive(Debug, Deserialize)]
struct AppleUser {
    name: Option<AppleName>,
    email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppleName {
    first_name: Option<String>,
    last_name: Option<String>,
}

impl From<AppleName> for PersonName {
    fn from(name: AppleName) -> Self {
        PersonName {
            given_name: name.first_name,
            family_name: name.last_name,
        }
    }
}

fn parse_user_json(raw: &str) -> Result<Option<AppleUser>, ProviderError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| ProviderError::other(format!("Invalid Apple user JSON: {e}")))
}

fn authorize_url(service_id: &str, redirect_uri: &str, request: &BrokerRequest) -> String {
    let scope = request
        .scopes
        .iter()
        .map(|scope| match scope {
            BrokerScope::FullName => "name",
            BrokerScope::Email => "email",
        })
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "{}?\
         client_id={}&\
         redirect_uri={}&\
         response_type={}&\
         response_mode=form_post&\
         scope={}&\
         nonce={}",
        AUTHORIZE_URL,
        urlencoding::encode(service_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode("code id_token"),
        urlencoding::encode(&scope),
        request.hashed_nonce
    )
}
