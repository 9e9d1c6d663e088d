// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! One-shot loopback HTTP listener receiving an OAuth redirect.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

use crate::providers::ProviderError;

/// How long to wait for the callback response to flush before giving up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Query parameters delivered to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Holder for the sender that completes the flow; emptied by the first callback.
pub type CallbackSlot = Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>;

/// Router serving `GET /callback` once.
pub fn callback_router(slot: CallbackSlot) -> Router {
    Router::new()
        .route("/callback", get(callback))
        .layer(TraceLayer::new_for_http())
        .with_state(slot)
}

async fn callback(
    State(slot): State<CallbackSlot>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, &'static str) {
    let sender = slot
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();

    let Some(sender) = sender else {
        return (StatusCode::GONE, "This sign-in request was already completed.");
    };

    let cancelled = params.error.is_some();
    if sender.send(params).is_err() {
        tracing::warn!("Sign-in flow stopped waiting before the redirect arrived");
    }

    if cancelled {
        (StatusCode::OK, "Sign-in was cancelled. You can close this window.")
    } else {
        (StatusCode::OK, "Signed in. You can close this window.")
    }
}

/// Bound loopback listener awaiting a single redirect.
pub struct LoopbackReceiver {
    listener: TcpListener,
    redirect_uri: String,
}

impl LoopbackReceiver {
    /// Bind `127.0.0.1:port`; port 0 picks a free port.
    pub async fn bind(port: u16) -> Result<Self, ProviderError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| ProviderError::other(format!("Failed to bind loopback listener: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ProviderError::other(format!("Loopback listener has no address: {e}")))?;

        Ok(Self {
            listener,
            redirect_uri: format!("http://127.0.0.1:{}/callback", addr.port()),
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Serve until the first callback arrives, then shut down gracefully.
    pub async fn wait_for_callback(self) -> Result<CallbackParams, ProviderError> {
        let (result_tx, result_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = callback_router(Arc::new(Mutex::new(Some(result_tx))));

        tracing::debug!(redirect_uri = %self.redirect_uri, "Waiting for OAuth redirect");

        let listener = self.listener;
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let params = result_rx
            .await
            .map_err(|_| ProviderError::cancelled("Loopback listener stopped"))?;

        let _ = shutdown_tx.send(());
        match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => tracing::warn!(error = %e, "Loopback listener error"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Loopback listener task failed"),
            Err(_) => tracing::warn!("Loopback listener did not shut down in time"),
        }

        Ok(params)
    }
}
