// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session manager: the single owner of "who is signed in".
//!
//! Every operation holds `op_lock` for its duration, and every state change
//! goes through the one `watch` sender, so the presentation layer only ever
//! observes complete states.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;

use crate::db::ProfileStore;
use crate::error::{AuthError, Result};
use crate::models::user::name_from_email;
use crate::models::User;
use crate::providers::{
    BrokerAuthorization, BrokerRequest, BrokerScope, FederatedCredential, FederatedSignIn,
    IdentityBroker, IdentityProvider, PersonName, ProviderUser,
};
use crate::session::nonce::Nonce;
use crate::session::state::SessionState;
use crate::session::validation;
use crate::store::SessionStore;

/// External capabilities the manager delegates credential checks to.
#[derive(Clone)]
pub struct Providers {
    pub identity: Arc<dyn IdentityProvider>,
    pub apple: Arc<dyn IdentityBroker>,
    pub google: Arc<dyn FederatedSignIn>,
}

/// Owner of the local session.
pub struct SessionManager {
    providers: Providers,
    store: SessionStore,
    profiles: Option<Arc<dyn ProfileStore>>,
    state: watch::Sender<SessionState>,
    /// Nonce of the outstanding Apple attempt; consumed by its completion
    pending_nonce: Mutex<Option<Nonce>>,
    op_lock: tokio::sync::Mutex<()>,
}

impl SessionManager {
    /// Restore the stored session and start following provider session changes.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(
        providers: Providers,
        store: SessionStore,
        profiles: Option<Arc<dyn ProfileStore>>,
    ) -> Arc<Self> {
        let restored = store.load();
        match &restored {
            Some(user) => tracing::info!(user_id = %user.id, "Restored local session"),
            None => tracing::debug!("No stored session to restore"),
        }

        let (state, _) = watch::channel(SessionState::restored(restored));
        let changes = providers.identity.session_changes();

        let manager = Arc::new(Self {
            providers,
            store,
            profiles,
            state,
            pending_nonce: Mutex::new(None),
            op_lock: tokio::sync::Mutex::new(()),
        });

        tokio::spawn(follow_provider_session(Arc::downgrade(&manager), changes));
        manager
    }

    // ─── Observation ─────────────────────────────────────────────

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn error_message(&self) -> Option<String> {
        self.state.borrow().error_message.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    // ─── Password ────────────────────────────────────────────────

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<User> {
        let _guard = self.op_lock.lock().await;
        validation::check_sign_in(email, password).map_err(|e| self.reject(e))?;

        self.begin_attempt("password");
        match self
            .providers
            .identity
            .sign_in_with_password(email, password)
            .await
        {
            Ok(provider_user) => Ok(self.complete_sign_in(provider_user, None).await),
            Err(e) => Err(self.fail(e)),
        }
    }

    pub async fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<User> {
        let _guard = self.op_lock.lock().await;
        validation::check_sign_up(email, password, name).map_err(|e| self.reject(e))?;

        self.begin_attempt("sign_up");
        let created = match self.providers.identity.create_user(email, password).await {
            Ok(user) => user,
            Err(e) => return Err(self.fail(e)),
        };

        let named = match self.providers.identity.update_display_name(name).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, uid = %created.uid, "Failed to set display name");
                created
            }
        };

        Ok(self.complete_sign_in(named, Some(name)).await)
    }

    pub async fn reset_password(&self, email: &str) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        validation::check_reset(email).map_err(|e| self.reject(e))?;

        self.begin_attempt("password_reset");
        match self.providers.identity.send_password_reset(email).await {
            Ok(()) => {
                self.state.send_modify(|s| {
                    s.is_loading = false;
                    s.error_message = None;
                });
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    // ─── Apple ───────────────────────────────────────────────────

    /// Run the whole Apple flow through the configured broker.
    pub async fn sign_in_with_apple(&self) -> Result<User> {
        let _guard = self.op_lock.lock().await;
        let request = self.new_apple_request().map_err(|e| self.reject(e))?;

        self.begin_attempt("apple");
        let authorization = match self.providers.apple.authorize(request).await {
            Ok(authorization) => authorization,
            Err(e) => {
                self.take_pending_nonce();
                return Err(self.fail(e));
            }
        };

        self.finish_apple(authorization).await
    }

    /// Start an Apple attempt whose completion arrives separately.
    ///
    /// Replaces any nonce from an earlier, unfinished attempt.
    pub fn begin_apple_sign_in(&self) -> Result<BrokerRequest> {
        self.new_apple_request().map_err(|e| self.reject(e))
    }

    /// Complete an attempt started with [`Self::begin_apple_sign_in`].
    pub async fn complete_apple_sign_in(
        &self,
        authorization: BrokerAuthorization,
    ) -> Result<User> {
        let _guard = self.op_lock.lock().await;
        self.finish_apple(authorization).await
    }

    fn new_apple_request(&self) -> Result<BrokerRequest> {
        let nonce = Nonce::generate()?;
        let request = BrokerRequest {
            scopes: vec![BrokerScope::FullName, BrokerScope::Email],
            hashed_nonce: nonce.hashed(),
        };
        *self.lock_nonce() = Some(nonce);
        Ok(request)
    }

    async fn finish_apple(&self, authorization: BrokerAuthorization) -> Result<User> {
        let pending = self.take_pending_nonce();
        let nonce = verify_identity_token_nonce(pending, &authorization.identity_token)
            .map_err(|e| self.fail(e))?;

        self.begin_attempt("apple");
        let credential = FederatedCredential::Apple {
            id_token: authorization.identity_token.clone(),
            raw_nonce: nonce.as_str().to_string(),
        };
        let provider_user = match self
            .providers
            .identity
            .sign_in_with_credential(credential)
            .await
        {
            Ok(user) => user,
            Err(e) => return Err(self.fail(e)),
        };

        let broker_name = authorization
            .full_name
            .as_ref()
            .map(PersonName::formatted)
            .filter(|name| !name.is_empty());

        let provider_user = match broker_name.as_deref() {
            Some(name) if provider_user.known_display_name().is_none() => {
                match self.providers.identity.update_display_name(name).await {
                    Ok(user) => user,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to store Apple-supplied name");
                        provider_user
                    }
                }
            }
            _ => provider_user,
        };

        Ok(self
            .complete_sign_in(provider_user, broker_name.as_deref())
            .await)
    }

    // ─── Google ──────────────────────────────────────────────────

    pub async fn sign_in_with_google(&self) -> Result<User> {
        let _guard = self.op_lock.lock().await;

        self.begin_attempt("google");
        let tokens = match self.providers.google.sign_in().await {
            Ok(tokens) => tokens,
            Err(e) => return Err(self.fail(e)),
        };

        let credential = FederatedCredential::Google {
            id_token: tokens.id_token,
            access_token: tokens.access_token,
        };
        match self
            .providers
            .identity
            .sign_in_with_credential(credential)
            .await
        {
            Ok(provider_user) => Ok(self.complete_sign_in(provider_user, None).await),
            Err(e) => Err(self.fail(e)),
        }
    }

    // ─── Sign-out ────────────────────────────────────────────────

    /// Revoke provider sessions and clear local state.
    ///
    /// Local state is cleared even when revocation fails; the failure is
    /// still reported.
    pub async fn sign_out(&self) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.take_pending_nonce();

        let (identity, google) = futures_util::join!(
            self.providers.identity.sign_out(),
            self.providers.google.sign_out()
        );
        self.clear_local_session();

        match identity.and(google) {
            Ok(()) => {
                self.state.send_modify(|s| s.error_message = None);
                tracing::info!("Signed out");
                Ok(())
            }
            Err(e) => {
                let err = AuthError::SignOutFailed(e.message);
                tracing::warn!(error = %err, "Provider sign-out failed; local session cleared");
                let message = err.to_string();
                self.state.send_modify(|s| s.error_message = Some(message));
                Err(err)
            }
        }
    }

    // ─── Profile ─────────────────────────────────────────────────

    /// Apply a profile edit or progress event to the signed-in user.
    ///
    /// The user ID cannot be changed.
    pub async fn update_user<F>(&self, edit: F) -> Result<User>
    where
        F: FnOnce(&mut User),
    {
        let _guard = self.op_lock.lock().await;
        let Some(mut user) = self.current_user() else {
            return Err(AuthError::NotSignedIn);
        };

        let id = user.id.clone();
        edit(&mut user);
        user.id = id;

        self.mirror_profile(&user).await;
        self.persist(&user);
        let updated = user.clone();
        self.state.send_modify(|s| s.user = Some(updated));
        Ok(user)
    }

    // ─── Internals ───────────────────────────────────────────────

    fn begin_attempt(&self, method: &'static str) {
        tracing::debug!(method, "Starting authentication attempt");
        self.state.send_modify(|s| {
            s.error_message = None;
            s.is_loading = true;
        });
    }

    /// Record a failure raised before any provider was contacted.
    fn reject(&self, err: AuthError) -> AuthError {
        if err.is_local_validation() {
            tracing::debug!(error = %err, "Rejected before contacting provider");
        } else {
            tracing::warn!(error = %err, "Could not start authentication attempt");
        }
        let message = err.to_string();
        self.state.send_modify(|s| s.error_message = Some(message));
        err
    }

    fn fail(&self, err: impl Into<AuthError>) -> AuthError {
        let err = err.into();
        tracing::warn!(error = %err, "Authentication attempt failed");
        let message = err.to_string();
        self.state.send_modify(|s| {
            s.is_loading = false;
            s.error_message = Some(message);
        });
        err
    }

    /// Map a provider user into the local model and make it current.
    ///
    /// Progress is kept from the current local user when the ID matches,
    /// otherwise it is taken from the remote profile if one exists.
    async fn complete_sign_in(&self, provider_user: ProviderUser, name_hint: Option<&str>) -> User {
        let local = self
            .state
            .borrow()
            .user
            .clone()
            .filter(|user| user.id == provider_user.uid);
        let base = match local {
            Some(user) => Some(user),
            None => self.fetch_remote_profile(&provider_user.uid).await,
        };

        let email = provider_user.email.clone().unwrap_or_default();
        let name = provider_user
            .known_display_name()
            .or_else(|| name_hint.map(str::trim).filter(|n| !n.is_empty()))
            .map(str::to_string)
            .or_else(|| {
                base.as_ref()
                    .map(|user| user.name.clone())
                    .filter(|n| !n.is_empty())
            })
            .unwrap_or_else(|| name_from_email(&email));

        let user = match base {
            Some(mut user) => {
                user.id = provider_user.uid.clone();
                if !email.is_empty() {
                    user.email = email;
                }
                user.name = name;
                user
            }
            None => User::new(provider_user.uid.clone(), email, name),
        };

        self.mirror_profile(&user).await;
        self.persist(&user);

        let current = user.clone();
        self.state.send_modify(|s| {
            s.user = Some(current);
            s.is_loading = false;
            s.error_message = None;
        });

        tracing::info!(user_id = %user.id, "Signed in");
        user
    }

    /// Reconcile with the provider's current user after a session change.
    async fn apply_provider_session(&self, current: Option<ProviderUser>) {
        let local_id = self.state.borrow().user.as_ref().map(|u| u.id.clone());

        match (current, local_id) {
            (None, Some(local_id)) => {
                tracing::info!(user_id = %local_id, "Provider session ended; clearing local session");
                self.take_pending_nonce();
                self.clear_local_session();
            }
            (None, None) => {}
            (Some(provider_user), Some(local_id)) if provider_user.uid == local_id => {}
            (Some(provider_user), _) => {
                tracing::info!(uid = %provider_user.uid, "Provider reported a new session");
                self.complete_sign_in(provider_user, None).await;
            }
        }
    }

    fn clear_local_session(&self) {
        if let Err(e) = self.store.clear() {
            tracing::error!(error = %e, "Failed to clear stored session");
        }
        self.state.send_modify(|s| {
            s.user = None;
            s.is_loading = false;
        });
    }

    fn persist(&self, user: &User) {
        if let Err(e) = self.store.save(user) {
            tracing::error!(error = %e, user_id = %user.id, "Failed to persist session");
        }
    }

    async fn fetch_remote_profile(&self, user_id: &str) -> Option<User> {
        let profiles = self.profiles.as_ref()?;
        match profiles.fetch_profile(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(error = %e, user_id, "Failed to fetch remote profile");
                None
            }
        }
    }

    async fn mirror_profile(&self, user: &User) {
        let Some(profiles) = self.profiles.as_ref() else {
            return;
        };
        if let Err(e) = profiles.save_profile(user).await {
            tracing::warn!(error = %e, user_id = %user.id, "Failed to save remote profile");
        }
    }

    fn take_pending_nonce(&self) -> Option<Nonce> {
        self.lock_nonce().take()
    }

    fn lock_nonce(&self) -> std::sync::MutexGuard<'_, Option<Nonce>> {
        self.pending_nonce
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Follow provider session changes for as long as the manager lives.
async fn follow_provider_session(
    manager: Weak<SessionManager>,
    mut changes: watch::Receiver<Option<ProviderUser>>,
) {
    while changes.changed().await.is_ok() {
        let Some(manager) = manager.upgrade() else {
            break;
        };
        let _guard = manager.op_lock.lock().await;
        // Read after taking the lock so the latest provider state wins.
        let current = changes.borrow_and_update().clone();
        manager.apply_provider_session(current).await;
    }
    tracing::debug!("Stopped following provider session changes");
}

/// Claims read from a broker identity token.
#[derive(Debug, Deserialize)]
struct IdentityTokenClaims {
    nonce: Option<String>,
}

/// Check that the token was issued for the pending nonce.
///
/// The signature is verified by the identity provider during the exchange;
/// here only the nonce binding is checked.
fn verify_identity_token_nonce(pending: Option<Nonce>, identity_token: &str) -> Result<Nonce> {
    let Some(nonce) = pending else {
        tracing::warn!("Apple completion without a pending request");
        return Err(AuthError::InvalidState);
    };

    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let claims = decode::<IdentityTokenClaims>(
        identity_token,
        &DecodingKey::from_secret(&[]),
        &validation,
    )
    .map_err(|e| {
        tracing::warn!(error = %e, "Undecodable Apple identity token");
        AuthError::Unknown("Failed to fetch identity token".to_string())
    })?
    .claims;

    match claims.nonce {
        Some(claim) if nonce.matches_claim(&claim) => Ok(nonce),
        Some(_) => {
            tracing::warn!("Apple identity token nonce does not match the pending request");
            Err(AuthError::InvalidState)
        }
        None => {
            tracing::warn!("Apple identity token has no nonce claim");
            Err(AuthError::InvalidState)
        }
    }
}
