// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

#![allow(dead_code)]

use async_trait::async_trait;
use coach_session::db::{FirestoreDb, ProfileStore};
use coach_session::error::StorageError;
use coach_session::providers::{
    BrokerAuthorization, BrokerRequest, FederatedCredential, FederatedSignIn, FederatedTokens,
    IdentityBroker, IdentityProvider, PersonName, ProviderError, ProviderErrorKind, ProviderUser,
};
use coach_session::store::{MemoryStore, SessionStore};
use coach_session::{Providers, SessionManager, SessionState, User};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::sync::watch;

pub const APPLE_UID: &str = "apple-001";
pub const APPLE_RELAY_EMAIL: &str = "q7x2@privaterelay.appleid.com";
pub const GOOGLE_UID: &str = "google-001";

/// Check if emulator is available via environment variable.
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

pub fn uid_for(email: &str) -> String {
    format!("uid-{email}")
}

// ═══════════════════════════════════════════════════════════════════════════
// IDENTITY PROVIDER
// ═══════════════════════════════════════════════════════════════════════════

/// In-process identity provider recording every call.
pub struct FakeIdentity {
    current: watch::Sender<Option<ProviderUser>>,
    names: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<&'static str>>,
    credentials: Mutex<Vec<FederatedCredential>>,
    fail_next: Mutex<Option<ProviderError>>,
    fail_display_name: AtomicBool,
    fail_sign_out: AtomicBool,
    observer: OnceLock<watch::Receiver<SessionState>>,
    loading_seen: Mutex<Vec<bool>>,
}

impl FakeIdentity {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current,
            names: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            credentials: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
            fail_display_name: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            observer: OnceLock::new(),
            loading_seen: Mutex::new(Vec::new()),
        }
    }

    /// Record the manager's loading flag whenever a provider call starts.
    pub fn observe(&self, state: watch::Receiver<SessionState>) {
        let _ = self.observer.set(state);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn credentials(&self) -> Vec<FederatedCredential> {
        self.credentials.lock().unwrap().clone()
    }

    pub fn loading_seen(&self) -> Vec<bool> {
        self.loading_seen.lock().unwrap().clone()
    }

    pub fn fail_next(&self, kind: ProviderErrorKind, message: &str) {
        *self.fail_next.lock().unwrap() = Some(ProviderError::new(kind, message));
    }

    pub fn fail_display_name(&self) {
        self.fail_display_name.store(true, Ordering::SeqCst);
    }

    pub fn fail_sign_out(&self) {
        self.fail_sign_out.store(true, Ordering::SeqCst);
    }

    pub fn set_name(&self, uid: &str, name: &str) {
        self.names
            .lock()
            .unwrap()
            .insert(uid.to_string(), name.to_string());
    }

    /// The provider session ends without the manager asking for it.
    pub fn end_session_externally(&self) {
        self.current.send_replace(None);
    }

    /// The provider reports a session the manager did not start.
    pub fn sign_in_externally(&self, uid: &str, email: &str) {
        let user = self.user(uid, Some(email));
        self.current.send_replace(Some(user));
    }

    fn record(&self, call: &'static str) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(call);
        if let Some(observer) = self.observer.get() {
            self.loading_seen
                .lock()
                .unwrap()
                .push(observer.borrow().is_loading());
        }
        match self.fail_next.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn user(&self, uid: &str, email: Option<&str>) -> ProviderUser {
        ProviderUser {
            uid: uid.to_string(),
            email: email.map(str::to_string),
            display_name: self.names.lock().unwrap().get(uid).cloned(),
        }
    }

    fn start(&self, user: ProviderUser) -> ProviderUser {
        self.current.send_replace(Some(user.clone()));
        user
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_in_with_password(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<ProviderUser, ProviderError> {
        self.record("sign_in_with_password")?;
        Ok(self.start(self.user(&uid_for(email), Some(email))))
    }

    async fn create_user(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<ProviderUser, ProviderError> {
        self.record("create_user")?;
        Ok(self.start(self.user(&uid_for(email), Some(email))))
    }

    async fn sign_in_with_credential(
        &self,
        credential: FederatedCredential,
    ) -> Result<ProviderUser, ProviderError> {
        self.record("sign_in_with_credential")?;
        let user = match &credential {
            FederatedCredential::Apple { .. } => self.user(APPLE_UID, Some(APPLE_RELAY_EMAIL)),
            FederatedCredential::Google { .. } => self.user(GOOGLE_UID, Some("gee@gmail.com")),
        };
        self.credentials.lock().unwrap().push(credential);
        Ok(self.start(user))
    }

    async fn update_display_name(&self, name: &str) -> Result<ProviderUser, ProviderError> {
        self.record("update_display_name")?;
        if self.fail_display_name.load(Ordering::SeqCst) {
            return Err(ProviderError::network("profile update timed out"));
        }
        let Some(mut user) = self.current.borrow().clone() else {
            return Err(ProviderError::other("No user is signed in"));
        };
        self.set_name(&user.uid, name);
        user.display_name = Some(name.to_string());
        Ok(self.start(user))
    }

    async fn send_password_reset(&self, _email: &str) -> Result<(), ProviderError> {
        self.record("send_password_reset")
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push("sign_out");
        self.current.send_replace(None);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(ProviderError::network("revocation endpoint unreachable"));
        }
        Ok(())
    }

    fn session_changes(&self) -> watch::Receiver<Option<ProviderUser>> {
        self.current.subscribe()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// APPLE BROKER
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerMode {
    /// Token carries the hashed nonce it was asked for
    EchoNonce,
    /// Token carries a nonce from some other request
    WrongNonce,
    /// Token has no nonce claim
    NoNonce,
    /// User cancels the sheet
    Cancel,
}

pub struct FakeBroker {
    mode: Mutex<BrokerMode>,
    full_name: Mutex<Option<PersonName>>,
    requests: Mutex<Vec<BrokerRequest>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(BrokerMode::EchoNonce),
            full_name: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: BrokerMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_full_name(&self, given: &str, family: &str) {
        *self.full_name.lock().unwrap() = Some(PersonName {
            given_name: Some(given.to_string()),
            family_name: Some(family.to_string()),
        });
    }

    pub fn requests(&self) -> Vec<BrokerRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityBroker for FakeBroker {
    async fn authorize(
        &self,
        request: BrokerRequest,
    ) -> Result<BrokerAuthorization, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let mode = *self.mode.lock().unwrap();
        let token = match mode {
            BrokerMode::EchoNonce => identity_token(Some(&request.hashed_nonce)),
            BrokerMode::WrongNonce => identity_token(Some(
                "0000000000000000000000000000000000000000000000000000000000000000",
            )),
            BrokerMode::NoNonce => identity_token(None),
            BrokerMode::Cancel => {
                return Err(ProviderError::cancelled("The user canceled the authorization"))
            }
        };
        Ok(BrokerAuthorization {
            identity_token: token,
            full_name: self.full_name.lock().unwrap().clone(),
            email: Some(APPLE_RELAY_EMAIL.to_string()),
        })
    }
}

#[derive(serde::Serialize)]
struct AppleClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<&'a str>,
}

/// Mint an unverifiable identity token carrying the given nonce claim.
pub fn identity_token(nonce: Option<&str>) -> String {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &AppleClaims {
            iss: "https://appleid.apple.com",
            sub: "001234.apple",
            aud: "com.example.coach",
            nonce,
        },
        &jsonwebtoken::EncodingKey::from_secret(b"broker-test-key"),
    )
    .unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// GOOGLE
// ═══════════════════════════════════════════════════════════════════════════

pub struct FakeGoogle {
    fail_sign_in: Mutex<Option<ProviderError>>,
    fail_sign_out: AtomicBool,
    signed_out: AtomicBool,
}

impl FakeGoogle {
    pub fn new() -> Self {
        Self {
            fail_sign_in: Mutex::new(None),
            fail_sign_out: AtomicBool::new(false),
            signed_out: AtomicBool::new(false),
        }
    }

    pub fn fail_sign_in(&self, err: ProviderError) {
        *self.fail_sign_in.lock().unwrap() = Some(err);
    }

    pub fn fail_sign_out(&self) {
        self.fail_sign_out.store(true, Ordering::SeqCst);
    }

    pub fn signed_out(&self) -> bool {
        self.signed_out.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FederatedSignIn for FakeGoogle {
    async fn sign_in(&self) -> Result<FederatedTokens, ProviderError> {
        if let Some(err) = self.fail_sign_in.lock().unwrap().take() {
            return Err(err);
        }
        Ok(FederatedTokens {
            id_token: "google-id-token".to_string(),
            access_token: "google-access-token".to_string(),
        })
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.signed_out.store(true, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(ProviderError::network("token revocation failed"));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// REMOTE PROFILES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct MemoryProfiles {
    profiles: DashMap<String, User>,
}

impl MemoryProfiles {
    pub fn get(&self, user_id: &str) -> Option<User> {
        self.profiles.get(user_id).map(|p| p.clone())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfiles {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<User>, StorageError> {
        Ok(self.get(user_id))
    }

    async fn save_profile(&self, user: &User) -> Result<(), StorageError> {
        self.profiles.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn delete_profile(&self, user_id: &str) -> Result<(), StorageError> {
        self.profiles.remove(user_id);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HARNESS
// ═══════════════════════════════════════════════════════════════════════════

pub struct Harness {
    pub manager: Arc<SessionManager>,
    pub identity: Arc<FakeIdentity>,
    pub apple: Arc<FakeBroker>,
    pub google: Arc<FakeGoogle>,
    pub backend: MemoryStore,
}

/// Manager with fresh fakes and an empty store.
pub fn harness() -> Harness {
    harness_with(MemoryStore::new(), None)
}

/// Manager over an existing store, as after an application restart.
pub fn harness_with(backend: MemoryStore, profiles: Option<Arc<dyn ProfileStore>>) -> Harness {
    let identity = Arc::new(FakeIdentity::new());
    let apple = Arc::new(FakeBroker::new());
    let google = Arc::new(FakeGoogle::new());

    let providers = Providers {
        identity: identity.clone(),
        apple: apple.clone(),
        google: google.clone(),
    };
    let store = SessionStore::new(Arc::new(backend.clone()));
    let manager = SessionManager::start(providers, store, profiles);
    identity.observe(manager.subscribe());

    Harness {
        manager,
        identity,
        apple,
        google,
        backend,
    }
}

/// Wait until the published state satisfies `f`.
pub async fn wait_for_state(manager: &SessionManager, f: impl FnMut(&SessionState) -> bool) {
    let mut rx = manager.subscribe();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(f))
        .await
        .expect("state change timed out")
        .expect("manager dropped");
}
