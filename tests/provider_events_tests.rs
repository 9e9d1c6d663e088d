// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use coach_session::store::{KeyValueStore, MemoryStore, SESSION_KEY};
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{harness, harness_with, uid_for, wait_for_state, MemoryProfiles};

#[tokio::test]
async fn test_external_sign_out_clears_session() {
    let h = harness();
    h.manager
        .sign_in_with_password("x@y.com", "secret1")
        .await
        .unwrap();

    h.identity.end_session_externally();
    wait_for_state(&h.manager, |s| !s.is_authenticated()).await;

    assert_eq!(h.manager.current_user(), None);
    assert_eq!(h.backend.get(SESSION_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_external_sign_in_loads_user() {
    let h = harness();

    h.identity.sign_in_externally("uid-ext", "ext@example.com");
    wait_for_state(&h.manager, |s| s.is_authenticated()).await;

    let user = h.manager.current_user().unwrap();
    assert_eq!(user.id, "uid-ext");
    assert_eq!(user.name, "ext");
    assert!(h.backend.get(SESSION_KEY).unwrap().is_some());
}

#[tokio::test]
async fn test_own_sign_in_event_is_not_reapplied() {
    let h = harness();
    h.manager
        .sign_in_with_password("x@y.com", "secret1")
        .await
        .unwrap();
    let updated = h
        .manager
        .update_user(|u| u.record_session(10, Duration::from_secs(30)))
        .await
        .unwrap();

    // Give the listener time to see the provider's session event.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.manager.current_user(), Some(updated));
}

#[tokio::test]
async fn test_same_user_sign_in_keeps_progress() {
    let h = harness();
    h.manager
        .sign_in_with_password("x@y.com", "secret1")
        .await
        .unwrap();
    h.manager
        .update_user(|u| u.record_session(70, Duration::from_secs(300)))
        .await
        .unwrap();

    let again = h
        .manager
        .sign_in_with_password("x@y.com", "secret1")
        .await
        .unwrap();

    assert_eq!(again.id, uid_for("x@y.com"));
    assert_eq!(again.total_score, 70);
    assert_eq!(again.completed_sessions, 1);
}

#[tokio::test]
async fn test_switching_user_replaces_progress() {
    let h = harness();
    h.manager
        .sign_in_with_password("x@y.com", "secret1")
        .await
        .unwrap();
    h.manager
        .update_user(|u| u.record_session(70, Duration::from_secs(300)))
        .await
        .unwrap();

    let other = h
        .manager
        .sign_in_with_password("z@y.com", "secret1")
        .await
        .unwrap();

    assert_eq!(other.id, uid_for("z@y.com"));
    assert_eq!(other.total_score, 0);
}

#[tokio::test]
async fn test_remote_profile_restores_progress_after_sign_out() {
    let profiles = Arc::new(MemoryProfiles::default());
    let h = harness_with(MemoryStore::new(), Some(profiles.clone()));
    h.manager
        .sign_in_with_password("x@y.com", "secret1")
        .await
        .unwrap();
    h.manager
        .update_user(|u| u.record_session(40, Duration::from_secs(120)))
        .await
        .unwrap();
    h.manager.sign_out().await.unwrap();

    let again = h
        .manager
        .sign_in_with_password("x@y.com", "secret1")
        .await
        .unwrap();

    assert_eq!(again.total_score, 40);
    assert_eq!(again.time_spent_secs, 120);
}
