// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Coach-Session: authentication and user session core for a coaching app
//!
//! This crate owns "who is signed in": it validates credentials locally,
//! delegates sign-in to email/password, Apple and Google providers, keeps
//! an observable session state and persists the signed-in user across
//! restarts.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod providers;
pub mod session;
pub mod store;

pub use error::{AuthError, Result};
pub use models::User;
pub use session::{Providers, SessionManager, SessionState};
