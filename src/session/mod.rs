// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session lifecycle: validation, nonce handling and the manager itself.

pub mod manager;
pub mod nonce;
pub mod state;
pub mod validation;

pub use manager::{Providers, SessionManager};
pub use nonce::Nonce;
pub use state::SessionState;
