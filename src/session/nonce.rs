// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Single-use nonces binding a broker identity token to one sign-in attempt.

use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::AuthError;

const NONCE_LENGTH: usize = 32;
const NONCE_CHARSET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVXYZabcdefghijklmnopqrstuvwxyz-._";

/// Raw nonce generated for one sign-in attempt.
///
/// Only the SHA-256 leaves the process before the credential exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct Nonce(String);

impl Nonce {
    /// Generate a nonce from the system CSPRNG.
    pub fn generate() -> Result<Self, AuthError> {
        Self::generate_with(&SystemRandom::new())
    }

    pub fn generate_with(rng: &dyn SecureRandom) -> Result<Self, AuthError> {
        let mut bytes = [0u8; NONCE_LENGTH];
        rng.fill(&mut bytes)
            .map_err(|_| AuthError::Unknown("Unable to generate nonce".to_string()))?;

        let nonce = bytes
            .iter()
            .map(|b| NONCE_CHARSET[usize::from(*b) % NONCE_CHARSET.len()] as char)
            .collect();
        Ok(Self(nonce))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase hex SHA-256, the form sent to the broker.
    pub fn hashed(&self) -> String {
        sha256_hex(&self.0)
    }

    /// Whether a token's `nonce` claim was issued for this nonce.
    pub fn matches_claim(&self, claim: &str) -> bool {
        self.hashed().as_bytes().ct_eq(claim.as_bytes()).into()
    }
}

impl std::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Nonce(..)")
    }
}

pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}
