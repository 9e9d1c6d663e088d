//! Local credential checks, run before any provider is contacted.

use validator::{Validate, ValidationErrors};

use crate::error::AuthError;

#[derive(Debug, Validate)]
struct PasswordCredentials {
    #[validate(contains(pattern = "@"))]
    email: String,
    #[validate(length(min = 6))]
    password: String,
}

#[derive(Debug, Validate)]
struct ResetRequest {
    #[validate(contains(pattern = "@"))]
    email: String,
}

/// Validate a password sign-in form.
pub fn check_sign_in(email: &str, password: &str) -> Result<(), AuthError> {
    if email.is_empty() || password.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    check_credentials(email, password)
}

/// Validate a sign-up form.
pub fn check_sign_up(email: &str, password: &str, name: &str) -> Result<(), AuthError> {
    if email.is_empty() || password.is_empty() || name.is_empty() {
        return Err(AuthError::MissingFields);
    }
    check_credentials(email, password)
}

/// Validate a password-reset request.
pub fn check_reset(email: &str) -> Result<(), AuthError> {
    ResetRequest {
        email: email.to_string(),
    }
    .validate()
    .map_err(|_| AuthError::InvalidEmail)
}

fn check_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    PasswordCredentials {
        email: email.to_string(),
        password: password.to_string(),
    }
    .validate()
    .map_err(|errors| first_failure(&errors))
}

/// Email problems are reported ahead of password problems.
fn first_failure(errors: &ValidationErrors) -> AuthError {
    let fields = errors.field_errors();
    if fields.contains_key("email") {
        AuthError::InvalidEmail
    } else {
        AuthError::WeakPassword
    }
}
