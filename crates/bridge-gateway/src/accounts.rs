use std::sync::LazyLock;

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use regex::Regex;

use crate::error::AuthError;

static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]{1,20}$").expect("static username regex"));

pub struct Registration<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub sign_up_token: &'a str,
}

/// Check a registration request against naming rules and the configured
/// secrets. Uniqueness is checked separately against the database.
pub fn validate_registration(
    req: &Registration<'_>,
    accounts_password: &str,
    required_sign_up_token: Option<&str>,
) -> Result<(), AuthError> {
    if req.username.is_empty() {
        return Err(AuthError::EmptyUsername);
    }
    if req.password.is_empty() {
        return Err(AuthError::EmptyPassword);
    }
    if !USERNAME.is_match(req.username) {
        return Err(AuthError::BadUsername);
    }
    let len = req.password.chars().count();
    if !(3..=1024).contains(&len) {
        return Err(AuthError::BadPasswordLength);
    }
    if req.password == accounts_password || required_sign_up_token == Some(req.password) {
        return Err(AuthError::ReservedPassword);
    }
    Ok(())
}

/// Compare the request's sign-up token when one is configured.
pub fn check_sign_up_token(given: &str, required: Option<&str>) -> Result<(), AuthError> {
    match required {
        Some(token) if token != given => Err(AuthError::BadSignUpToken),
        _ => Ok(()),
    }
}

/// Hash password with Argon2id.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::Internal)
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
