//! Pickup token generation.
//!
//! Tokens are opaque bearer secrets. They carry nothing about the guardian
//! they belong to; validating one is a store lookup by digest.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use rand_core::OsRng;
use sha2::{Digest, Sha256};

/// 32 symbols from a 62 letter alphabet, roughly 190 bits.
pub const TOKEN_LENGTH: usize = 32;

pub fn generate() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Cheap shape check so obviously bogus input never reaches the store.
pub fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LENGTH && token.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Hex SHA-256 of the token, the only form the store ever sees.
pub fn digest(token: &str) -> String {
    let mut hasher: Sha256 = Digest::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn pickup_url(base: &str, token: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), token)
}

/// Pulls the token out of whatever the guardian presented: a raw token, or
/// a pickup URL read from the QR code or pasted by hand.
pub fn extract(input: &str) -> String {
    let trimmed = input.trim();
    let without_query = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Session auth codes: hex SHA-256 over 32 random bytes.
pub fn generate_auth_code() -> String {
    let code_bytes: [u8; 32] = thread_rng().gen();

    let mut hasher: Sha256 = Digest::new();
    hasher.update(code_bytes);
    hex::encode(hasher.finalize())
}
