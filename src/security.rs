//! Credential secrets: Argon2 PHC hashing and constant-time verification.

use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use once_cell::sync::Lazy;
use password_hash::{PasswordHash, SaltString};
use sha2::{Digest, Sha256};

/// Prefix shared by every Argon2 PHC string (`$argon2id$`, `$argon2i$`, `$argon2d$`).
const PHC_ARGON2_PREFIX: &str = "$argon2";

/// How a stored secret is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    Argon2,
    Plaintext,
}

pub fn secret_kind(stored: &str) -> SecretKind {
    if stored.starts_with(PHC_ARGON2_PREFIX) { SecretKind::Argon2 } else { SecretKind::Plaintext }
}

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

/// Verify `password` against an Argon2 PHC string. The digest comparison inside
/// argon2 is constant time; a malformed hash simply fails.
pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

/// Verify against a stored secret of either kind.
///
/// Every path costs one Argon2 verification. Plaintext secrets are compared as
/// SHA-256 digests so the comparison does not depend on either length.
pub fn verify_secret(stored: &str, password: &str) -> bool {
    match secret_kind(stored) {
        SecretKind::Argon2 => verify_password(stored, password),
        SecretKind::Plaintext => {
            verify_against_dummy(password);
            plaintext_eq(stored, password)
        }
    }
}

fn plaintext_eq(stored: &str, password: &str) -> bool {
    let a: [u8; 32] = Sha256::digest(stored.as_bytes()).into();
    let b: [u8; 32] = Sha256::digest(password.as_bytes()).into();
    constant_time_eq::constant_time_eq_32(&a, &b)
}

// Hash of a random throwaway password, verified against when the username is unknown
// so a miss costs the same as a wrong password.
static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| {
    let mut pw = [0u8; 24];
    getrandom::getrandom(&mut pw).ok()?;
    let pw: String = pw.iter().map(|b| format!("{:02x}", b)).collect();
    hash_password(&pw).ok()
});

/// Burn one verification's worth of work; always false.
pub fn verify_against_dummy(password: &str) -> bool {
    match DUMMY_HASH.as_deref() {
        Some(h) => {
            let _ = verify_password(h, password);
            false
        }
        None => false,
    }
}
