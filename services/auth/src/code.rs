//! Verification code generation and hashing
//!
//! Codes are random 6-digit strings drawn from the OS entropy source. Only
//! their salted argon2 hashes are ever stored; the plaintext leaves the
//! process exactly once, inside the verification email.

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::{Rng, rngs::OsRng};

/// Generate a random 6-digit verification code, zero-padded ("000000"-"999999")
pub fn generate_code() -> String {
    let code: u32 = OsRng.gen_range(0..1_000_000);
    format!("{:06}", code)
}

/// Hash a secret (verification code or password) with a fresh random salt
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash secret: {}", e))?
        .to_string();

    Ok(hash)
}

/// Verify a secret against a stored argon2 hash
///
/// The underlying comparison is constant-time.
pub fn verify_secret(secret: &str, hash: &str) -> Result<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("Failed to parse hash: {}", e))?;

    let argon2 = Argon2::default();
    Ok(argon2
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok())
}
