//! Credential hashing, strength policy, and opaque token generation.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine as _, engine::general_purpose};
use rand::prelude::RngExt;
use rand::rng;

use crate::errors::Error;

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    fn to_argon2(self) -> Result<Argon2<'static>, Error> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| Error::Internal {
            operation: format!("create argon2 params: {e}"),
        })?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Hash a credential with Argon2id using the given cost parameters.
///
/// CPU-bound; callers on the async runtime wrap this in `spawn_blocking`.
pub fn hash_password(password: &str, params: Argon2Params) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = params.to_argon2()?;

    let hash = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| Error::Internal {
        operation: format!("hash password: {e}"),
    })?;

    Ok(hash.to_string())
}

/// Verify a credential against a stored PHC hash string.
///
/// Verification uses the parameters embedded in the hash itself.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, Error> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::Internal {
        operation: format!("parse password hash: {e}"),
    })?;

    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed_hash).is_ok())
}

const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Enforce the credential policy: minimum length plus at least one uppercase
/// letter, one lowercase letter, one digit, and one special character.
pub fn validate_strength(password: &str, min_length: usize) -> Result<(), Error> {
    let reason = if password.chars().count() < min_length {
        Some(format!("must be at least {min_length} characters long"))
    } else if !password.chars().any(|c| c.is_ascii_uppercase()) {
        Some("must contain at least one uppercase letter".to_string())
    } else if !password.chars().any(|c| c.is_ascii_lowercase()) {
        Some("must contain at least one lowercase letter".to_string())
    } else if !password.chars().any(|c| c.is_ascii_digit()) {
        Some("must contain at least one number".to_string())
    } else if !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        Some("must contain at least one special character".to_string())
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::WeakPassword { reason }),
        None => Ok(()),
    }
}

/// Generate an unguessable opaque token (reset links, login challenges).
///
/// 32 bytes (256 bits) of CSPRNG output, base64url without padding.
pub fn generate_token() -> String {
    let mut token_bytes = [0u8; 32];
    rng().fill(&mut token_bytes);

    general_purpose::URL_SAFE_NO_PAD.encode(token_bytes)
}
