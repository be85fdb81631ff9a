//! Password verifier: self-describing Argon2id PHC strings
//!
//! The verifier hash has its own random salt and is never used to derive the
//! stream key, so it is safe to store for later password prompts.

use argon2::password_hash::{Output, PasswordHash, PasswordHasher, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::{reserve_blocks, KdfParams};
use crate::ready::ensure_ready;
use crate::SALT_SIZE;

/// Random bytes behind a generated password (128-bit)
const GENERATED_PASSWORD_BYTES: usize = 16;

/// Hash a password into a PHC string such as `$argon2id$v=19$m=65536,t=2,p=1$…`.
pub fn hash_password(password: &SecretString, params: &KdfParams) -> CryptoResult<String> {
    ensure_ready()?;

    let mut salt_bytes = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| CryptoError::KeyDerivation(format!("verifier salt encoding: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2(None)?);
    let hash = argon2
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map_err(|e| CryptoError::KeyDerivation(format!("password hashing failed: {e}")))?;

    Ok(hash.to_string())
}

/// Check `candidate` against a stored verifier hash.
///
/// Returns `Ok(false)` for a wrong password and an error only when the stored
/// hash itself is malformed or asks for costs beyond the KDF limits. The
/// digest comparison is constant-time.
pub fn verify_password(verifier_hash: &str, candidate: &SecretString) -> CryptoResult<bool> {
    ensure_ready()?;

    let parsed = PasswordHash::new(verifier_hash).map_err(malformed)?;
    let (Some(salt), Some(expected)) = (parsed.salt, parsed.hash) else {
        return Err(CryptoError::VerifierFormat(
            "verifier hash has no salt or digest".into(),
        ));
    };

    let algorithm = Algorithm::try_from(parsed.algorithm).map_err(malformed)?;
    let version = parsed
        .version
        .map(Version::try_from)
        .transpose()
        .map_err(malformed)?
        .unwrap_or_default();
    let params = Params::try_from(&parsed).map_err(malformed)?;
    KdfParams {
        mem_cost_kib: params.m_cost(),
        time_cost: params.t_cost(),
        parallelism: params.p_cost(),
    }
    .check_bounds()
    .map_err(malformed)?;

    let mut salt_buf = [0u8; 64];
    let salt = salt.decode_b64(&mut salt_buf).map_err(malformed)?;

    let mut blocks = reserve_blocks(params.block_count())?;
    let mut digest = vec![0u8; expected.len()];
    Argon2::new(algorithm, version, params)
        .hash_password_into_with_memory(
            candidate.expose_secret().as_bytes(),
            salt,
            &mut digest,
            &mut blocks,
        )
        .map_err(malformed)?;

    let computed = Output::new(&digest).map_err(malformed);
    digest.zeroize();
    Ok(computed? == expected)
}

fn malformed(e: impl std::fmt::Display) -> CryptoError {
    CryptoError::VerifierFormat(e.to_string())
}

/// Generate a random password: 16 random bytes, URL-safe base64 without padding.
pub fn generate_password() -> SecretString {
    let mut bytes = [0u8; GENERATED_PASSWORD_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let encoded = URL_SAFE_NO_PAD.encode(bytes);
    bytes.zeroize();
    SecretString::from(encoded)
}
