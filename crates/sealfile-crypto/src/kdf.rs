//! Key derivation: Argon2id password → symmetric stream key

use argon2::{Algorithm, Argon2, Block, Params, Version};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::ready::ensure_ready;
use crate::{KEY_SIZE, SALT_SIZE};

/// Per-file random salt. Public; stored next to the ciphertext.
pub type Salt = [u8; SALT_SIZE];

/// A 256-bit key derived from a password via Argon2id.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Largest memory cost accepted from a record or verifier hash (4 GiB)
pub const MAX_MEM_COST_KIB: u32 = 4 * 1024 * 1024;
/// Largest pass count accepted from a record or verifier hash
pub const MAX_TIME_COST: u32 = 16;
/// Largest lane count accepted from a record or verifier hash
pub const MAX_PARALLELISM: u32 = 16;

/// Named Argon2id cost profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfProfile {
    /// Responsive UI use: 2 passes over 64 MiB
    Interactive,
    /// 3 passes over 256 MiB
    Moderate,
    /// 4 passes over 1 GiB
    Sensitive,
}

impl std::str::FromStr for KdfProfile {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interactive" => Ok(Self::Interactive),
            "moderate" => Ok(Self::Moderate),
            "sensitive" => Ok(Self::Sensitive),
            other => Err(CryptoError::KeyDerivation(format!(
                "unknown KDF profile: {other} (expected interactive, moderate or sensitive)"
            ))),
        }
    }
}

/// Argon2id parameters for KDF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    /// Memory cost in KiB (interactive: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / passes (interactive: 2)
    pub time_cost: u32,
    /// Parallelism (default: 1)
    pub parallelism: u32,
}

impl KdfParams {
    pub const fn interactive() -> Self {
        Self {
            mem_cost_kib: 64 * 1024,
            time_cost: 2,
            parallelism: 1,
        }
    }

    pub const fn moderate() -> Self {
        Self {
            mem_cost_kib: 256 * 1024,
            time_cost: 3,
            parallelism: 1,
        }
    }

    pub const fn sensitive() -> Self {
        Self {
            mem_cost_kib: 1024 * 1024,
            time_cost: 4,
            parallelism: 1,
        }
    }

    pub const fn from_profile(profile: KdfProfile) -> Self {
        match profile {
            KdfProfile::Interactive => Self::interactive(),
            KdfProfile::Moderate => Self::moderate(),
            KdfProfile::Sensitive => Self::sensitive(),
        }
    }

    /// Reject costs above [`MAX_MEM_COST_KIB`], [`MAX_TIME_COST`] or
    /// [`MAX_PARALLELISM`]. Parameters read from disk are untrusted.
    pub fn check_bounds(&self) -> CryptoResult<()> {
        if self.mem_cost_kib > MAX_MEM_COST_KIB {
            return Err(CryptoError::KeyDerivation(format!(
                "memory cost {} KiB exceeds the {MAX_MEM_COST_KIB} KiB limit",
                self.mem_cost_kib
            )));
        }
        if self.time_cost > MAX_TIME_COST {
            return Err(CryptoError::KeyDerivation(format!(
                "time cost {} exceeds the limit of {MAX_TIME_COST}",
                self.time_cost
            )));
        }
        if self.parallelism > MAX_PARALLELISM {
            return Err(CryptoError::KeyDerivation(format!(
                "parallelism {} exceeds the limit of {MAX_PARALLELISM}",
                self.parallelism
            )));
        }
        Ok(())
    }

    /// Build the `argon2` crate's parameter set, validating the limits.
    pub(crate) fn to_argon2(self, output_len: Option<usize>) -> CryptoResult<Params> {
        self.check_bounds()?;
        Params::new(
            self.mem_cost_kib,
            self.time_cost,
            self.parallelism,
            output_len,
        )
        .map_err(|e| CryptoError::KeyDerivation(format!("invalid Argon2id params: {e}")))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Generate a fresh random salt for one encryption session.
pub fn generate_salt() -> Salt {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Allocate Argon2 working memory, reporting failure instead of aborting.
pub(crate) fn reserve_blocks(count: usize) -> CryptoResult<Vec<Block>> {
    let mut blocks = Vec::new();
    blocks.try_reserve_exact(count).map_err(|e| {
        CryptoError::KeyDerivation(format!("cannot allocate {count} Argon2 blocks: {e}"))
    })?;
    blocks.resize(count, Block::default());
    Ok(blocks)
}

/// Derive a 256-bit stream key from a password and salt using Argon2id.
///
/// The same `(password, salt, params)` always yields the same key. Parameter
/// or resource failures are reported as [`CryptoError::KeyDerivation`] and are
/// not retried.
pub fn derive_key(
    password: &SecretString,
    salt: &Salt,
    params: &KdfParams,
) -> CryptoResult<SymmetricKey> {
    ensure_ready()?;

    let secret = password.expose_secret();
    if secret.is_empty() {
        return Err(CryptoError::KeyDerivation("password must not be empty".into()));
    }

    let argon2_params = params.to_argon2(Some(KEY_SIZE))?;
    let mut blocks = reserve_blocks(argon2_params.block_count())?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into_with_memory(secret.as_bytes(), salt, &mut key, &mut blocks)
        .map_err(|e| CryptoError::KeyDerivation(format!("Argon2id KDF failed: {e}")))?;

    debug!(
        mem_cost_kib = params.mem_cost_kib,
        time_cost = params.time_cost,
        "derived stream key"
    );

    Ok(SymmetricKey::from_bytes(key))
}
