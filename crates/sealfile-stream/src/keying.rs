//! Argon2id work moved off the async executor

use secrecy::{ExposeSecret, SecretString};
use sealfile_crypto::{derive_key, hash_password, KdfParams, Salt, SymmetricKey};

use crate::error::{PipelineError, PipelineResult};

fn detach(password: &SecretString) -> SecretString {
    SecretString::from(password.expose_secret().to_owned())
}

/// Derive the stream key on the blocking pool.
pub(crate) async fn derive_key_blocking(
    password: &SecretString,
    salt: Salt,
    kdf: KdfParams,
) -> PipelineResult<SymmetricKey> {
    let password = detach(password);
    tokio::task::spawn_blocking(move || derive_key(&password, &salt, &kdf))
        .await
        .map_err(|e| PipelineError::Task(format!("key derivation task: {e}")))?
        .map_err(PipelineError::from)
}

/// Derive the stream key and a fresh verifier hash on the blocking pool.
pub(crate) async fn derive_key_and_verifier(
    password: &SecretString,
    salt: Salt,
    kdf: KdfParams,
) -> PipelineResult<(SymmetricKey, String)> {
    let password = detach(password);
    tokio::task::spawn_blocking(move || {
        let key = derive_key(&password, &salt, &kdf)?;
        let verifier = hash_password(&password, &kdf)?;
        Ok::<_, sealfile_crypto::CryptoError>((key, verifier))
    })
    .await
    .map_err(|e| PipelineError::Task(format!("key derivation task: {e}")))?
    .map_err(PipelineError::from)
}
