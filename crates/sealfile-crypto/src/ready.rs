//! Process-wide readiness gate for the cryptographic primitives
//!
//! [`initialize`] runs a one-time self-test of the entropy source and the
//! XChaCha20-Poly1305 AEAD. It is idempotent: later calls return the cached
//! outcome. Every key derivation, stream, metadata and verifier entry point
//! fails with [`CryptoError::NotReady`] until it has succeeded.

use std::sync::OnceLock;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use tracing::{debug, error};

use crate::error::{CryptoError, CryptoResult};
use crate::{HEADER_SIZE, KEY_SIZE};

static READY: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialize the cryptographic primitives. Safe to call many times.
pub fn initialize() -> CryptoResult<()> {
    READY
        .get_or_init(|| {
            let outcome = self_test();
            match &outcome {
                Ok(()) => debug!("crypto self-test passed"),
                Err(e) => error!(error = %e, "crypto self-test failed"),
            }
            outcome
        })
        .clone()
        .map_err(CryptoError::SelfTest)
}

/// Whether [`initialize`] has completed successfully.
pub fn is_ready() -> bool {
    matches!(READY.get(), Some(Ok(())))
}

pub(crate) fn ensure_ready() -> CryptoResult<()> {
    if is_ready() {
        Ok(())
    } else {
        Err(CryptoError::NotReady)
    }
}

fn self_test() -> Result<(), String> {
    let mut sample = [0u8; KEY_SIZE];
    rand::rngs::OsRng
        .try_fill_bytes(&mut sample)
        .map_err(|e| format!("OS entropy source unavailable: {e}"))?;
    if sample.iter().all(|b| *b == 0) {
        return Err("OS entropy source returned all zeros".into());
    }

    let cipher = XChaCha20Poly1305::new(&[0x5Au8; KEY_SIZE].into());
    let nonce = XNonce::from([0xA5u8; HEADER_SIZE]);
    let message = b"sealfile self-test";

    let mut sealed = cipher
        .encrypt(&nonce, message.as_ref())
        .map_err(|e| format!("AEAD encrypt: {e}"))?;
    let opened = cipher
        .decrypt(&nonce, sealed.as_ref())
        .map_err(|e| format!("AEAD decrypt: {e}"))?;
    if opened != message {
        return Err("AEAD round trip mismatch".into());
    }

    sealed[0] ^= 0x01;
    if cipher.decrypt(&nonce, sealed.as_ref()).is_ok() {
        return Err("AEAD accepted a forged ciphertext".into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        initialize().unwrap();
        initialize().unwrap();
        assert!(is_ready());
        assert!(ensure_ready().is_ok());
    }
}
