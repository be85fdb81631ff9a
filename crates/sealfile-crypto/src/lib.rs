//! sealfile-crypto: password-based chunked streaming encryption
//!
//! Architecture: Argon2id key derivation + XChaCha20-Poly1305 chunk stream
//!
//! Container layout (binary):
//! ```text
//! SIGNATURE ‖ salt (16) ‖ cipher header (24) ‖ chunk₁ ‖ chunk₂ ‖ … ‖ chunkₙ (FINAL)
//! chunkᵢ = AEAD(key, nonce = header ⊕ i, tag_byte ‖ plaintextᵢ)   (plaintext_len + 17 bytes)
//! ```
//!
//! Key usage:
//! ```text
//! Password ──Argon2id(salt)──▶ SymmetricKey (256-bit, memory only)
//!   ├── file body stream     (own random header)
//!   └── metadata stream      (own random header, single FINAL chunk)
//! Password ──Argon2id(own salt)──▶ PHC verifier string (stored, never used as a key)
//! ```
//!
//! [`initialize`] must be called once per process before any other entry point.

pub mod container;
pub mod error;
pub mod kdf;
pub mod metadata;
pub mod ready;
pub mod stream;
pub mod verifier;

pub use container::{
    assemble_header, compute_body_offset, parse_preamble, ChunkWindow, ContainerLayout, SIGNATURE,
};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{
    derive_key, generate_salt, KdfParams, KdfProfile, Salt, SymmetricKey, MAX_MEM_COST_KIB,
    MAX_PARALLELISM, MAX_TIME_COST,
};
pub use metadata::{decrypt_metadata, encrypt_metadata, EncryptedMetadata, FileMetadata};
pub use ready::{initialize, is_ready};
pub use stream::{CipherHeader, PullStream, PushStream, StreamPhase, Tag};
pub use verifier::{generate_password, hash_password, verify_password};

/// Size of a derived symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the Argon2id salt stored in each container
pub const SALT_SIZE: usize = 16;

/// Size of a per-stream cipher header (an XChaCha20 base nonce, 192-bit)
pub const HEADER_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const MAC_SIZE: usize = 16;

/// Extra ciphertext bytes per chunk: one encrypted tag byte plus the MAC
pub const AUTH_OVERHEAD: usize = 1 + MAC_SIZE;

/// Plaintext bytes per chunk (all but the last chunk carry exactly this many)
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Ciphertext bytes of a full chunk
pub const CIPHERTEXT_CHUNK_SIZE: usize = CHUNK_SIZE + AUTH_OVERHEAD;
