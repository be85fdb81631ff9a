//! Container framing and chunk offset arithmetic
//!
//! ```text
//! SIGNATURE ‖ salt ‖ cipher header ‖ chunk₀ ‖ chunk₁ ‖ … ‖ chunkₙ₋₁ (FINAL)
//! chunk k starts at body_offset + k·(CHUNK_SIZE + AUTH_OVERHEAD)
//! ```
//!
//! The container does not record the plaintext length. End of stream is the
//! FINAL tag; offsets here only bound reads so they never pass end-of-input.

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::Salt;
use crate::stream::CipherHeader;
use crate::{AUTH_OVERHEAD, CHUNK_SIZE, HEADER_SIZE, SALT_SIZE};

/// Format identifier written at the start of every container.
pub const SIGNATURE: &[u8] = b"sealfile-stream/v1";

/// Concatenate signature, salt and cipher header into the container preamble.
pub fn assemble_header(signature: &[u8], salt: &[u8], header: &[u8]) -> Vec<u8> {
    let mut preamble = Vec::with_capacity(signature.len() + salt.len() + header.len());
    preamble.extend_from_slice(signature);
    preamble.extend_from_slice(salt);
    preamble.extend_from_slice(header);
    preamble
}

/// Byte offset of the first encrypted chunk.
pub fn compute_body_offset(signature: &[u8], salt: &[u8], header: &[u8]) -> u64 {
    (signature.len() + salt.len() + header.len()) as u64
}

/// Split a container preamble into salt and cipher header, checking the signature.
///
/// `bytes` may be longer than the preamble; trailing bytes are ignored.
pub fn parse_preamble(bytes: &[u8]) -> CryptoResult<(Salt, CipherHeader)> {
    let layout = ContainerLayout::standard();
    let needed = layout.body_offset() as usize;
    if bytes.len() < needed {
        return Err(CryptoError::StreamInit(format!(
            "container preamble is {} bytes (expected {needed})",
            bytes.len()
        )));
    }

    let (signature, rest) = bytes.split_at(SIGNATURE.len());
    if signature != SIGNATURE {
        return Err(CryptoError::StreamInit(
            "unrecognized container signature".into(),
        ));
    }

    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&rest[..SALT_SIZE]);
    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&rest[SALT_SIZE..SALT_SIZE + HEADER_SIZE]);
    Ok((salt, header))
}

/// A byte range of the container holding exactly one encrypted chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    pub index: u64,
    pub offset: u64,
    pub len: usize,
    /// The window is shorter than a full chunk (only valid for the FINAL chunk)
    pub short: bool,
}

/// Fixed-size framing of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerLayout {
    pub signature_len: usize,
    pub salt_len: usize,
    pub header_len: usize,
    pub chunk_size: usize,
}

impl ContainerLayout {
    pub const fn standard() -> Self {
        Self {
            signature_len: SIGNATURE.len(),
            salt_len: SALT_SIZE,
            header_len: HEADER_SIZE,
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn body_offset(&self) -> u64 {
        (self.signature_len + self.salt_len + self.header_len) as u64
    }

    /// Ciphertext bytes of a full chunk
    pub fn ciphertext_chunk_len(&self) -> usize {
        self.chunk_size + AUTH_OVERHEAD
    }

    /// Absolute offset of chunk `index`, or `None` if it does not fit in a `u64`.
    pub fn chunk_offset(&self, index: u64) -> Option<u64> {
        index
            .checked_mul(self.ciphertext_chunk_len() as u64)?
            .checked_add(self.body_offset())
    }

    /// Chunk index starting at `offset`, or `None` if `offset` is not on a chunk boundary.
    pub fn chunk_index_at(&self, offset: u64) -> Option<u64> {
        let rel = offset.checked_sub(self.body_offset())?;
        let step = self.ciphertext_chunk_len() as u64;
        (rel % step == 0).then_some(rel / step)
    }

    /// Number of chunks a plaintext of `plaintext_len` bytes encrypts to.
    ///
    /// An empty plaintext still yields one (empty) FINAL chunk.
    pub fn chunk_count(&self, plaintext_len: u64) -> u64 {
        plaintext_len.div_ceil(self.chunk_size as u64).max(1)
    }

    /// Total container size for a plaintext of `plaintext_len` bytes.
    pub fn container_len(&self, plaintext_len: u64) -> u64 {
        self.body_offset() + plaintext_len + self.chunk_count(plaintext_len) * AUTH_OVERHEAD as u64
    }

    /// The window of the chunk starting at `position` in a container of `total` bytes.
    ///
    /// Returns `None` when `position` is at or past end-of-input. The window is
    /// clamped to `total - position`, so it never reads past the end.
    pub fn window(&self, position: u64, total: u64) -> CryptoResult<Option<ChunkWindow>> {
        if position >= total {
            return Ok(None);
        }
        let index = self.chunk_index_at(position).ok_or_else(|| {
            CryptoError::StreamInit(format!("offset {position} is not on a chunk boundary"))
        })?;

        let full = self.ciphertext_chunk_len() as u64;
        let len = full.min(total - position);
        Ok(Some(ChunkWindow {
            index,
            offset: position,
            len: len as usize,
            short: len < full,
        }))
    }
}

impl Default for ContainerLayout {
    fn default() -> Self {
        Self::standard()
    }
}
