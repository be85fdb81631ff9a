//! Chunked XChaCha20-Poly1305 stream (push = encrypt, pull = decrypt)
//!
//! Encrypted chunk format (binary):
//! ```text
//! [1 + N bytes: ciphertext of (tag_byte ‖ plaintext)][16 bytes: Poly1305 MAC]
//! nonce = cipher_header (24 bytes) with chunk_counter (8 bytes, big-endian) XORed into bytes 16..24
//! ```
//!
//! The counter in the nonce binds each chunk to its position, so chunks cannot
//! be reordered, duplicated or dropped. The encrypted tag byte marks the last
//! chunk, so truncation at a chunk boundary is detected by the missing FINAL.
//!
//! Both directions move through `Streaming → Finalized`; the implicit `Init`
//! state is the constructor itself.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use tracing::trace;

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::SymmetricKey;
use crate::ready::ensure_ready;
use crate::{AUTH_OVERHEAD, HEADER_SIZE};

/// Public per-stream initialization value, required to start decryption.
pub type CipherHeader = [u8; HEADER_SIZE];

/// Chunk marker, carried encrypted inside each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    /// More chunks follow
    Message = 0x00,
    /// Last chunk of the stream
    Final = 0x03,
}

impl Tag {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Tag::Message),
            0x03 => Some(Tag::Final),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Streaming,
    Finalized,
}

/// Encrypting side of a stream. Owns its state exclusively.
pub struct PushStream {
    cipher: XChaCha20Poly1305,
    header: CipherHeader,
    counter: u64,
    phase: StreamPhase,
}

impl PushStream {
    /// Start a new stream with a fresh random header.
    pub fn init(key: &SymmetricKey) -> CryptoResult<(Self, CipherHeader)> {
        ensure_ready()?;

        let mut header = [0u8; HEADER_SIZE];
        rand::thread_rng().fill_bytes(&mut header);

        let stream = Self {
            cipher: XChaCha20Poly1305::new(key.as_bytes().into()),
            header,
            counter: 0,
            phase: StreamPhase::Streaming,
        };
        Ok((stream, header))
    }

    pub fn header(&self) -> &CipherHeader {
        &self.header
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Number of chunks pushed so far
    pub fn chunks_written(&self) -> u64 {
        self.counter
    }

    /// Encrypt one chunk. Returns `plaintext.len() + AUTH_OVERHEAD` bytes.
    pub fn push(&mut self, plaintext: &[u8], tag: Tag) -> CryptoResult<Vec<u8>> {
        if self.phase == StreamPhase::Finalized {
            return Err(CryptoError::StreamMisuse("push after FINAL chunk"));
        }

        let mut message = Vec::with_capacity(1 + plaintext.len());
        message.push(tag as u8);
        message.extend_from_slice(plaintext);

        let nonce = chunk_nonce(&self.header, self.counter);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, message.as_ref())
            .map_err(|_| CryptoError::StreamMisuse("chunk exceeds the AEAD message size limit"))?;

        trace!(chunk = self.counter, bytes = plaintext.len(), ?tag, "pushed chunk");

        self.counter += 1;
        if tag == Tag::Final {
            self.phase = StreamPhase::Finalized;
        }
        Ok(ciphertext)
    }
}

impl std::fmt::Debug for PushStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushStream")
            .field("counter", &self.counter)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

/// Decrypting side of a stream.
pub struct PullStream {
    cipher: XChaCha20Poly1305,
    header: CipherHeader,
    counter: u64,
    phase: StreamPhase,
}

impl PullStream {
    /// Start decrypting a stream from its first chunk.
    pub fn init(header: &[u8], key: &SymmetricKey) -> CryptoResult<Self> {
        Self::resume(header, key, 0)
    }

    /// Start decrypting at chunk `chunk_index`.
    ///
    /// The state of a stream is fully determined by key, header and chunk
    /// counter, so resuming never needs a serialized state.
    pub fn resume(header: &[u8], key: &SymmetricKey, chunk_index: u64) -> CryptoResult<Self> {
        ensure_ready()?;

        let header: CipherHeader = header.try_into().map_err(|_| {
            CryptoError::StreamInit(format!(
                "cipher header is {} bytes (expected {HEADER_SIZE})",
                header.len()
            ))
        })?;

        Ok(Self {
            cipher: XChaCha20Poly1305::new(key.as_bytes().into()),
            header,
            counter: chunk_index,
            phase: StreamPhase::Streaming,
        })
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Index of the next chunk this stream expects
    pub fn next_index(&self) -> u64 {
        self.counter
    }

    /// Decrypt and authenticate one chunk, returning its plaintext and tag.
    ///
    /// On failure the state is left untouched.
    pub fn pull(&mut self, ciphertext: &[u8]) -> CryptoResult<(Vec<u8>, Tag)> {
        if self.phase == StreamPhase::Finalized {
            return Err(CryptoError::StreamMisuse("pull after FINAL chunk"));
        }
        if ciphertext.len() < AUTH_OVERHEAD {
            return Err(CryptoError::Authentication(format!(
                "chunk {} is {} bytes, shorter than the {AUTH_OVERHEAD}-byte overhead",
                self.counter,
                ciphertext.len()
            )));
        }

        let nonce = chunk_nonce(&self.header, self.counter);
        let mut message = self.cipher.decrypt(&nonce, ciphertext).map_err(|_| {
            CryptoError::Authentication(format!(
                "chunk {}: wrong password, corrupted data, or chunk out of order",
                self.counter
            ))
        })?;

        let tag = Tag::from_byte(message[0]).ok_or_else(|| {
            CryptoError::Authentication(format!(
                "chunk {}: unrecognized tag byte {:#04x}",
                self.counter, message[0]
            ))
        })?;
        message.remove(0);

        trace!(chunk = self.counter, bytes = message.len(), ?tag, "pulled chunk");

        self.counter += 1;
        if tag == Tag::Final {
            self.phase = StreamPhase::Finalized;
        }
        Ok((message, tag))
    }
}

impl std::fmt::Debug for PullStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullStream")
            .field("counter", &self.counter)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

/// Nonce for chunk `index`: header with the counter XORed into its last 8 bytes.
fn chunk_nonce(header: &CipherHeader, index: u64) -> XNonce {
    let mut nonce = *header;
    for (byte, counter_byte) in nonce[HEADER_SIZE - 8..].iter_mut().zip(index.to_be_bytes()) {
        *byte ^= counter_byte;
    }
    XNonce::from(nonce)
}
