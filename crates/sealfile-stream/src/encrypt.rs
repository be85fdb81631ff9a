//! Encrypt side: plaintext source → container sink
//!
//! Frame order produced by [`ContainerEncryptor`]:
//! ```text
//! frame 0: SIGNATURE ‖ salt ‖ header
//! frame 1..=n: one encrypted chunk each, the last one tagged FINAL
//! ```

use secrecy::SecretString;
use tracing::{debug, info, warn};

use sealfile_crypto::{
    assemble_header, encrypt_metadata, generate_salt, CipherHeader, FileMetadata, KdfParams,
    PushStream, Salt, SymmetricKey, Tag, CHUNK_SIZE, SIGNATURE,
};

use crate::error::{PipelineError, PipelineResult};
use crate::hooks::Hooks;
use crate::io::{ChunkSink, ChunkSource};
use crate::keying::derive_key_and_verifier;
use crate::record::EncryptionRecord;

#[derive(Debug, Clone)]
pub struct EncryptOptions {
    pub kdf: KdfParams,
    pub metadata: FileMetadata,
}

impl EncryptOptions {
    pub fn new(metadata: FileMetadata) -> Self {
        Self {
            kdf: KdfParams::default(),
            metadata,
        }
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }
}

/// Pull-based producer of container frames.
///
/// Each call to [`next_frame`](Self::next_frame) reads at most one plaintext
/// window, so nothing is read ahead of what the consumer has taken.
pub struct ContainerEncryptor<'s, S: ChunkSource> {
    source: &'s mut S,
    stream: PushStream,
    preamble: Option<Vec<u8>>,
    position: u64,
    total: u64,
}

impl<'s, S: ChunkSource> ContainerEncryptor<'s, S> {
    /// Start a container for `source`; the returned header belongs to the body stream.
    pub fn new(source: &'s mut S, key: &SymmetricKey, salt: &Salt) -> PipelineResult<(Self, CipherHeader)> {
        let (stream, header) = PushStream::init(key)?;
        let total = source.len();
        let encryptor = Self {
            source,
            stream,
            preamble: Some(assemble_header(SIGNATURE, salt, &header)),
            position: 0,
            total,
        };
        Ok((encryptor, header))
    }

    /// The next frame of the container, or `None` once the FINAL chunk was produced.
    pub async fn next_frame(&mut self) -> PipelineResult<Option<Vec<u8>>> {
        if let Some(preamble) = self.preamble.take() {
            return Ok(Some(preamble));
        }
        if self.is_finished() {
            return Ok(None);
        }

        let remaining = self.total - self.position;
        let len = remaining.min(CHUNK_SIZE as u64) as usize;
        let tag = if self.position + (len as u64) < self.total {
            Tag::Message
        } else {
            Tag::Final
        };

        let plaintext = self.source.read_at(self.position, len).await?;
        let frame = self.stream.push(&plaintext, tag)?;
        self.position += len as u64;
        Ok(Some(frame))
    }

    pub fn is_finished(&self) -> bool {
        self.preamble.is_none() && self.stream.phase() == sealfile_crypto::StreamPhase::Finalized
    }

    /// Fraction of the plaintext consumed so far
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return if self.is_finished() { 1.0 } else { 0.0 };
        }
        self.position as f64 / self.total as f64
    }

    pub fn chunks_written(&self) -> u64 {
        self.stream.chunks_written()
    }
}

/// Encrypt `source` into `sink` under a key derived from `password`.
///
/// Returns the side-channel record the caller must persist. On error or
/// cancellation the sink is aborted and never finished.
pub async fn encrypt_stream<S, K>(
    source: &mut S,
    sink: &mut K,
    password: &SecretString,
    options: &EncryptOptions,
    hooks: Hooks<'_>,
) -> PipelineResult<EncryptionRecord>
where
    S: ChunkSource,
    K: ChunkSink,
{
    let message = format!("Encrypting {}...", options.metadata.name);
    info!(name = %options.metadata.name, bytes = source.len(), "encrypt session starting");

    let salt = generate_salt();
    let (key, verifier) = match derive_key_and_verifier(password, salt, options.kdf).await {
        Ok(derived) => derived,
        Err(e) => return Err(abort(sink, e).await),
    };
    let encrypted_metadata = match encrypt_metadata(&key, &options.metadata) {
        Ok(envelope) => envelope,
        Err(e) => return Err(abort(sink, e.into()).await),
    };

    let (mut encryptor, header) = match ContainerEncryptor::new(source, &key, &salt) {
        Ok(started) => started,
        Err(e) => return Err(abort(sink, e).await),
    };

    loop {
        if hooks.cancelled() {
            info!(name = %options.metadata.name, "encrypt session cancelled");
            return Err(abort(sink, PipelineError::Cancelled).await);
        }
        hooks.report(encryptor.fraction(), &message);

        let frame = match encryptor.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => return Err(abort(sink, e).await),
        };
        if let Err(e) = sink.append(&frame).await {
            return Err(abort(sink, e.into()).await);
        }
    }

    let chunks = encryptor.chunks_written();
    if let Err(e) = sink.finish().await {
        return Err(abort(sink, e.into()).await);
    }
    hooks.report(1.0, &message);

    debug!(chunks, "container written");
    info!(name = %options.metadata.name, chunks, "encrypt session complete");

    Ok(EncryptionRecord::new(
        &salt,
        &header,
        verifier,
        encrypted_metadata,
        options.kdf,
    ))
}

/// Abort the sink and hand back the error that caused it.
pub(crate) async fn abort<K: ChunkSink>(sink: &mut K, err: PipelineError) -> PipelineError {
    if let Err(abort_err) = sink.abort().await {
        warn!(error = %abort_err, "failed to abort output after: {err}");
    }
    err
}
