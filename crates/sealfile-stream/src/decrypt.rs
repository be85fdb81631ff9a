//! Decrypt side: container source → plaintext sink
//!
//! Windows of `CHUNK_SIZE + AUTH_OVERHEAD` bytes are read at absolute offsets
//! from the body offset; only the FINAL chunk may arrive in a shorter window.
//! End-of-container is the FINAL tag:
//!   - input ends before FINAL           → `IncompleteStream`
//!   - FINAL followed by more bytes      → `TrailingData`
//!   - short window that is not FINAL    → `IncompleteStream`

use secrecy::SecretString;
use tracing::{debug, info};

use sealfile_crypto::{
    decrypt_metadata, parse_preamble, ContainerLayout, CryptoError, FileMetadata, KdfParams,
    PullStream, StreamPhase, SymmetricKey, Tag, AUTH_OVERHEAD,
};

use crate::encrypt::abort;
use crate::error::{PipelineError, PipelineResult};
use crate::hooks::Hooks;
use crate::io::{ChunkSink, ChunkSource};
use crate::keying::derive_key_blocking;
use crate::record::EncryptionRecord;

#[derive(Debug, Clone, Default)]
pub struct DecryptOptions {
    /// Argon2id parameters; taken from the record when one is supplied
    pub kdf: KdfParams,
    /// First chunk to decrypt (0 = whole file)
    pub start_chunk: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptOutcome {
    /// Recovered metadata, when a record was supplied
    pub metadata: Option<FileMetadata>,
    pub bytes_written: u64,
    pub chunks: u64,
}

/// Pull-based chunk decryptor over a container source.
pub struct ContainerDecryptor<'s, S: ChunkSource> {
    source: &'s mut S,
    stream: PullStream,
    layout: ContainerLayout,
    position: u64,
    total: u64,
}

impl<'s, S: ChunkSource> ContainerDecryptor<'s, S> {
    /// Decrypt chunks of the body stream with `header`, starting at `start_chunk`.
    pub fn new(source: &'s mut S, header: &[u8], key: &SymmetricKey, start_chunk: u64) -> PipelineResult<Self> {
        let layout = ContainerLayout::standard();
        let total = source.len();
        let position = layout
            .chunk_offset(start_chunk)
            .filter(|offset| *offset <= total)
            .ok_or_else(|| {
                PipelineError::IncompleteStream(format!(
                    "start chunk {start_chunk} lies past the end of the input ({total} bytes)"
                ))
            })?;
        let stream = PullStream::resume(header, key, start_chunk)?;
        Ok(Self {
            source,
            stream,
            layout,
            position,
            total,
        })
    }

    /// The next plaintext chunk, or `None` after the FINAL chunk.
    pub async fn next_chunk(&mut self) -> PipelineResult<Option<Vec<u8>>> {
        if self.stream.phase() == StreamPhase::Finalized {
            return Ok(None);
        }

        let window = self.layout.window(self.position, self.total)?.ok_or_else(|| {
            PipelineError::IncompleteStream(format!(
                "input ended after chunk {} without a FINAL chunk",
                self.stream.next_index()
            ))
        })?;
        if window.len < AUTH_OVERHEAD {
            return Err(PipelineError::IncompleteStream(format!(
                "chunk {} has only {} bytes left in the input",
                window.index, window.len
            )));
        }

        let ciphertext = self.source.read_at(window.offset, window.len).await?;
        let (plaintext, tag) = self.stream.pull(&ciphertext)?;
        self.position += window.len as u64;

        match tag {
            Tag::Message if window.short => Err(PipelineError::IncompleteStream(format!(
                "chunk {} is truncated and not FINAL",
                window.index
            ))),
            Tag::Final if self.position < self.total => Err(PipelineError::TrailingData {
                offset: self.position,
            }),
            _ => Ok(Some(plaintext)),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.stream.phase() == StreamPhase::Finalized
    }

    /// Fraction of the container consumed so far
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.position as f64 / self.total as f64
    }

    pub fn next_index(&self) -> u64 {
        self.stream.next_index()
    }
}

/// Decrypt the container in `source` into `sink`.
///
/// Salt and header are read from the container itself. When `record` is
/// given, they must match it, its KDF parameters are used, and the metadata is
/// recovered too. A wrong password fails on the first chunk before anything is
/// written. On error or cancellation the sink is aborted and never finished.
pub async fn decrypt_stream<S, K>(
    source: &mut S,
    sink: &mut K,
    password: &SecretString,
    record: Option<&EncryptionRecord>,
    options: &DecryptOptions,
    hooks: Hooks<'_>,
) -> PipelineResult<DecryptOutcome>
where
    S: ChunkSource,
    K: ChunkSink,
{
    match run_decrypt(source, sink, password, record, options, hooks).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => Err(abort(sink, e).await),
    }
}

async fn run_decrypt<S, K>(
    source: &mut S,
    sink: &mut K,
    password: &SecretString,
    record: Option<&EncryptionRecord>,
    options: &DecryptOptions,
    hooks: Hooks<'_>,
) -> PipelineResult<DecryptOutcome>
where
    S: ChunkSource,
    K: ChunkSink,
{
    let layout = ContainerLayout::standard();
    let preamble_len = layout.body_offset();
    if source.len() < preamble_len {
        return Err(CryptoError::StreamInit(format!(
            "input is {} bytes, too short for a container preamble ({preamble_len} bytes)",
            source.len()
        ))
        .into());
    }
    let preamble = source.read_at(0, preamble_len as usize).await?;
    let (salt, header) = parse_preamble(&preamble)?;

    let kdf = match record {
        Some(record) => {
            record.validate()?;
            if record.salt_bytes()? != salt || record.header_bytes()? != header {
                return Err(CryptoError::StreamInit(
                    "container salt/header do not match the encryption record".into(),
                )
                .into());
            }
            record.kdf
        }
        None => options.kdf,
    };

    info!(bytes = source.len(), start_chunk = options.start_chunk, "decrypt session starting");

    let key = derive_key_blocking(password, salt, kdf).await?;

    // Metadata first: a wrong password is reported before any body output
    let metadata = match record {
        Some(record) => Some(decrypt_metadata(&key, &record.encrypted_metadata)?),
        None => None,
    };
    let message = match &metadata {
        Some(meta) => format!("Decrypting {}...", meta.name),
        None => "Decrypting...".to_string(),
    };

    let mut decryptor = ContainerDecryptor::new(source, &header, &key, options.start_chunk)?;
    let mut bytes_written = 0u64;
    let mut chunks = 0u64;

    while !decryptor.is_finished() {
        if hooks.cancelled() {
            info!("decrypt session cancelled");
            return Err(PipelineError::Cancelled);
        }
        hooks.report(decryptor.fraction(), &message);

        if let Some(plaintext) = decryptor.next_chunk().await? {
            sink.append(&plaintext).await?;
            bytes_written += plaintext.len() as u64;
            chunks += 1;
        }
    }

    sink.finish().await?;
    hooks.report(1.0, &message);
    debug!(chunks, bytes_written, "container decrypted");
    info!(chunks, bytes_written, "decrypt session complete");

    Ok(DecryptOutcome {
        metadata,
        bytes_written,
        chunks,
    })
}

/// Recover only the metadata from a record, without touching the container.
pub async fn open_metadata(record: &EncryptionRecord, password: &SecretString) -> PipelineResult<FileMetadata> {
    record.validate()?;
    let key = derive_key_blocking(password, record.salt_bytes()?, record.kdf).await?;
    Ok(decrypt_metadata(&key, &record.encrypted_metadata)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encrypt::ContainerEncryptor;
    use crate::io::MemorySource;
    use proptest::prelude::*;
    use sealfile_crypto::{assemble_header, PushStream, CHUNK_SIZE, SIGNATURE};

    fn test_key() -> SymmetricKey {
        sealfile_crypto::initialize().unwrap();
        SymmetricKey::from_bytes([5u8; 32])
    }

    /// Hand-built container from explicit (plaintext, tag) chunks.
    fn container(key: &SymmetricKey, chunks: &[(&[u8], Tag)]) -> (Vec<u8>, [u8; 24]) {
        let (mut push, header) = PushStream::init(key).unwrap();
        let mut out = assemble_header(SIGNATURE, &[0u8; 16], &header);
        for (plaintext, tag) in chunks {
            out.extend(push.push(plaintext, *tag).unwrap());
        }
        (out, header)
    }

    async fn drain(source: &mut MemorySource, header: &[u8], key: &SymmetricKey) -> PipelineResult<Vec<u8>> {
        drain_from(source, header, key, 0).await
    }

    async fn drain_from(
        source: &mut MemorySource,
        header: &[u8],
        key: &SymmetricKey,
        start: u64,
    ) -> PipelineResult<Vec<u8>> {
        let mut dec = ContainerDecryptor::new(source, header, key, start)?;
        let mut out = Vec::new();
        while let Some(chunk) = dec.next_chunk().await? {
            out.extend(chunk);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_missing_final_is_incomplete() {
        let key = test_key();
        let full = vec![1u8; CHUNK_SIZE];
        let (bytes, header) = container(&key, &[(&full, Tag::Message)]);
        let mut source = MemorySource::new(bytes);

        let err = drain(&mut source, &header, &key).await.unwrap_err();
        assert!(matches!(err, PipelineError::IncompleteStream(_)), "{err}");
    }

    #[tokio::test]
    async fn test_trailing_data_after_final() {
        let key = test_key();
        let (mut bytes, header) = container(&key, &[(b"done", Tag::Final)]);
        bytes.extend_from_slice(&[0u8; 40]);
        let mut source = MemorySource::new(bytes);

        let err = drain(&mut source, &header, &key).await.unwrap_err();
        assert!(matches!(err, PipelineError::TrailingData { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_short_message_chunk_is_incomplete() {
        let key = test_key();
        let (bytes, header) = container(&key, &[(b"short but not final", Tag::Message)]);
        let mut source = MemorySource::new(bytes);

        // A short window that authenticates but is not FINAL
        let mut dec = ContainerDecryptor::new(&mut source, &header, &key, 0).unwrap();
        let err = dec.next_chunk().await.unwrap_err();
        assert!(matches!(err, PipelineError::IncompleteStream(_)));
    }

    #[tokio::test]
    async fn test_dangling_bytes_shorter_than_overhead() {
        let key = test_key();
        let (mut bytes, header) = container(&key, &[]);
        bytes.extend_from_slice(&[1u8; AUTH_OVERHEAD - 1]);
        let mut source = MemorySource::new(bytes);

        let err = drain(&mut source, &header, &key).await.unwrap_err();
        assert!(matches!(err, PipelineError::IncompleteStream(_)));
    }

    #[tokio::test]
    async fn test_start_chunk_past_end() {
        let key = test_key();
        let (bytes, header) = container(&key, &[(b"tail", Tag::Final)]);

        for start in [2, 1_000_000, u64::MAX / 2, u64::MAX] {
            let mut source = MemorySource::new(bytes.clone());
            let err = match ContainerDecryptor::new(&mut source, &header, &key, start) {
                Ok(_) => panic!("start chunk {start} must be rejected"),
                Err(e) => e,
            };
            assert!(matches!(err, PipelineError::IncompleteStream(_)), "start {start}: {err}");
        }
    }

    #[tokio::test]
    async fn test_short_final_window_is_accepted() {
        let key = test_key();
        let (bytes, header) = container(&key, &[(b"tail", Tag::Final)]);
        let mut source = MemorySource::new(bytes);

        assert_eq!(drain(&mut source, &header, &key).await.unwrap(), b"tail");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Decrypting from any chunk boundary yields exactly the plaintext suffix.
        #[test]
        fn prop_resume_yields_suffix(len in 0usize..3 * CHUNK_SIZE, seed in any::<u8>(), start in 0u64..4) {
            let key = test_key();
            let data: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_mul(seed | 1)).collect();

            let (container, header) = tokio_test::block_on(async {
                let mut source = MemorySource::new(data.clone());
                let (mut enc, header) = ContainerEncryptor::new(&mut source, &key, &[0u8; 16]).unwrap();
                let mut out = Vec::new();
                while let Some(frame) = enc.next_frame().await.unwrap() {
                    out.extend(frame);
                }
                (out, header)
            });

            let chunks = ContainerLayout::standard().chunk_count(len as u64);
            let start = start.min(chunks - 1);
            let plaintext = tokio_test::block_on(async {
                let mut source = MemorySource::new(container);
                drain_from(&mut source, &header, &key, start).await.unwrap()
            });

            prop_assert_eq!(plaintext, &data[start as usize * CHUNK_SIZE..]);
        }
    }
}
