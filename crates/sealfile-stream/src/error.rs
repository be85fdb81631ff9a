use sealfile_crypto::CryptoError;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("incomplete stream: {0}")]
    IncompleteStream(String),

    #[error("unexpected data after the FINAL chunk at offset {offset}")]
    TrailingData { offset: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("encryption record error: {0}")]
    Record(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

impl PipelineError {
    /// Wrong password or tampered data; callers may re-prompt and retry.
    pub fn is_authentication(&self) -> bool {
        matches!(self, PipelineError::Crypto(e) if e.is_authentication())
    }

    /// Caller-initiated abort; a normal outcome with no usable output.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}
