use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("malformed password verifier hash: {0}")]
    VerifierFormat(String),

    #[error("cannot initialize stream: {0}")]
    StreamInit(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("stream misuse: {0}")]
    StreamMisuse(&'static str),

    #[error("metadata decryption failed: {0}")]
    MetadataDecrypt(#[source] Box<CryptoError>),

    #[error("malformed metadata record: {0}")]
    MetadataFormat(String),

    #[error("cryptographic primitives not initialized (call sealfile_crypto::initialize first)")]
    NotReady,

    #[error("cryptographic self-test failed: {0}")]
    SelfTest(String),
}

impl CryptoError {
    /// True for a tag mismatch, including one wrapped by a metadata failure.
    ///
    /// This is what a wrong password looks like on the decrypt side.
    pub fn is_authentication(&self) -> bool {
        match self {
            CryptoError::Authentication(_) => true,
            CryptoError::MetadataDecrypt(inner) => inner.is_authentication(),
            _ => false,
        }
    }
}
