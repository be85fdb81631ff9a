//! Encrypted file metadata (name, content type)
//!
//! The metadata record is serialized to JSON and encrypted as a single FINAL
//! chunk of its own stream. It shares the file's key but never its header, so
//! it can be decrypted without touching the file body.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::SymmetricKey;
use crate::stream::{PullStream, PushStream, Tag};

/// Plaintext metadata carried alongside an encrypted file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Original file name
    pub name: String,
    /// MIME type, if known
    #[serde(rename = "type", default)]
    pub content_type: Option<String>,
}

impl FileMetadata {
    pub fn new(name: impl Into<String>, content_type: Option<String>) -> Self {
        Self {
            name: name.into(),
            content_type,
        }
    }
}

/// Metadata ciphertext plus the header of the stream that produced it (both base64)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMetadata {
    pub header: String,
    pub data: String,
}

/// Encrypt a metadata record under `key` with a brand-new stream.
pub fn encrypt_metadata(key: &SymmetricKey, metadata: &FileMetadata) -> CryptoResult<EncryptedMetadata> {
    let json = serde_json::to_vec(metadata)
        .map_err(|e| CryptoError::MetadataFormat(format!("serialization: {e}")))?;

    let (mut stream, header) = PushStream::init(key)?;
    let data = stream.push(&json, Tag::Final)?;

    debug!(bytes = json.len(), "encrypted metadata record");

    Ok(EncryptedMetadata {
        header: URL_SAFE_NO_PAD.encode(header),
        data: URL_SAFE_NO_PAD.encode(data),
    })
}

/// Decrypt a metadata envelope produced by [`encrypt_metadata`].
///
/// Tampering, a wrong key or an undecodable envelope yield
/// [`CryptoError::MetadataDecrypt`]; a plaintext that is not a metadata record
/// yields [`CryptoError::MetadataFormat`].
pub fn decrypt_metadata(key: &SymmetricKey, envelope: &EncryptedMetadata) -> CryptoResult<FileMetadata> {
    let wrap = |e: CryptoError| CryptoError::MetadataDecrypt(Box::new(e));

    let header = URL_SAFE_NO_PAD
        .decode(&envelope.header)
        .map_err(|e| wrap(CryptoError::StreamInit(format!("metadata header base64: {e}"))))?;
    let data = URL_SAFE_NO_PAD
        .decode(&envelope.data)
        .map_err(|e| wrap(CryptoError::Authentication(format!("metadata data base64: {e}"))))?;

    let mut stream = PullStream::init(&header, key).map_err(wrap)?;
    let (plaintext, tag) = stream.pull(&data).map_err(wrap)?;

    if tag != Tag::Final {
        return Err(CryptoError::MetadataFormat(
            "metadata chunk is not tagged FINAL".into(),
        ));
    }

    serde_json::from_slice(&plaintext)
        .map_err(|e| CryptoError::MetadataFormat(format!("metadata JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(byte: u8) -> SymmetricKey {
        crate::initialize().unwrap();
        SymmetricKey::from_bytes([byte; 32])
    }

    #[test]
    fn test_metadata_roundtrip() {
        let key = test_key(1);
        let meta = FileMetadata::new("holiday photo.jpg", Some("image/jpeg".into()));

        let envelope = encrypt_metadata(&key, &meta).unwrap();
        assert_eq!(decrypt_metadata(&key, &envelope).unwrap(), meta);
    }

    #[test]
    fn test_metadata_without_type() {
        let key = test_key(1);
        let meta = FileMetadata::new("notes", None);

        let envelope = encrypt_metadata(&key, &meta).unwrap();
        assert_eq!(decrypt_metadata(&key, &envelope).unwrap().content_type, None);
    }

    #[test]
    fn test_metadata_wire_shape() {
        let json = serde_json::to_string(&FileMetadata::new("a.txt", None)).unwrap();
        assert_eq!(json, r#"{"name":"a.txt","type":null}"#);

        let parsed: FileMetadata = serde_json::from_str(r#"{"name":"b.bin"}"#).unwrap();
        assert_eq!(parsed.content_type, None);
    }

    #[test]
    fn test_metadata_wrong_key() {
        let envelope = encrypt_metadata(&test_key(1), &FileMetadata::new("x", None)).unwrap();

        let err = decrypt_metadata(&test_key(2), &envelope).unwrap_err();
        assert!(matches!(err, CryptoError::MetadataDecrypt(_)));
        assert!(err.is_authentication());
    }

    #[test]
    fn test_metadata_tampered() {
        let key = test_key(1);
        let envelope = encrypt_metadata(&key, &FileMetadata::new("x", None)).unwrap();

        let mut data = URL_SAFE_NO_PAD.decode(&envelope.data).unwrap();
        data[3] ^= 0x40;
        let tampered = EncryptedMetadata {
            header: envelope.header.clone(),
            data: URL_SAFE_NO_PAD.encode(data),
        };

        assert!(decrypt_metadata(&key, &tampered).unwrap_err().is_authentication());
    }

    #[test]
    fn test_metadata_bad_header_length() {
        let key = test_key(1);
        let envelope = encrypt_metadata(&key, &FileMetadata::new("x", None)).unwrap();
        let truncated = EncryptedMetadata {
            header: URL_SAFE_NO_PAD.encode([0u8; 8]),
            data: envelope.data,
        };

        let err = decrypt_metadata(&key, &truncated).unwrap_err();
        match err {
            CryptoError::MetadataDecrypt(inner) => {
                assert!(matches!(*inner, CryptoError::StreamInit(_)))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_metadata_not_a_record() {
        let key = test_key(1);
        let (mut stream, header) = PushStream::init(&key).unwrap();
        let data = stream.push(b"[1, 2, 3]", Tag::Final).unwrap();
        let envelope = EncryptedMetadata {
            header: URL_SAFE_NO_PAD.encode(header),
            data: URL_SAFE_NO_PAD.encode(data),
        };

        assert!(matches!(
            decrypt_metadata(&key, &envelope),
            Err(CryptoError::MetadataFormat(_))
        ));
    }

    #[test]
    fn test_metadata_non_final_chunk() {
        let key = test_key(1);
        let (mut stream, header) = PushStream::init(&key).unwrap();
        let data = stream.push(br#"{"name":"x"}"#, Tag::Message).unwrap();
        let envelope = EncryptedMetadata {
            header: URL_SAFE_NO_PAD.encode(header),
            data: URL_SAFE_NO_PAD.encode(data),
        };

        assert!(matches!(
            decrypt_metadata(&key, &envelope),
            Err(CryptoError::MetadataFormat(_))
        ));
    }

    #[test]
    fn test_each_envelope_has_fresh_header() {
        let key = test_key(1);
        let meta = FileMetadata::new("same", None);
        let a = encrypt_metadata(&key, &meta).unwrap();
        let b = encrypt_metadata(&key, &meta).unwrap();
        assert_ne!(a.header, b.header);
        assert_ne!(a.data, b.data);
    }
}
