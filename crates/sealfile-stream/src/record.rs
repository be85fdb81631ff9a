//! Side-channel encryption record
//!
//! Everything a caller must persist next to a container to decrypt it later.
//! None of it is secret:
//! ```json
//! {
//!   "salt": "<base64>",
//!   "header": "<base64>",
//!   "passwordVerifierHash": "$argon2id$v=19$…",
//!   "encryptedMetadata": { "header": "<base64>", "data": "<base64>" },
//!   "kdf": { "memCostKib": 65536, "timeCost": 2, "parallelism": 1 },
//!   "chunkSize": 65536
//! }
//! ```

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use sealfile_crypto::{
    verify_password, CipherHeader, CryptoError, EncryptedMetadata, KdfParams, Salt, CHUNK_SIZE,
    HEADER_SIZE, SALT_SIZE,
};

use crate::error::{PipelineError, PipelineResult};

fn default_chunk_size() -> usize {
    CHUNK_SIZE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionRecord {
    /// Argon2id salt of the stream key (base64)
    pub salt: String,
    /// Cipher header of the file body stream (base64)
    pub header: String,
    /// PHC string for password checks; never used to derive the key
    pub password_verifier_hash: String,
    pub encrypted_metadata: EncryptedMetadata,
    /// Argon2id parameters the key was derived with
    #[serde(default)]
    pub kdf: KdfParams,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl EncryptionRecord {
    pub fn new(
        salt: &Salt,
        header: &CipherHeader,
        password_verifier_hash: String,
        encrypted_metadata: EncryptedMetadata,
        kdf: KdfParams,
    ) -> Self {
        Self {
            salt: URL_SAFE_NO_PAD.encode(salt),
            header: URL_SAFE_NO_PAD.encode(header),
            password_verifier_hash,
            encrypted_metadata,
            kdf,
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn salt_bytes(&self) -> PipelineResult<Salt> {
        decode_fixed::<SALT_SIZE>("salt", &self.salt)
    }

    pub fn header_bytes(&self) -> PipelineResult<CipherHeader> {
        decode_fixed::<HEADER_SIZE>("header", &self.header)
    }

    /// Check a candidate password against the stored verifier hash.
    pub fn verify_password(&self, candidate: &SecretString) -> PipelineResult<bool> {
        Ok(verify_password(&self.password_verifier_hash, candidate)?)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.chunk_size != CHUNK_SIZE {
            return Err(PipelineError::Record(format!(
                "chunk size {} is not supported (expected {CHUNK_SIZE})",
                self.chunk_size
            )));
        }
        self.kdf
            .check_bounds()
            .map_err(|e| PipelineError::Record(format!("kdf: {e}")))?;
        self.salt_bytes()?;
        self.header_bytes()?;
        Ok(())
    }

    pub fn to_json(&self) -> PipelineResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Record(format!("serialization: {e}")))
    }

    pub fn from_json(data: &str) -> PipelineResult<Self> {
        let record: Self = serde_json::from_str(data)
            .map_err(|e| PipelineError::Record(format!("deserialization: {e}")))?;
        record.validate()?;
        Ok(record)
    }
}

fn decode_fixed<const N: usize>(field: &str, value: &str) -> PipelineResult<[u8; N]> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| PipelineError::Record(format!("{field}: base64 decode: {e}")))?;
    bytes.as_slice().try_into().map_err(|_| {
        PipelineError::Crypto(CryptoError::StreamInit(format!(
            "{field} is {} bytes (expected {N})",
            bytes.len()
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EncryptionRecord {
        EncryptionRecord::new(
            &[1u8; SALT_SIZE],
            &[2u8; HEADER_SIZE],
            "$argon2id$v=19$m=1024,t=1,p=1$c2FsdHNhbHRzYWx0$aGFzaA".into(),
            EncryptedMetadata {
                header: "aGVhZGVy".into(),
                data: "ZGF0YQ".into(),
            },
            KdfParams::interactive(),
        )
    }

    #[test]
    fn test_record_json_shape() {
        let json = sample().to_json().unwrap();
        for key in [
            "\"salt\"",
            "\"header\"",
            "\"passwordVerifierHash\"",
            "\"encryptedMetadata\"",
            "\"memCostKib\"",
            "\"chunkSize\"",
        ] {
            assert!(json.contains(key), "missing {key} in {json}");
        }

        let back = EncryptionRecord::from_json(&json).unwrap();
        assert_eq!(back, sample());
        assert_eq!(back.salt_bytes().unwrap(), [1u8; SALT_SIZE]);
        assert_eq!(back.header_bytes().unwrap(), [2u8; HEADER_SIZE]);
    }

    #[test]
    fn test_record_defaults_for_older_records() {
        let json = r#"{
            "salt": "AQEBAQEBAQEBAQEBAQEBAQ",
            "header": "AgICAgICAgICAgICAgICAgICAgICAgIC",
            "passwordVerifierHash": "$argon2id$v=19$m=65536,t=2,p=1$c2FsdA$aGFzaA",
            "encryptedMetadata": { "header": "aA", "data": "ZA" }
        }"#;
        let record = EncryptionRecord::from_json(json).unwrap();
        assert_eq!(record.kdf, KdfParams::interactive());
        assert_eq!(record.chunk_size, CHUNK_SIZE);
    }

    #[test]
    fn test_record_rejects_wrong_sizes() {
        let mut record = sample();
        record.header = URL_SAFE_NO_PAD.encode([0u8; 5]);
        assert!(matches!(
            record.validate(),
            Err(PipelineError::Crypto(CryptoError::StreamInit(_)))
        ));

        let mut record = sample();
        record.chunk_size = 4096;
        assert!(matches!(record.validate(), Err(PipelineError::Record(_))));

        let mut record = sample();
        record.salt = "***".into();
        assert!(matches!(record.validate(), Err(PipelineError::Record(_))));
    }

    #[test]
    fn test_record_rejects_oversized_kdf() {
        let mut record = sample();
        record.kdf.mem_cost_kib = u32::MAX;
        assert!(matches!(record.validate(), Err(PipelineError::Record(_))));

        let mut record = sample();
        record.kdf.time_cost = 1000;
        let json = record.to_json().unwrap();
        assert!(matches!(
            EncryptionRecord::from_json(&json),
            Err(PipelineError::Record(_))
        ));
    }
}
