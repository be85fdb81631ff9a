//! Integration test: encrypt → decrypt round-trip over memory and file endpoints
//!
//! Covers chunk-boundary sizes, metadata recovery, non-determinism of fresh
//! sessions and independent concurrent sessions.

use secrecy::SecretString;
use tempfile::TempDir;

use sealfile_crypto::{FileMetadata, KdfParams, CHUNK_SIZE, CIPHERTEXT_CHUNK_SIZE};
use sealfile_stream::{
    decrypt_stream, encrypt_stream, open_metadata, DecryptOptions, EncryptOptions,
    EncryptionRecord, FileSink, FileSource, Hooks, MemorySink, MemorySource,
};

const FAST: KdfParams = KdfParams {
    mem_cost_kib: 1024,
    time_cost: 1,
    parallelism: 1,
};

fn password(p: &str) -> SecretString {
    SecretString::from(p.to_string())
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

async fn seal(data: &[u8], pw: &SecretString, name: &str) -> (Vec<u8>, EncryptionRecord) {
    sealfile_crypto::initialize().unwrap();
    let options = EncryptOptions::new(FileMetadata::new(name, None)).with_kdf(FAST);
    let mut source = MemorySource::new(data.to_vec());
    let mut sink = MemorySink::new();
    let record = encrypt_stream(&mut source, &mut sink, pw, &options, Hooks::none())
        .await
        .expect("encrypt should succeed");
    assert!(sink.is_finished());
    (sink.into_inner(), record)
}

async fn open(container: Vec<u8>, pw: &SecretString, record: &EncryptionRecord) -> Vec<u8> {
    let mut source = MemorySource::new(container);
    let mut sink = MemorySink::new();
    let outcome = decrypt_stream(
        &mut source,
        &mut sink,
        pw,
        Some(record),
        &DecryptOptions::default(),
        Hooks::none(),
    )
    .await
    .expect("decrypt should succeed");
    assert!(sink.is_finished());
    assert_eq!(outcome.bytes_written, sink.bytes().len() as u64);
    sink.into_inner()
}

#[tokio::test]
async fn roundtrip_chunk_boundary_sizes() {
    let pw = password("correct horse battery staple");

    for len in [0, 1, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1, 3 * CHUNK_SIZE + 7] {
        let original = payload(len);
        let (container, record) = seal(&original, &pw, "boundary.bin").await;

        let chunks = if len == 0 { 1 } else { len.div_ceil(CHUNK_SIZE) };
        let body = container.len() - (sealfile_crypto::SIGNATURE.len() + 16 + 24);
        assert_eq!(
            body,
            len + chunks * (CIPHERTEXT_CHUNK_SIZE - CHUNK_SIZE),
            "unexpected container size for {len} bytes"
        );

        let decrypted = open(container, &pw, &record).await;
        assert_eq!(decrypted, original, "round-trip mismatch for {len} bytes");
    }
}

#[tokio::test]
async fn roundtrip_recovers_metadata() {
    let pw = password("metadata pw");
    let original = payload(1000);
    sealfile_crypto::initialize().unwrap();

    let meta = FileMetadata::new("report.pdf", Some("application/pdf".into()));
    let options = EncryptOptions::new(meta.clone()).with_kdf(FAST);
    let mut source = MemorySource::new(original.clone());
    let mut sink = MemorySink::new();
    let record = encrypt_stream(&mut source, &mut sink, &pw, &options, Hooks::none())
        .await
        .unwrap();

    assert_eq!(open_metadata(&record, &pw).await.unwrap(), meta);

    let mut source = MemorySource::new(sink.into_inner());
    let mut out = MemorySink::new();
    let outcome = decrypt_stream(
        &mut source,
        &mut out,
        &pw,
        Some(&record),
        &DecryptOptions::default(),
        Hooks::none(),
    )
    .await
    .unwrap();
    assert_eq!(outcome.metadata, Some(meta));
    assert_eq!(outcome.chunks, 1);
    assert_eq!(out.into_inner(), original);
}

#[tokio::test]
async fn roundtrip_without_record() {
    let pw = password("no record");
    let original = payload(CHUNK_SIZE * 2 + 3);
    let (container, _record) = seal(&original, &pw, "bare.bin").await;

    let mut source = MemorySource::new(container);
    let mut sink = MemorySink::new();
    let options = DecryptOptions {
        kdf: FAST,
        start_chunk: 0,
    };
    let outcome = decrypt_stream(&mut source, &mut sink, &pw, None, &options, Hooks::none())
        .await
        .unwrap();

    assert_eq!(outcome.metadata, None);
    assert_eq!(outcome.chunks, 3);
    assert_eq!(sink.into_inner(), original);
}

#[tokio::test]
async fn same_input_encrypts_differently() {
    let pw = password("same password");
    let original = payload(4096);

    let (a, rec_a) = seal(&original, &pw, "same.bin").await;
    let (b, rec_b) = seal(&original, &pw, "same.bin").await;

    assert_ne!(rec_a.salt, rec_b.salt, "salt must be fresh per session");
    assert_ne!(rec_a.header, rec_b.header, "header must be fresh per session");
    assert_ne!(rec_a.encrypted_metadata, rec_b.encrypted_metadata);
    assert_ne!(a, b, "ciphertext must differ between sessions");

    assert_eq!(open(a, &pw, &rec_a).await, original);
    assert_eq!(open(b, &pw, &rec_b).await, original);
}

#[tokio::test]
async fn record_survives_json() {
    let pw = password("json pw");
    let original = payload(777);
    let (container, record) = seal(&original, &pw, "notes.txt").await;

    let json = record.to_json().unwrap();
    let back = EncryptionRecord::from_json(&json).unwrap();
    assert_eq!(back, record);
    assert_eq!(back.kdf, FAST);

    assert_eq!(open(container, &pw, &back).await, original);
}

#[tokio::test]
async fn verifier_checks_password_only() {
    let pw = password("verify me");
    let (_, record) = seal(b"x", &pw, "v.bin").await;

    assert!(record.verify_password(&pw).unwrap());
    assert!(!record.verify_password(&password("verify you")).unwrap());
}

#[tokio::test]
async fn resume_from_chunk() {
    let pw = password("resume pw");
    let original = payload(4 * CHUNK_SIZE + 100);
    let (container, record) = seal(&original, &pw, "resume.bin").await;

    for start in 1..=4u64 {
        let mut source = MemorySource::new(container.clone());
        let mut sink = MemorySink::new();
        let options = DecryptOptions {
            kdf: FAST,
            start_chunk: start,
        };
        let outcome = decrypt_stream(&mut source, &mut sink, &pw, Some(&record), &options, Hooks::none())
            .await
            .expect("resumed decrypt should succeed");

        assert_eq!(outcome.chunks, 5 - start);
        assert_eq!(sink.into_inner(), &original[start as usize * CHUNK_SIZE..]);
    }
}

#[tokio::test]
async fn concurrent_sessions_are_independent() {
    sealfile_crypto::initialize().unwrap();
    let mut tasks = tokio::task::JoinSet::new();

    for i in 0..4usize {
        tasks.spawn(async move {
            let pw = password(&format!("password-{i}"));
            let original = payload(CHUNK_SIZE * i + 11 * i);
            let options =
                EncryptOptions::new(FileMetadata::new(format!("file-{i}.bin"), None)).with_kdf(FAST);

            let mut source = MemorySource::new(original.clone());
            let mut sealed = MemorySink::new();
            let record = encrypt_stream(&mut source, &mut sealed, &pw, &options, Hooks::none())
                .await
                .unwrap();

            let mut source = MemorySource::new(sealed.into_inner());
            let mut opened = MemorySink::new();
            let outcome = decrypt_stream(
                &mut source,
                &mut opened,
                &pw,
                Some(&record),
                &DecryptOptions::default(),
                Hooks::none(),
            )
            .await
            .unwrap();

            assert_eq!(outcome.metadata.unwrap().name, format!("file-{i}.bin"));
            assert_eq!(opened.into_inner(), original);
        });
    }

    while let Some(result) = tasks.join_next().await {
        result.expect("session task panicked");
    }
}

#[tokio::test]
async fn roundtrip_through_files() {
    sealfile_crypto::initialize().unwrap();
    let tmp = TempDir::new().unwrap();
    let pw = password("file pw");
    let original = payload(2 * CHUNK_SIZE + 4321);

    let input = tmp.path().join("input.bin");
    let sealed = tmp.path().join("input.bin.sealed");
    let output = tmp.path().join("restored/input.bin");
    std::fs::write(&input, &original).unwrap();

    let mut source = FileSource::open(&input).await.unwrap();
    let mut sink = FileSink::create(&sealed, false).await.unwrap();
    let options = EncryptOptions::new(FileMetadata::new("input.bin", None)).with_kdf(FAST);
    let record = encrypt_stream(&mut source, &mut sink, &pw, &options, Hooks::none())
        .await
        .unwrap();
    assert!(sealed.exists());

    let mut source = FileSource::open(&sealed).await.unwrap();
    let mut sink = FileSink::create(&output, false).await.unwrap();
    decrypt_stream(
        &mut source,
        &mut sink,
        &pw,
        Some(&record),
        &DecryptOptions::default(),
        Hooks::none(),
    )
    .await
    .unwrap();

    assert_eq!(std::fs::read(&output).unwrap(), original);
}
