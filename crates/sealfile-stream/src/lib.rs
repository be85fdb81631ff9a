//! sealfile-stream: async encrypt/decrypt sessions over chunk sources and sinks
//!
//! Pipeline (encrypt): source → read 64 KiB window → push(MESSAGE | FINAL) → sink
//! Pipeline (decrypt): source → read 64 KiB + 17 window → pull → sink
//!
//! Both directions are pull-based: [`ContainerEncryptor::next_frame`] and
//! [`ContainerDecryptor::next_chunk`] only read the next window when asked, so
//! a slow sink throttles the reads. One session owns one stream state;
//! independent files run concurrently without sharing anything.

pub mod cancel;
pub mod decrypt;
pub mod encrypt;
pub mod error;
pub mod hooks;
pub mod io;
mod keying;
pub mod progress;
pub mod record;

pub use cancel::{CancellationSignal, NeverCancel};
pub use decrypt::{decrypt_stream, open_metadata, ContainerDecryptor, DecryptOptions, DecryptOutcome};
pub use encrypt::{encrypt_stream, ContainerEncryptor, EncryptOptions};
pub use error::{PipelineError, PipelineResult};
pub use hooks::Hooks;
pub use io::{ChunkSink, ChunkSource, FileSink, FileSource, MemorySink, MemorySource};
pub use progress::{NoProgress, ProgressReporter};
pub use record::EncryptionRecord;
