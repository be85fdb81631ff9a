//! Byte sources and sinks the pipeline reads from and writes to
//!
//! Reads are offset-addressed so the decrypt side can start at any chunk
//! boundary. Sinks see ordered appends followed by exactly one of `finish`
//! (output is complete and usable) or `abort` (output must be discarded).

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

/// Offset-addressed input with a known total size.
pub trait ChunkSource: Send {
    /// Total size in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Fails with [`io::ErrorKind::UnexpectedEof`] if the range passes the end.
    fn read_at(&mut self, offset: u64, len: usize) -> impl Future<Output = io::Result<Vec<u8>>> + Send;
}

/// Ordered output with an explicit completion step.
pub trait ChunkSink: Send {
    fn append(&mut self, bytes: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Mark the output complete. Only called after the FINAL chunk.
    fn finish(&mut self) -> impl Future<Output = io::Result<()>> + Send;

    /// Release the output without completing it.
    fn abort(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

fn eof(offset: u64, len: usize, total: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read of {len} bytes at offset {offset} passes end of input ({total} bytes)"),
    )
}

/// In-memory source, mostly for tests and small payloads.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl ChunkSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let start = usize::try_from(offset).map_err(|_| eof(offset, len, self.len()))?;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| eof(offset, len, self.len()))?;
        Ok(self.data[start..end].to_vec())
    }
}

/// File-backed source.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    len: u64,
}

impl FileSource {
    pub async fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path).await?;
        let len = file.metadata().await?.len();
        Ok(Self { file, len })
    }
}

impl ChunkSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        if offset.saturating_add(len as u64) > self.len {
            return Err(eof(offset, len, self.len));
        }
        self.file.seek(io::SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    Open,
    Finished,
    Aborted,
}

/// In-memory sink that records whether it was finished or aborted.
#[derive(Debug)]
pub struct MemorySink {
    data: Vec<u8>,
    state: SinkState,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            state: SinkState::Open,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == SinkState::Finished
    }

    pub fn is_aborted(&self) -> bool {
        self.state == SinkState::Aborted
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.state == SinkState::Open {
            Ok(())
        } else {
            Err(io::Error::other("sink already closed"))
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkSink for MemorySink {
    async fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.ensure_open()?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    async fn finish(&mut self) -> io::Result<()> {
        self.ensure_open()?;
        self.state = SinkState::Finished;
        Ok(())
    }

    async fn abort(&mut self) -> io::Result<()> {
        self.data.clear();
        self.state = SinkState::Aborted;
        Ok(())
    }
}

/// File sink that writes to `<dest>.part` and only renames it into place on
/// `finish`. An aborted sink removes the partial file, so a cancelled or
/// failed session never leaves a usable-looking output behind.
#[derive(Debug)]
pub struct FileSink {
    dest: PathBuf,
    part: PathBuf,
    writer: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl FileSink {
    /// Create the partial output file. Fails if `dest` exists and `overwrite` is false.
    pub async fn create(dest: &Path, overwrite: bool) -> io::Result<Self> {
        if !overwrite && tokio::fs::try_exists(dest).await? {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("output already exists: {}", dest.display()),
            ));
        }
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut part = dest.as_os_str().to_owned();
        part.push(".part");
        let part = PathBuf::from(part);

        let file = File::create(&part).await?;
        Ok(Self {
            dest: dest.to_path_buf(),
            part,
            writer: Some(BufWriter::new(file)),
            bytes_written: 0,
        })
    }

    pub fn destination(&self) -> &Path {
        &self.dest
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other("sink already closed"))
    }
}

impl ChunkSink for FileSink {
    async fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer()?.write_all(bytes).await?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    async fn finish(&mut self) -> io::Result<()> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| io::Error::other("sink already closed"))?;
        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        drop(writer);

        tokio::fs::rename(&self.part, &self.dest).await?;
        debug!(dest = %self.dest.display(), bytes = self.bytes_written, "output finished");
        Ok(())
    }

    async fn abort(&mut self) -> io::Result<()> {
        if self.writer.take().is_none() {
            return Ok(());
        }
        match tokio::fs::remove_file(&self.part).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.part.display(), error = %e, "failed to remove partial output");
                return Err(e);
            }
        }
        debug!(dest = %self.dest.display(), "output discarded");
        Ok(())
    }
}
