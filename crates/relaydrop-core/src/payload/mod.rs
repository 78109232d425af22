//! Payloads and the byte sources behind them.
//!
//! A [`Payload`] is the single logical blob moved by one transfer: either one
//! selected file or an archive synthesized from several (see
//! [`crate::bundle`]). Its bytes come from a [`PayloadSource`] that can be
//! sliced into contiguous ranges asynchronously, one range per chunk.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{Error, Result};

/// Where a payload's bytes live.
#[derive(Debug, Clone)]
pub enum PayloadSource {
    /// Bytes held in memory (synthesized archives, tests, embedders)
    Memory(Arc<[u8]>),
    /// A file on disk, read range by range
    File(PathBuf),
}

impl PayloadSource {
    /// Open the source for a run of range reads.
    ///
    /// A file is opened once here and the handle is reused by every
    /// [`PayloadReader::read_range`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub async fn open(&self) -> Result<PayloadReader> {
        let inner = match self {
            Self::Memory(bytes) => ReaderInner::Memory(Arc::clone(bytes)),
            Self::File(path) => ReaderInner::File {
                file: tokio::fs::File::open(path)
                    .await
                    .map_err(|e| map_open_error(path, e))?,
                position: 0,
            },
        };
        Ok(PayloadReader { inner })
    }

    /// Read bytes `[start, end)` from the source.
    ///
    /// Opens the source for this one read; use [`open`](Self::open) for a
    /// sequence of ranges.
    ///
    /// # Errors
    ///
    /// Returns an error if the range lies outside the source or the file
    /// cannot be read.
    pub async fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        self.open().await?.read_range(start, end).await
    }

    /// Read the entire source into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn read_all(&self) -> Result<Vec<u8>> {
        match self {
            Self::Memory(bytes) => Ok(bytes.to_vec()),
            Self::File(path) => tokio::fs::read(path)
                .await
                .map_err(|e| map_open_error(path, e)),
        }
    }
}

/// An open [`PayloadSource`].
#[derive(Debug)]
pub struct PayloadReader {
    inner: ReaderInner,
}

#[derive(Debug)]
enum ReaderInner {
    Memory(Arc<[u8]>),
    File {
        file: tokio::fs::File,
        position: u64,
    },
}

impl PayloadReader {
    /// Read bytes `[start, end)`.
    ///
    /// Consecutive ranges continue from the current file position without
    /// seeking.
    ///
    /// # Errors
    ///
    /// Returns an error if the range lies outside the source or the file
    /// cannot be read.
    pub async fn read_range(&mut self, start: u64, end: u64) -> Result<Vec<u8>> {
        if end < start {
            return Err(Error::Internal(format!("inverted range {start}..{end}")));
        }

        match &mut self.inner {
            ReaderInner::Memory(bytes) => {
                let (start, end) = (to_index(start)?, to_index(end)?);
                let slice = bytes.get(start..end).ok_or_else(|| {
                    Error::Internal(format!(
                        "range {start}..{end} out of bounds for {} bytes",
                        bytes.len()
                    ))
                })?;
                // Keep a suspension point so memory-backed sends interleave
                // with other tasks the same way file reads do.
                tokio::task::yield_now().await;
                Ok(slice.to_vec())
            }
            ReaderInner::File { file, position } => {
                if *position != start {
                    file.seek(SeekFrom::Start(start)).await?;
                }
                let mut buffer = vec![0u8; to_index(end - start)?];
                file.read_exact(&mut buffer).await?;
                *position = end;
                Ok(buffer)
            }
        }
    }
}

fn to_index(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::Internal(format!("offset {value} exceeds usize")))
}

fn map_open_error(path: &Path, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::FileNotFound(path.display().to_string())
    } else {
        Error::Io(e)
    }
}

/// A file selected for sending, before the bundling decision.
#[derive(Debug, Clone)]
pub struct NamedBlob {
    /// File name as the receiver will see it
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Byte source
    pub source: PayloadSource,
}

impl NamedBlob {
    /// Create a blob from in-memory bytes.
    #[must_use]
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            source: PayloadSource::Memory(bytes),
        }
    }

    /// Create a blob backed by a file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist or is not a regular file.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| map_open_error(path, e))?;

        if !metadata.is_file() {
            return Err(Error::FileNotFound(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self {
            name,
            size: metadata.len(),
            source: PayloadSource::File(path.to_path_buf()),
        })
    }
}

/// The logical unit moved by one transfer.
///
/// Built once per send and never mutated while the transfer runs.
#[derive(Debug, Clone)]
pub struct Payload {
    name: String,
    byte_length: u64,
    source: PayloadSource,
}

impl Payload {
    /// Create a payload.
    #[must_use]
    pub fn new(name: impl Into<String>, byte_length: u64, source: PayloadSource) -> Self {
        Self {
            name: name.into(),
            byte_length,
            source,
        }
    }

    /// Payload name announced on the wire.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total length in bytes.
    #[must_use]
    pub const fn byte_length(&self) -> u64 {
        self.byte_length
    }

    /// The underlying byte source.
    #[must_use]
    pub const fn source(&self) -> &PayloadSource {
        &self.source
    }
}

impl From<NamedBlob> for Payload {
    fn from(blob: NamedBlob) -> Self {
        Self::new(blob.name, blob.size, blob.source)
    }
}

/// Reduce a name received from a peer to a bare file name.
///
/// Path separators and parent components are stripped so a delivered payload
/// can never be written outside the chosen output directory.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty() && *part != "." && *part != "..")
        .unwrap_or("");

    if last.is_empty() {
        "download".to_string()
    } else {
        last.to_string()
    }
}

/// Format a file size for display.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_read_range() {
        let source = PayloadSource::Memory(Arc::from(&b"hello world"[..]));
        assert_eq!(source.read_range(0, 5).await.expect("read"), b"hello");
        assert_eq!(source.read_range(6, 11).await.expect("read"), b"world");
        assert!(source.read_range(6, 12).await.is_err());
    }

    #[tokio::test]
    async fn test_file_read_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").expect("write");

        let blob = NamedBlob::from_path(&path).await.expect("blob");
        assert_eq!(blob.name, "data.bin");
        assert_eq!(blob.size, 10);
        assert_eq!(blob.source.read_range(3, 7).await.expect("read"), b"3456");
    }

    #[tokio::test]
    async fn test_reader_reads_sequential_and_random_ranges() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").expect("write");

        let mut reader = PayloadSource::File(path).open().await.expect("open");
        assert_eq!(reader.read_range(0, 4).await.expect("read"), b"0123");
        assert_eq!(reader.read_range(4, 8).await.expect("read"), b"4567");
        assert_eq!(reader.read_range(1, 3).await.expect("read"), b"12");
        assert_eq!(reader.read_range(3, 4).await.expect("read"), b"3");
        assert!(reader.read_range(8, 12).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reader_keeps_one_handle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"abcdef").expect("write");

        let mut reader = PayloadSource::File(path.clone()).open().await.expect("open");
        assert_eq!(reader.read_range(0, 3).await.expect("read"), b"abc");

        // Unlinked files stay readable through an already open handle.
        std::fs::remove_file(&path).expect("remove");
        assert_eq!(reader.read_range(3, 6).await.expect("read"), b"def");
    }

    #[tokio::test]
    async fn test_from_path_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = NamedBlob::from_path(&dir.path().join("nope.txt")).await;
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_from_path_rejects_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = NamedBlob::from_path(dir.path()).await;
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\x\\a.txt"), "a.txt");
        assert_eq!(sanitize_file_name("dir/"), "dir");
        assert_eq!(sanitize_file_name(".."), "download");
        assert_eq!(sanitize_file_name(""), "download");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(150_000), "146.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
