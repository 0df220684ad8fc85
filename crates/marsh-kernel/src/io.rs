//! File-descriptor table and shared stream handles.
//!
//! A shell fd is a cloneable handle to an async reader or writer.
//! Duplication (`2>&1`) clones the handle, so both fds reach the same
//! underlying stream, and a subshell's fd table is one `clone()` away —
//! which is what keeps the before/after-command invariant cheap to
//! restore.

use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Shared handle to a reader.
pub type SharedReader = Arc<tokio::sync::Mutex<Box<dyn AsyncRead + Send + Unpin>>>;
/// Shared handle to a writer.
pub type SharedWriter = Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// One open file descriptor.
#[derive(Clone)]
pub enum FdFile {
    /// Reads empty, writes vanish (`/dev/null`).
    Null,
    Read(SharedReader),
    Write(SharedWriter),
}

impl FdFile {
    pub fn reader(r: impl AsyncRead + Send + Unpin + 'static) -> Self {
        FdFile::Read(Arc::new(tokio::sync::Mutex::new(Box::new(r))))
    }

    pub fn writer(w: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        FdFile::Write(Arc::new(tokio::sync::Mutex::new(Box::new(w))))
    }

    /// In-memory reader over fixed bytes (heredocs, here-strings).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::reader(std::io::Cursor::new(bytes))
    }

    pub fn is_read(&self) -> bool {
        matches!(self, FdFile::Read(_) | FdFile::Null)
    }

    pub fn is_write(&self) -> bool {
        matches!(self, FdFile::Write(_) | FdFile::Null)
    }

    /// Write all bytes; broken pipes are reported as errors for the
    /// caller to downgrade.
    pub async fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        match self {
            FdFile::Null => Ok(()),
            FdFile::Write(w) => {
                let mut guard = w.lock().await;
                guard.write_all(bytes).await?;
                guard.flush().await
            }
            FdFile::Read(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "fd not open for writing",
            )),
        }
    }

    /// Drain the stream to EOF.
    pub async fn read_to_end(&self) -> io::Result<Vec<u8>> {
        match self {
            FdFile::Null => Ok(Vec::new()),
            FdFile::Read(r) => {
                let mut guard = r.lock().await;
                let mut buf = Vec::new();
                guard.read_to_end(&mut buf).await?;
                Ok(buf)
            }
            FdFile::Write(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "fd not open for reading",
            )),
        }
    }

    /// Drain this readable fd into `dst` (feeding an external process).
    pub async fn copy_to(&self, dst: &mut (impl AsyncWrite + Send + Unpin)) -> io::Result<u64> {
        match self {
            FdFile::Null => Ok(0),
            FdFile::Read(r) => {
                let mut guard = r.lock().await;
                tokio::io::copy(&mut *guard, dst).await
            }
            FdFile::Write(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "fd not open for reading",
            )),
        }
    }

    /// Drain `src` into this writable fd (collecting external output).
    pub async fn copy_from(&self, src: &mut (impl AsyncRead + Send + Unpin)) -> io::Result<u64> {
        match self {
            FdFile::Null => {
                let mut sink = tokio::io::sink();
                tokio::io::copy(src, &mut sink).await
            }
            FdFile::Write(w) => {
                let mut guard = w.lock().await;
                let n = tokio::io::copy(src, &mut *guard).await?;
                guard.flush().await?;
                Ok(n)
            }
            FdFile::Read(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "fd not open for writing",
            )),
        }
    }

    /// Read one byte; `None` at EOF. The `read` builtin consumes input
    /// this way so it never takes more than its line.
    pub async fn read_byte(&self) -> io::Result<Option<u8>> {
        match self {
            FdFile::Null => Ok(None),
            FdFile::Read(r) => {
                let mut guard = r.lock().await;
                let mut byte = [0u8; 1];
                let n = guard.read(&mut byte).await?;
                Ok((n == 1).then_some(byte[0]))
            }
            FdFile::Write(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "fd not open for reading",
            )),
        }
    }
}

impl std::fmt::Debug for FdFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FdFile::Null => write!(f, "FdFile::Null"),
            FdFile::Read(_) => write!(f, "FdFile::Read"),
            FdFile::Write(_) => write!(f, "FdFile::Write"),
        }
    }
}

/// The per-task fd table.
#[derive(Debug, Clone, Default)]
pub struct FdMap {
    table: BTreeMap<u32, FdFile>,
}

impl FdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fd: u32) -> Option<&FdFile> {
        self.table.get(&fd)
    }

    pub fn set(&mut self, fd: u32, file: FdFile) {
        self.table.insert(fd, file);
    }

    /// `N>&M`: make `fd` another handle on `src`'s stream.
    pub fn dup(&mut self, fd: u32, src: u32) -> bool {
        match self.table.get(&src).cloned() {
            Some(file) => {
                self.table.insert(fd, file);
                true
            }
            None => false,
        }
    }

    /// `N>&-`: close.
    pub fn close(&mut self, fd: u32) {
        self.table.remove(&fd);
    }

    pub fn stdin(&self) -> FdFile {
        self.table.get(&0).cloned().unwrap_or(FdFile::Null)
    }

    pub fn stdout(&self) -> FdFile {
        self.table.get(&1).cloned().unwrap_or(FdFile::Null)
    }

    pub fn stderr(&self) -> FdFile {
        self.table.get(&2).cloned().unwrap_or(FdFile::Null)
    }
}

/// Cloneable in-memory sink; every clone appends to the same buffer.
/// Backs command substitution capture and test assertions.
#[derive(Clone, Default)]
pub struct MemWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().expect("mem writer lock").clone()
    }

    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buf.lock().expect("mem writer lock"))
    }

    /// The captured bytes as lossily-decoded text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl AsyncWrite for MemWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.buf.lock().expect("mem writer lock").extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl std::fmt::Debug for MemWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemWriter").field("len", &self.contents().len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mem_writer_collects() {
        let w = MemWriter::new();
        let fd = FdFile::writer(w.clone());
        fd.write_all(b"one ").await.unwrap();
        fd.write_all(b"two").await.unwrap();
        assert_eq!(w.text(), "one two");
    }

    #[tokio::test]
    async fn mem_writer_clones_share() {
        let w = MemWriter::new();
        let fd1 = FdFile::writer(w.clone());
        let fd2 = FdFile::writer(w.clone());
        fd1.write_all(b"a").await.unwrap();
        fd2.write_all(b"b").await.unwrap();
        assert_eq!(w.text(), "ab");
    }

    #[tokio::test]
    async fn bytes_reader_round_trip() {
        let fd = FdFile::from_bytes(b"payload".to_vec());
        assert_eq!(fd.read_to_end().await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn read_byte_steps_through() {
        let fd = FdFile::from_bytes(b"ab".to_vec());
        assert_eq!(fd.read_byte().await.unwrap(), Some(b'a'));
        assert_eq!(fd.read_byte().await.unwrap(), Some(b'b'));
        assert_eq!(fd.read_byte().await.unwrap(), None);
    }

    #[tokio::test]
    async fn null_fd_discards_and_eofs() {
        let fd = FdFile::Null;
        fd.write_all(b"gone").await.unwrap();
        assert_eq!(fd.read_to_end().await.unwrap(), b"");
    }

    #[tokio::test]
    async fn wrong_direction_errors() {
        let fd = FdFile::from_bytes(vec![]);
        assert!(fd.write_all(b"x").await.is_err());
        let fd = FdFile::writer(MemWriter::new());
        assert!(fd.read_to_end().await.is_err());
    }

    #[tokio::test]
    async fn dup_shares_stream() {
        let w = MemWriter::new();
        let mut fds = FdMap::new();
        fds.set(1, FdFile::writer(w.clone()));
        assert!(fds.dup(2, 1));
        fds.get(2).unwrap().write_all(b"via 2").await.unwrap();
        assert_eq!(w.text(), "via 2");
    }

    #[test]
    fn dup_of_closed_fails() {
        let mut fds = FdMap::new();
        assert!(!fds.dup(3, 9));
        fds.set(4, FdFile::Null);
        fds.close(4);
        assert!(fds.get(4).is_none());
    }
}
