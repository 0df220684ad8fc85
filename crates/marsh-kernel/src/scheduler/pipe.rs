//! Bounded in-memory byte pipe with backpressure.
//!
//! Connects pipeline stages and process substitutions the way an OS pipe
//! would: the writer blocks when the ring buffer is full, the reader
//! blocks when it is empty, dropping the writer delivers EOF, and
//! dropping the reader turns further writes into broken-pipe errors.
//!
//! ```text
//!   PipeWriter ──▶ [VecDeque<u8>] ──▶ PipeReader
//! ```

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Default capacity, matching the usual kernel pipe buffer.
pub const PIPE_CAPACITY: usize = 64 * 1024;

struct PipeInner {
    buffer: VecDeque<u8>,
    capacity: usize,
    writer_closed: bool,
    reader_closed: bool,
    /// Parked reader waiting for data or EOF.
    read_waker: Option<Waker>,
    /// Parked writer waiting for space or broken pipe.
    write_waker: Option<Waker>,
}

impl PipeInner {
    fn wake_reader(&mut self) {
        if let Some(w) = self.read_waker.take() {
            w.wake();
        }
    }

    fn wake_writer(&mut self) {
        if let Some(w) = self.write_waker.take() {
            w.wake();
        }
    }
}

/// Writing end of a pipe.
pub struct PipeWriter {
    shared: Arc<Mutex<PipeInner>>,
}

/// Reading end of a pipe.
pub struct PipeReader {
    shared: Arc<Mutex<PipeInner>>,
}

/// Create a pipe with the given buffer capacity.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Mutex::new(PipeInner {
        buffer: VecDeque::with_capacity(capacity.min(8192)),
        capacity: capacity.max(1),
        writer_closed: false,
        reader_closed: false,
        read_waker: None,
        write_waker: None,
    }));
    (PipeWriter { shared: shared.clone() }, PipeReader { shared })
}

/// Create a pipe with [`PIPE_CAPACITY`].
pub fn pipe_default() -> (PipeWriter, PipeReader) {
    pipe(PIPE_CAPACITY)
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let mut inner = self.shared.lock().expect("pipe lock");
        if inner.reader_closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "pipe reader closed",
            )));
        }
        let available = inner.capacity.saturating_sub(inner.buffer.len());
        if available == 0 {
            inner.write_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let n = buf.len().min(available);
        inner.buffer.extend(&buf[..n]);
        inner.wake_reader();
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut inner = self.shared.lock().expect("pipe lock");
        inner.writer_closed = true;
        inner.wake_reader();
        Poll::Ready(Ok(()))
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let mut inner = self.shared.lock().expect("pipe lock");
        inner.writer_closed = true;
        inner.wake_reader();
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut inner = self.shared.lock().expect("pipe lock");
        if !inner.buffer.is_empty() {
            let n = buf.remaining().min(inner.buffer.len());
            let (front, back) = inner.buffer.as_slices();
            if n <= front.len() {
                buf.put_slice(&front[..n]);
            } else {
                buf.put_slice(front);
                buf.put_slice(&back[..n - front.len()]);
            }
            inner.buffer.drain(..n);
            inner.wake_writer();
            return Poll::Ready(Ok(()));
        }
        if inner.writer_closed {
            // EOF: leave the buffer untouched.
            return Poll::Ready(Ok(()));
        }
        inner.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let mut inner = self.shared.lock().expect("pipe lock");
        inner.reader_closed = true;
        inner.wake_writer();
    }
}

impl std::fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeWriter").finish()
    }
}

impl std::fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeReader").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn write_then_read() {
        let (mut writer, mut reader) = pipe(1024);
        writer.write_all(b"hello").await.unwrap();
        drop(writer);
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello");
    }

    #[tokio::test]
    async fn eof_after_writer_drop() {
        let (writer, mut reader) = pipe(64);
        drop(writer);
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn broken_pipe_after_reader_drop() {
        let (mut writer, reader) = pipe(64);
        drop(reader);
        let err = writer.write_all(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn backpressure_preserves_data() {
        let (mut writer, mut reader) = pipe(16);
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let expected = data.clone();
        let writer_task = tokio::spawn(async move {
            writer.write_all(&data).await.unwrap();
        });
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        writer_task.await.unwrap();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn concurrent_lines() {
        let (mut writer, mut reader) = pipe(64);
        let writer_task = tokio::spawn(async move {
            for i in 0..200 {
                writer.write_all(format!("line {}\n", i).as_bytes()).await.unwrap();
            }
        });
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        writer_task.await.unwrap();
        assert!(out.starts_with("line 0\n"));
        assert!(out.ends_with("line 199\n"));
    }

    #[tokio::test]
    async fn shutdown_signals_eof() {
        let (mut writer, mut reader) = pipe(64);
        writer.write_all(b"data").await.unwrap();
        writer.shutdown().await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"data");
    }
}
