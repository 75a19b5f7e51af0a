// Stream doubles used by the unit tests.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

fn reset() -> io::Error {
	io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")
}

/// Every operation fails with a connection reset.
pub struct Failing;

impl AsyncRead for Failing {
	fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
		Poll::Ready(Err(reset()))
	}
}

impl AsyncWrite for Failing {
	fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
		Poll::Ready(Err(reset()))
	}

	fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Poll::Ready(Ok(()))
	}

	fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Poll::Ready(Ok(()))
	}
}

/// Accepts at most `limit` bytes per write call.
pub struct Chunked<S> {
	inner: S,
	limit: usize,
}

impl<S> Chunked<S> {
	pub fn new(inner: S, limit: usize) -> Self {
		Self { inner, limit }
	}
}

impl<S: AsyncRead + Unpin> AsyncRead for Chunked<S> {
	fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.inner).poll_read(cx, buf)
	}
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Chunked<S> {
	fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
		let size = buf.len().min(self.limit);
		Pin::new(&mut self.inner).poll_write(cx, &buf[..size])
	}

	fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.inner).poll_flush(cx)
	}

	fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.inner).poll_shutdown(cx)
	}
}

/// Produces an endless stream of bytes, counting how many reads were issued, and never completes a write.
#[derive(Clone, Default)]
pub struct Stalled {
	pub reads: Arc<AtomicUsize>,
}

impl AsyncRead for Stalled {
	fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
		self.reads.fetch_add(1, Ordering::SeqCst);
		let size = buf.remaining().min(1024);
		buf.put_slice(&vec![0xAB; size]);
		Poll::Ready(Ok(()))
	}
}

impl AsyncWrite for Stalled {
	fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
		Poll::Pending
	}

	fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Poll::Pending
	}

	fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Poll::Pending
	}
}
