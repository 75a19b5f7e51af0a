use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Instant;

use crate::Observer;

pin_project! {
	/// A byte stream that reports every successful read and write to an [Observer].
	///
	/// Data and errors pass through untouched. Partial writes are reported exactly as the inner
	/// stream returned them; nothing is retried here.
	///
	/// The elapsed time of an operation runs from its first poll until it completes, so time spent
	/// waiting on a slow peer is included.
	#[derive(Debug)]
	pub struct Instrumented<S> {
		#[pin]
		inner: S,
		observer: Observer,
		read_started: Option<Instant>,
		write_started: Option<Instant>,
	}
}

impl<S> Instrumented<S> {
	pub fn new(inner: S, observer: Observer) -> Self {
		Self {
			inner,
			observer,
			read_started: None,
			write_started: None,
		}
	}

	pub fn get_ref(&self) -> &S {
		&self.inner
	}

	pub fn get_mut(&mut self) -> &mut S {
		&mut self.inner
	}

	pub fn into_inner(self) -> S {
		self.inner
	}
}

impl<S: AsyncRead> AsyncRead for Instrumented<S> {
	fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
		let this = self.project();
		let started = *this.read_started.get_or_insert_with(Instant::now);

		let capacity = buf.remaining();
		let before = buf.filled().len();

		let res = ready!(this.inner.poll_read(cx, buf));
		this.read_started.take();

		if res.is_ok() {
			let size = buf.filled().len() - before;
			// Nothing read into a non-empty buffer means end-of-stream, not a completed read.
			if size > 0 || capacity == 0 {
				this.observer.read(size, started.elapsed());
			}
		}

		Poll::Ready(res)
	}
}

impl<S: AsyncWrite> AsyncWrite for Instrumented<S> {
	fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
		let this = self.project();
		let started = *this.write_started.get_or_insert_with(Instant::now);

		let res = ready!(this.inner.poll_write(cx, buf));
		this.write_started.take();

		if let Ok(size) = res {
			this.observer.write(size, started.elapsed());
		}

		Poll::Ready(res)
	}

	fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		self.project().inner.poll_flush(cx)
	}

	fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		self.project().inner.poll_shutdown(cx)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mock::{Chunked, Failing};
	use std::sync::{Arc, Mutex};
	use std::time::Duration;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};

	type Events = Arc<Mutex<Vec<usize>>>;

	fn recording() -> (Observer, Events, Events) {
		let reads = Events::default();
		let writes = Events::default();
		let r = reads.clone();
		let w = writes.clone();
		let observer = Observer::new()
			.on_read(move |size, _| r.lock().unwrap().push(size))
			.on_write(move |size, _| w.lock().unwrap().push(size));
		(observer, reads, writes)
	}

	#[tokio::test]
	async fn test_read_and_write_fire_once_each() {
		let (a, mut b) = tokio::io::duplex(64);
		let (observer, reads, writes) = recording();
		let mut stream = Instrumented::new(a, observer);

		stream.write_all(b"ping").await.unwrap();
		let mut buf = [0u8; 4];
		b.read_exact(&mut buf).await.unwrap();
		assert_eq!(&buf, b"ping");

		b.write_all(b"pong!").await.unwrap();
		let mut buf = [0u8; 16];
		let size = stream.read(&mut buf).await.unwrap();
		assert_eq!(&buf[..size], b"pong!");

		assert_eq!(*writes.lock().unwrap(), vec![4]);
		assert_eq!(*reads.lock().unwrap(), vec![5]);
	}

	#[tokio::test]
	async fn test_end_of_stream_does_not_fire() {
		let (a, b) = tokio::io::duplex(64);
		let (observer, reads, _) = recording();
		let mut stream = Instrumented::new(a, observer);

		drop(b);
		let mut buf = [0u8; 16];
		assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
		assert!(reads.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_errors_pass_through_without_firing() {
		let (observer, reads, writes) = recording();
		let mut stream = Instrumented::new(Failing, observer);

		let err = stream.write(b"data").await.unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);

		let mut buf = [0u8; 16];
		let err = stream.read(&mut buf).await.unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);

		assert!(reads.lock().unwrap().is_empty());
		assert!(writes.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_partial_write_reported_as_returned() {
		let (a, mut b) = tokio::io::duplex(1024);
		let (observer, _, writes) = recording();
		let mut stream = Instrumented::new(Chunked::new(a, 3), observer);

		// A single write call is not retried.
		assert_eq!(stream.write(b"abcdefgh").await.unwrap(), 3);
		stream.write_all(b"defgh").await.unwrap();
		drop(stream);

		let mut out = Vec::new();
		b.read_to_end(&mut out).await.unwrap();
		assert_eq!(out, b"abcdefgh");
		assert_eq!(*writes.lock().unwrap(), vec![3, 3, 2]);
	}

	#[tokio::test]
	async fn test_no_observer_is_transparent() {
		let (a, mut b) = tokio::io::duplex(64);
		let mut stream = Instrumented::new(a, Observer::default());

		stream.write_all(b"hello").await.unwrap();
		stream.flush().await.unwrap();
		stream.shutdown().await.unwrap();

		let mut out = Vec::new();
		b.read_to_end(&mut out).await.unwrap();
		assert_eq!(out, b"hello");
	}

	#[tokio::test(start_paused = true)]
	async fn test_elapsed_spans_pending_polls() {
		let (a, mut b) = tokio::io::duplex(4);
		let samples: Arc<Mutex<Vec<(usize, Duration)>>> = Default::default();
		let s = samples.clone();
		let observer = Observer::new().on_write(move |size, elapsed| s.lock().unwrap().push((size, elapsed)));
		let mut stream = Instrumented::new(a, observer);

		// Fill the pipe so the next write has to wait for the reader.
		stream.write_all(b"1234").await.unwrap();

		let reader = tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(50)).await;
			let mut buf = [0u8; 8];
			b.read_exact(&mut buf).await.unwrap();
			buf
		});

		stream.write_all(b"5678").await.unwrap();
		assert_eq!(&reader.await.unwrap(), b"12345678");

		let samples = samples.lock().unwrap();
		assert_eq!(samples.len(), 2);
		assert_eq!(samples[0], (4, Duration::ZERO));
		assert_eq!(samples[1].0, 4);
		assert!(samples[1].1 >= Duration::from_millis(50));
	}
}
