use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

use crate::{Error, Result};

const DEFAULT_BUFFER_SIZE: usize = 32 * 1024; // 32KB
const MINIMAL_BUFFER_SIZE: usize = 4 * 1024; // 4KB

/// Tuning for both copy directions of a relay.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RelayConfig {
	buffer_size: usize,
	half_close: bool,
}

impl Default for RelayConfig {
	fn default() -> Self {
		Self {
			buffer_size: DEFAULT_BUFFER_SIZE,
			half_close: false,
		}
	}
}

impl RelayConfig {
	/// The largest chunk read from the source before it is written to the destination.
	pub fn set_buffer_size(&mut self, buffer_size: usize) {
		self.buffer_size = buffer_size.max(MINIMAL_BUFFER_SIZE);
	}

	#[inline]
	pub fn buffer_size(&self) -> usize {
		self.buffer_size
	}

	/// Shut down the destination's write side once the source reaches end-of-stream.
	///
	/// The reverse direction keeps running either way.
	pub fn set_half_close(&mut self, half_close: bool) {
		self.half_close = half_close;
	}

	#[inline]
	pub fn half_close(&self) -> bool {
		self.half_close
	}
}

/// Copies bytes between two streams in both directions.
#[derive(Clone, Debug, Default)]
pub struct Relay {
	config: RelayConfig,
}

impl Relay {
	pub fn new(config: RelayConfig) -> Self {
		Self { config }
	}

	/// Start copying `first` → `second` and `second` → `first` on two new tasks.
	///
	/// Returns immediately. Must be called from within a tokio runtime.
	pub fn spawn<A, B>(&self, first: A, second: B) -> Handle
	where
		A: AsyncRead + AsyncWrite + Send + 'static,
		B: AsyncRead + AsyncWrite + Send + 'static,
	{
		let (first_read, first_write) = tokio::io::split(first);
		let (second_read, second_write) = tokio::io::split(second);

		Handle {
			forward: Direction::spawn(copy(first_read, second_write, self.config)),
			backward: Direction::spawn(copy(second_read, first_write, self.config)),
		}
	}
}

/// Relay between `first` and `second` with the default config until both directions finish.
///
/// The results are for `first` → `second` and `second` → `first` respectively.
pub async fn relay<A, B>(first: A, second: B) -> (Result<u64>, Result<u64>)
where
	A: AsyncRead + AsyncWrite + Send + 'static,
	B: AsyncRead + AsyncWrite + Send + 'static,
{
	Relay::default().spawn(first, second).join().await
}

/// The two directions of a running relay.
#[derive(Debug)]
pub struct Handle {
	/// Copies from the first stream into the second.
	pub forward: Direction,
	/// Copies from the second stream into the first.
	pub backward: Direction,
}

impl Handle {
	/// Wait for both directions to finish, regardless of the order they finish in.
	pub async fn join(self) -> (Result<u64>, Result<u64>) {
		tokio::join!(self.forward, self.backward)
	}

	/// Stop both directions, dropping (and therefore closing) both streams.
	pub fn abort(&self) {
		self.forward.abort();
		self.backward.abort();
	}
}

/// One copy direction, resolving to the number of bytes copied or the error that ended it.
#[derive(Debug)]
pub struct Direction {
	task: JoinHandle<Result<u64>>,
}

impl Direction {
	fn spawn<F>(copy: F) -> Self
	where
		F: Future<Output = Result<u64>> + Send + 'static,
	{
		Self {
			task: tokio::spawn(copy),
		}
	}

	/// Stop copying. The direction resolves to [Error::Cancelled] unless it already finished.
	pub fn abort(&self) {
		self.task.abort();
	}

	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}

	/// Wait for this direction to finish. Equivalent to awaiting the [Direction] itself.
	pub async fn join(self) -> Result<u64> {
		self.await
	}
}

impl Future for Direction {
	type Output = Result<u64>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Poll::Ready(match ready!(Pin::new(&mut self.task).poll(cx)) {
			Ok(res) => res,
			Err(err) if err.is_cancelled() => Err(Error::Cancelled),
			Err(_) => Err(Error::Panicked),
		})
	}
}

// The next read is only issued once the previous chunk has been fully written.
async fn copy<R, W>(mut reader: R, mut writer: W, config: RelayConfig) -> Result<u64>
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let mut buf = vec![0u8; config.buffer_size].into_boxed_slice();
	let mut total = 0u64;

	loop {
		let size = reader.read(&mut buf).await.map_err(Error::Read)?;
		if size == 0 {
			if config.half_close {
				writer.shutdown().await.map_err(Error::Write)?;
			}
			return Ok(total);
		}

		writer.write_all(&buf[..size]).await.map_err(Error::Write)?;
		writer.flush().await.map_err(Error::Write)?;
		total += size as u64;
	}
}
