//! Metrics hooks shared by every session.
//!
//! A [Sink] receives one byte-count increment and one latency sample per completed I/O operation.
//! It is the only state shared between sessions, so implementations must tolerate arbitrarily many
//! concurrent callers.

use std::time::Duration;

/// Which stream of a session an operation happened on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
	/// The accepted, client-facing connection.
	Client,
	/// The dialed, upstream-facing connection.
	Upstream,
}

impl Side {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Client => "client",
			Self::Upstream => "upstream",
		}
	}
}

/// The kind of I/O operation being reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
	Read,
	Write,
}

impl Op {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Read => "read",
			Self::Write => "write",
		}
	}
}

/// A sink for per-operation byte and latency accounting.
///
/// Implementations should be fast and non-blocking (e.g., atomics).
pub trait Sink: Send + Sync + 'static {
	/// Record the bytes moved by a single operation.
	fn add_bytes(&self, side: Side, op: Op, bytes: u64);

	/// Record how long a single operation took.
	fn record_duration(&self, side: Side, op: Op, elapsed: Duration);
}

/// Default sink that does nothing.
#[derive(Default)]
pub struct NoopSink;

impl Sink for NoopSink {
	fn add_bytes(&self, _side: Side, _op: Op, _bytes: u64) {}
	fn record_duration(&self, _side: Side, _op: Op, _elapsed: Duration) {}
}

/// Record into both sinks.
impl<A: Sink, B: Sink> Sink for (A, B) {
	fn add_bytes(&self, side: Side, op: Op, bytes: u64) {
		self.0.add_bytes(side, op, bytes);
		self.1.add_bytes(side, op, bytes);
	}

	fn record_duration(&self, side: Side, op: Op, elapsed: Duration) {
		self.0.record_duration(side, op, elapsed);
		self.1.record_duration(side, op, elapsed);
	}
}

impl<T: Sink + ?Sized> Sink for std::sync::Arc<T> {
	fn add_bytes(&self, side: Side, op: Op, bytes: u64) {
		(**self).add_bytes(side, op, bytes)
	}

	fn record_duration(&self, side: Side, op: Op, elapsed: Duration) {
		(**self).record_duration(side, op, elapsed)
	}
}
