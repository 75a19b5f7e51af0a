//! In-process counters for the relay.
//!
//! Every session shares one [MetricsTracker]; it doubles as the [duplex::Sink] the observers record into.

use std::sync::{
	Arc,
	atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use duplex::{Op, Side};

#[derive(Default)]
struct IoCounters {
	bytes: AtomicU64,
	ops: AtomicU64,
	latency_micros: AtomicU64,
}

/// Thread-safe counters for relay sessions and per-operation I/O.
#[derive(Clone, Default)]
pub struct MetricsTracker {
	active_sessions: Arc<AtomicU64>,
	total_sessions: Arc<AtomicU64>,
	dial_failures: Arc<AtomicU64>,
	transfer_errors: Arc<AtomicU64>,
	// Indexed by side then op.
	io: Arc<[IoCounters; 4]>,
}

impl MetricsTracker {
	pub fn new() -> Self {
		Self::default()
	}

	fn io(&self, side: Side, op: Op) -> &IoCounters {
		let index = match (side, op) {
			(Side::Client, Op::Read) => 0,
			(Side::Client, Op::Write) => 1,
			(Side::Upstream, Op::Read) => 2,
			(Side::Upstream, Op::Write) => 3,
		};
		&self.io[index]
	}

	pub fn inc_active_sessions(&self) {
		self.active_sessions.fetch_add(1, Ordering::Relaxed);
		self.total_sessions.fetch_add(1, Ordering::Relaxed);
	}

	pub fn dec_active_sessions(&self) {
		self.active_sessions.fetch_sub(1, Ordering::Relaxed);
	}

	pub fn inc_dial_failures(&self) {
		self.dial_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub fn inc_transfer_errors(&self) {
		self.transfer_errors.fetch_add(1, Ordering::Relaxed);
	}

	pub fn active_sessions(&self) -> u64 {
		self.active_sessions.load(Ordering::Relaxed)
	}

	pub fn total_sessions(&self) -> u64 {
		self.total_sessions.load(Ordering::Relaxed)
	}

	pub fn dial_failures(&self) -> u64 {
		self.dial_failures.load(Ordering::Relaxed)
	}

	pub fn transfer_errors(&self) -> u64 {
		self.transfer_errors.load(Ordering::Relaxed)
	}

	/// Total bytes moved by completed operations of this kind.
	pub fn bytes(&self, side: Side, op: Op) -> u64 {
		self.io(side, op).bytes.load(Ordering::Relaxed)
	}

	/// Number of completed operations of this kind.
	pub fn ops(&self, side: Side, op: Op) -> u64 {
		self.io(side, op).ops.load(Ordering::Relaxed)
	}

	/// Summed latency of completed operations of this kind.
	pub fn latency(&self, side: Side, op: Op) -> Duration {
		Duration::from_micros(self.io(side, op).latency_micros.load(Ordering::Relaxed))
	}
}

impl duplex::Sink for MetricsTracker {
	fn add_bytes(&self, side: Side, op: Op, bytes: u64) {
		let io = self.io(side, op);
		io.bytes.fetch_add(bytes, Ordering::Relaxed);
		io.ops.fetch_add(1, Ordering::Relaxed);
	}

	fn record_duration(&self, side: Side, op: Op, elapsed: Duration) {
		let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
		self.io(side, op).latency_micros.fetch_add(micros, Ordering::Relaxed);
	}
}
