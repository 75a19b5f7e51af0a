use std::fmt;
use std::time::Duration;

use crate::{Op, Side, Sink};

/// A callback notified with the byte count and elapsed time of one operation.
pub type Callback = Box<dyn Fn(usize, Duration) + Send + Sync>;

/// A pair of optional callbacks fired after each successful read or write.
///
/// The callbacks run synchronously on the task performing the I/O, so they should not block.
/// They never fire for a failed operation.
#[derive(Default)]
pub struct Observer {
	read: Option<Callback>,
	write: Option<Callback>,
}

impl Observer {
	/// An observer with no callbacks.
	pub fn new() -> Self {
		Self::default()
	}

	/// Call `f` after every successful read.
	pub fn on_read<F>(mut self, f: F) -> Self
	where
		F: Fn(usize, Duration) + Send + Sync + 'static,
	{
		self.read = Some(Box::new(f));
		self
	}

	/// Call `f` after every successful write.
	pub fn on_write<F>(mut self, f: F) -> Self
	where
		F: Fn(usize, Duration) + Send + Sync + 'static,
	{
		self.write = Some(Box::new(f));
		self
	}

	/// An observer that records both reads and writes into `sink`, tagged with `side`.
	pub fn sink<S: Sink + Clone>(sink: S, side: Side) -> Self {
		let reads = sink.clone();
		Self::new()
			.on_read(move |bytes, elapsed| {
				reads.add_bytes(side, Op::Read, bytes as u64);
				reads.record_duration(side, Op::Read, elapsed);
			})
			.on_write(move |bytes, elapsed| {
				sink.add_bytes(side, Op::Write, bytes as u64);
				sink.record_duration(side, Op::Write, elapsed);
				tracing::trace!(side = side.as_str(), bytes, ?elapsed, "bytes written");
			})
	}

	pub(crate) fn read(&self, bytes: usize, elapsed: Duration) {
		if let Some(f) = &self.read {
			f(bytes, elapsed);
		}
	}

	pub(crate) fn write(&self, bytes: usize, elapsed: Duration) {
		if let Some(f) = &self.write {
			f(bytes, elapsed);
		}
	}
}

impl fmt::Debug for Observer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Observer")
			.field("read", &self.read.is_some())
			.field("write", &self.write.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{Arc, Mutex};

	#[derive(Clone, Default)]
	struct Recorder(Arc<Mutex<Vec<(Side, Op, u64)>>>);

	impl Sink for Recorder {
		fn add_bytes(&self, side: Side, op: Op, bytes: u64) {
			self.0.lock().unwrap().push((side, op, bytes));
		}

		fn record_duration(&self, _side: Side, _op: Op, _elapsed: Duration) {}
	}

	#[test]
	fn test_empty_observer() {
		let observer = Observer::new();
		observer.read(10, Duration::ZERO);
		observer.write(10, Duration::ZERO);
		assert_eq!(format!("{observer:?}"), "Observer { read: false, write: false }");
	}

	#[test]
	fn test_sink_observer_tags_side_and_op() {
		let recorder = Recorder::default();
		let observer = Observer::sink(recorder.clone(), Side::Upstream);

		observer.read(3, Duration::from_millis(1));
		observer.write(7, Duration::from_millis(2));

		let events = recorder.0.lock().unwrap().clone();
		assert_eq!(
			events,
			vec![(Side::Upstream, Op::Read, 3), (Side::Upstream, Op::Write, 7)]
		);
	}

	#[test]
	fn test_shared_sink_as_trait_object() {
		let recorder = Recorder::default();
		let sink: Arc<dyn Sink> = Arc::new((recorder.clone(), crate::NoopSink));
		let observer = Observer::sink(sink, Side::Client);

		observer.write(4, Duration::ZERO);

		assert_eq!(recorder.0.lock().unwrap().as_slice(), &[(Side::Client, Op::Write, 4)]);
	}
}
