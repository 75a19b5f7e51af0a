// OpenTelemetry observability module
// Uses tracing-opentelemetry bridge for spans and OTLP push for metrics

use std::time::Duration;

use duplex::{Op, Side};
use opentelemetry::{
	KeyValue, global,
	metrics::{Counter, Histogram, Meter, UpDownCounter},
	trace::TracerProvider as _,
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, propagation::TraceContextPropagator, trace};

use crate::{Log, MetricsTracker};

const SERVICE_NAME: &str = "service.name";
const SERVICE: &str = "duplex-relay";

fn resource() -> Resource {
	Resource::new(vec![KeyValue::new(SERVICE_NAME, SERVICE)])
}

/// Initialize OpenTelemetry SDK with an OTLP metrics exporter
/// Sets up the global trace context propagator and meter provider
/// Note: Span export is wired up in init_logging_with_otel()
pub fn init_otel(otlp_endpoint: &str) -> anyhow::Result<()> {
	global::set_text_map_propagator(TraceContextPropagator::new());

	let meter_provider = opentelemetry_otlp::new_pipeline()
		.metrics(opentelemetry_sdk::runtime::Tokio)
		.with_exporter(
			opentelemetry_otlp::new_exporter()
				.tonic()
				.with_endpoint(otlp_endpoint),
		)
		.with_resource(resource())
		.build()?;

	global::set_meter_provider(meter_provider);

	Ok(())
}

/// Get the global meter for creating metrics instruments
pub fn get_meter() -> Meter {
	global::meter(SERVICE)
}

/// Create RelayMetrics instance using the global meter
pub fn create_relay_metrics() -> RelayMetrics {
	RelayMetrics::new(&get_meter())
}

/// Initialize logging, adding a span exporter when an OTLP endpoint is given
/// With OTel enabled the output switches to JSON so log shippers can correlate trace ids
pub fn init_logging_with_otel(log_config: &Log, otlp_endpoint: Option<&str>) -> anyhow::Result<()> {
	use tracing_subscriber::layer::SubscriberExt;
	use tracing_subscriber::util::SubscriberInitExt;
	use tracing_subscriber::{EnvFilter, Layer, filter::LevelFilter};

	let filter = EnvFilter::builder()
		.with_default_directive(LevelFilter::from_level(log_config.level()).into())
		.from_env_lossy()
		.add_directive("h2=warn".parse()?)
		.add_directive("tonic=info".parse()?)
		.add_directive("tokio=info".parse()?)
		.add_directive("runtime=info".parse()?);

	if let Some(endpoint) = otlp_endpoint {
		let fmt_layer = tracing_subscriber::fmt::layer()
			.json()
			.with_writer(std::io::stderr)
			.with_filter(filter);

		let exporter = opentelemetry_otlp::new_exporter()
			.tonic()
			.with_endpoint(endpoint)
			.build_span_exporter()?;

		let provider = trace::TracerProvider::builder()
			.with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
			.with_config(trace::Config::default().with_resource(resource()))
			.build();

		let tracer = provider.tracer(SERVICE);
		global::set_tracer_provider(provider);

		let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

		#[cfg(feature = "tokio-console")]
		{
			let console_layer = console_subscriber::spawn();
			tracing_subscriber::registry()
				.with(fmt_layer)
				.with(otel_layer)
				.with(console_layer)
				.init();
		}

		#[cfg(not(feature = "tokio-console"))]
		{
			tracing_subscriber::registry().with(fmt_layer).with(otel_layer).init();
		}

		tracing::debug!(%endpoint, "span export enabled");
	} else {
		let fmt_layer = tracing_subscriber::fmt::layer()
			.with_writer(std::io::stderr)
			.with_filter(filter);

		#[cfg(feature = "tokio-console")]
		{
			let console_layer = console_subscriber::spawn();
			tracing_subscriber::registry()
				.with(fmt_layer)
				.with(console_layer)
				.init();
		}

		#[cfg(not(feature = "tokio-console"))]
		{
			tracing_subscriber::registry().with(fmt_layer).init();
		}
	}

	Ok(())
}

/// OpenTelemetry instruments for the relay
/// Names follow Prometheus conventions; attributes stay low-cardinality (side, op, relay_instance)
pub struct RelayMetrics {
	pub active_sessions: UpDownCounter<i64>,
	pub sessions_total: Counter<u64>,
	pub dial_failures_total: Counter<u64>,
	pub transfer_errors_total: Counter<u64>,
	/// Bytes moved per completed read or write, by side and op.
	pub bytes_total: Counter<u64>,
	/// Latency of each completed read or write, by side and op.
	pub io_latency_seconds: Histogram<f64>,
}

impl RelayMetrics {
	pub fn new(meter: &Meter) -> Self {
		Self {
			active_sessions: meter
				.i64_up_down_counter("duplex_relay_active_sessions")
				.with_description("Number of sessions with a connected upstream")
				.init(),
			sessions_total: meter
				.u64_counter("duplex_relay_sessions_total")
				.with_description("Total sessions that reached the streaming state")
				.init(),
			dial_failures_total: meter
				.u64_counter("duplex_relay_dial_failures_total")
				.with_description("Upstream connections that could not be established")
				.init(),
			transfer_errors_total: meter
				.u64_counter("duplex_relay_transfer_errors_total")
				.with_description("Relay directions that ended with a read or write error")
				.init(),
			bytes_total: meter
				.u64_counter("duplex_relay_bytes_total")
				.with_description("Bytes moved by completed reads and writes")
				.init(),
			io_latency_seconds: meter
				.f64_histogram("duplex_relay_io_latency_seconds")
				.with_description("Duration of each completed read or write")
				.init(),
		}
	}
}

/// [duplex::Sink] that records every operation straight into OpenTelemetry instruments.
#[derive(Clone)]
pub struct OtelSink {
	bytes: Counter<u64>,
	latency: Histogram<f64>,
}

impl OtelSink {
	pub fn new(metrics: &RelayMetrics) -> Self {
		Self {
			bytes: metrics.bytes_total.clone(),
			latency: metrics.io_latency_seconds.clone(),
		}
	}

	fn attributes(side: Side, op: Op) -> [KeyValue; 2] {
		[KeyValue::new("side", side.as_str()), KeyValue::new("op", op.as_str())]
	}
}

impl duplex::Sink for OtelSink {
	fn add_bytes(&self, side: Side, op: Op, bytes: u64) {
		self.bytes.add(bytes, &Self::attributes(side, op));
	}

	fn record_duration(&self, side: Side, op: Op, elapsed: Duration) {
		self.latency.record(elapsed.as_secs_f64(), &Self::attributes(side, op));
	}
}

// Session counters as last exported, so each tick only pushes the change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct SessionSnapshot {
	active: i64,
	total: u64,
	dial_failures: u64,
	transfer_errors: u64,
}

impl SessionSnapshot {
	fn capture(metrics: &MetricsTracker) -> Self {
		Self {
			active: metrics.active_sessions() as i64,
			total: metrics.total_sessions(),
			dial_failures: metrics.dial_failures(),
			transfer_errors: metrics.transfer_errors(),
		}
	}

	// Returns the difference from `self` and moves `self` forward to `current`.
	fn advance(&mut self, current: Self) -> Self {
		let delta = Self {
			active: current.active - self.active,
			total: current.total.saturating_sub(self.total),
			dial_failures: current.dial_failures.saturating_sub(self.dial_failures),
			transfer_errors: current.transfer_errors.saturating_sub(self.transfer_errors),
		};
		*self = current;
		delta
	}
}

/// Start a background task to periodically export MetricsTracker session counters to OTel metrics
pub fn start_metrics_export_task(
	metrics_tracker: MetricsTracker,
	relay_metrics: RelayMetrics,
	relay_instance: String,
	interval: Duration,
) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		let mut interval = tokio::time::interval(interval);
		let mut last = SessionSnapshot::default();

		loop {
			interval.tick().await;

			let labels = &[KeyValue::new("relay_instance", relay_instance.clone())];

			let delta = last.advance(SessionSnapshot::capture(&metrics_tracker));
			if delta.active != 0 {
				relay_metrics.active_sessions.add(delta.active, labels);
			}
			if delta.total > 0 {
				relay_metrics.sessions_total.add(delta.total, labels);
			}
			if delta.dial_failures > 0 {
				relay_metrics.dial_failures_total.add(delta.dial_failures, labels);
			}
			if delta.transfer_errors > 0 {
				relay_metrics.transfer_errors_total.add(delta.transfer_errors, labels);
			}

			tracing::trace!(
				active_sessions = last.active,
				total_sessions = last.total,
				dial_failures = last.dial_failures,
				transfer_errors = last.transfer_errors,
				client_read_bytes = metrics_tracker.bytes(Side::Client, Op::Read),
				client_write_bytes = metrics_tracker.bytes(Side::Client, Op::Write),
				upstream_read_bytes = metrics_tracker.bytes(Side::Upstream, Op::Read),
				upstream_write_bytes = metrics_tracker.bytes(Side::Upstream, Op::Write),
				"metrics exported"
			);
		}
	})
}
