//! Transparent TCP relay.
//!
//! Every client that connects to the listener is paired with a fresh connection to a single upstream,
//! and bytes are copied both ways until each side is done. Every completed read and write is recorded
//! with its size and latency, into in-process counters and optionally OpenTelemetry.

mod config;
mod log;
mod metrics;
mod observability;
mod observability_config;
mod server;
mod session;

pub use config::*;
pub use log::*;
pub use metrics::*;
pub use observability::*;
pub use observability_config::*;
pub use server::*;
pub use session::*;

use std::sync::Arc;

use duplex::Sink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	// Incomplete settings fail here, before any socket is opened.
	let config = Config::load()?;

	// Export stays off unless an OTLP endpoint is configured.
	let mut otlp_endpoint = config.observability.endpoint();
	if let Some(endpoint) = otlp_endpoint {
		if let Err(e) = observability::init_otel(endpoint) {
			eprintln!("Warning: Failed to initialize OpenTelemetry: {e:#}");
			otlp_endpoint = None;
		}
	}

	observability::init_logging_with_otel(&config.log, otlp_endpoint)?;

	let metrics = MetricsTracker::new();

	let sink: Arc<dyn Sink> = match otlp_endpoint {
		Some(endpoint) => {
			tracing::info!(%endpoint, "OpenTelemetry initialized with OTLP endpoint");

			let relay_metrics = observability::create_relay_metrics();
			let sink: Arc<dyn Sink> = Arc::new((metrics.clone(), OtelSink::new(&relay_metrics)));

			observability::start_metrics_export_task(
				metrics.clone(),
				relay_metrics,
				config.observability.instance(),
				config.observability.export_interval(),
			);
			tracing::debug!("metrics export task started");

			sink
		}
		None => Arc::new(metrics.clone()),
	};

	let server = config.server.init(sink, metrics).await?;

	tracing::info!(addr = %server.local_addr()?, upstream = server.upstream(), "listening");

	#[cfg(unix)]
	// Notify systemd that we're ready after all initialization is complete
	let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);

	server.run().await
}
