use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

const DEFAULT_INSTANCE: &str = "relay-1";
const DEFAULT_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Args, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ObservabilityConfig {
	/// OpenTelemetry OTLP endpoint, e.g. http://localhost:4317
	///
	/// Nothing is exported unless this is set. An empty value or "disabled" also turns export off.
	#[arg(long = "otel-endpoint", env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
	pub otlp_endpoint: Option<String>,

	/// Value of the `relay_instance` attribute on exported session metrics.
	#[arg(long = "otel-instance", env = "DUPLEX_INSTANCE")]
	pub instance: Option<String>,

	/// How often session counters are pushed to OpenTelemetry, e.g. "10s".
	#[arg(long = "otel-interval", value_parser = humantime::parse_duration)]
	#[serde(with = "humantime_serde")]
	pub export_interval: Option<Duration>,
}

impl ObservabilityConfig {
	/// The OTLP endpoint, if export is enabled.
	pub fn endpoint(&self) -> Option<&str> {
		let endpoint = self.otlp_endpoint.as_deref()?.trim();
		match endpoint {
			"" | "disabled" => None,
			endpoint => Some(endpoint),
		}
	}

	pub fn instance(&self) -> String {
		self.instance.clone().unwrap_or_else(|| DEFAULT_INSTANCE.to_string())
	}

	pub fn export_interval(&self) -> Duration {
		self.export_interval.unwrap_or(DEFAULT_EXPORT_INTERVAL)
	}
}
