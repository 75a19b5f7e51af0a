use clap::Args;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use tracing::Level;

/// Logging configuration.
#[serde_as]
#[derive(Args, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
	/// The level of logging to output: error, warn, info, debug, or trace.
	///
	/// `RUST_LOG` directives take precedence when set.
	#[arg(id = "log-level", long = "log-level", env = "DUPLEX_LOG_LEVEL")]
	#[serde_as(as = "Option<DisplayFromStr>")]
	pub level: Option<Level>,
}

impl Log {
	pub fn level(&self) -> Level {
		self.level.unwrap_or(Level::INFO)
	}
}
