use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::{Log, ObservabilityConfig, ServerConfig};

#[derive(Parser, Clone, Debug, Default, Deserialize, Serialize)]
#[command(name = "duplex-relay", version, about = "Transparent TCP relay with per-operation I/O metrics")]
#[serde(deny_unknown_fields, default)]
pub struct Config {
	/// Load settings from a TOML file. Arguments given on the command line take precedence.
	#[arg(long = "config", value_name = "PATH")]
	#[serde(skip)]
	pub file: Option<PathBuf>,

	#[command(flatten)]
	pub log: Log,

	#[command(flatten)]
	pub server: ServerConfig,

	#[command(flatten)]
	pub observability: ObservabilityConfig,
}

impl Config {
	/// Parse the process arguments (and the config file they name), rejecting incomplete settings.
	pub fn load() -> anyhow::Result<Self> {
		Self::parse().resolve(std::env::args_os())
	}

	fn resolve<I, T>(self, args: I) -> anyhow::Result<Self>
	where
		I: IntoIterator<Item = T>,
		T: Into<OsString> + Clone,
	{
		let mut config = match self.file {
			Some(path) => {
				let raw = std::fs::read_to_string(&path)
					.with_context(|| format!("failed to read config file {}", path.display()))?;
				let mut config: Self =
					toml::from_str(&raw).with_context(|| format!("failed to parse config file {}", path.display()))?;
				config.try_update_from(args)?;
				config
			}
			None => self,
		};

		config.validate()?;

		Ok(config)
	}

	/// Reject settings the relay cannot start with.
	pub fn validate(&self) -> anyhow::Result<()> {
		self.server.validate()
	}
}
