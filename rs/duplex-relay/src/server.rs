use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, ValueEnum};
use duplex::{Relay, RelayConfig, Sink};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::{MetricsTracker, Session, SessionError, Teardown};

/// What the accept loop does after a session fails to reach the upstream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DialFailurePolicy {
	/// Close that client connection and keep accepting new ones.
	#[default]
	Abandon,
	/// Close that client connection and stop accepting, ending the process with the dial error.
	Halt,
}

#[derive(Args, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
	/// The port to accept client connections on.
	#[arg(value_name = "PORT")]
	pub port: Option<u16>,

	/// The upstream every client is relayed to, as host:port.
	#[arg(value_name = "UPSTREAM")]
	pub upstream: Option<String>,

	/// The local address to listen on [default: 0.0.0.0]
	#[arg(long, env = "DUPLEX_BIND")]
	pub bind: Option<IpAddr>,

	/// The largest chunk copied per read, in bytes [default: 32768]
	#[arg(long = "buffer-size", value_name = "BYTES")]
	pub buffer_size: Option<usize>,

	/// Shut down the destination's write side when a source reaches end-of-stream [default: false]
	#[arg(long = "half-close", value_name = "BOOL")]
	pub half_close: Option<bool>,

	/// What to do when the upstream cannot be reached [default: abandon]
	#[arg(long = "dial-failure", value_enum)]
	pub dial_failure: Option<DialFailurePolicy>,

	/// What to do with the other direction once one direction ends [default: independent]
	#[arg(long, value_enum)]
	pub teardown: Option<Teardown>,
}

impl ServerConfig {
	/// Check that the listener port and a usable upstream address are present.
	pub fn validate(&self) -> anyhow::Result<()> {
		self.target().map(|_| ())
	}

	fn target(&self) -> anyhow::Result<(SocketAddr, &str)> {
		let port = self.port.context("missing listener port")?;
		let upstream = self.upstream.as_deref().context("missing upstream address")?;

		let (host, upstream_port) = upstream
			.rsplit_once(':')
			.with_context(|| format!("upstream address {upstream:?} is not host:port"))?;
		anyhow::ensure!(!host.is_empty(), "upstream address {upstream:?} has no host");
		upstream_port
			.parse::<u16>()
			.with_context(|| format!("upstream address {upstream:?} has an invalid port"))?;

		let bind = self.bind.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
		Ok((SocketAddr::new(bind, port), upstream))
	}

	fn relay(&self) -> RelayConfig {
		let mut config = RelayConfig::default();
		if let Some(buffer_size) = self.buffer_size {
			config.set_buffer_size(buffer_size);
		}
		config.set_half_close(self.half_close.unwrap_or_default());
		config
	}

	/// Bind the listener. Every session records into `sink`; session counters go to `metrics`.
	pub async fn init(&self, sink: Arc<dyn Sink>, metrics: MetricsTracker) -> anyhow::Result<Server> {
		let (addr, upstream) = self.target()?;
		let listener = TcpListener::bind(addr)
			.await
			.with_context(|| format!("failed to listen on {addr}"))?;

		Ok(Server {
			listener,
			upstream: upstream.into(),
			relay: Relay::new(self.relay()),
			dial_failure: self.dial_failure.unwrap_or_default(),
			teardown: self.teardown.unwrap_or_default(),
			sink,
			metrics,
		})
	}
}

pub struct Server {
	listener: TcpListener,
	upstream: Arc<str>,
	relay: Relay,
	dial_failure: DialFailurePolicy,
	teardown: Teardown,
	sink: Arc<dyn Sink>,
	metrics: MetricsTracker,
}

impl Server {
	pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
		self.listener.local_addr()
	}

	pub fn upstream(&self) -> &str {
		&self.upstream
	}

	/// Accept clients until accepting fails, or a dial fails under [DialFailurePolicy::Halt].
	pub async fn run(self) -> anyhow::Result<()> {
		let (halt_tx, mut halt_rx) = mpsc::channel::<SessionError>(1);
		let mut conn_id = 0;

		loop {
			let (client, peer) = tokio::select! {
				res = self.listener.accept() => res.context("failed to accept")?,
				Some(err) = halt_rx.recv() => return Err(err).context("stopped accepting"),
			};

			let id = conn_id;
			conn_id += 1;
			tracing::info!(id, %peer, "accepted");

			if let Err(err) = client.set_nodelay(true) {
				tracing::debug!(id, %err, "failed to set nodelay");
			}

			let session = Session {
				id,
				client,
				peer,
				upstream: self.upstream.clone(),
				relay: self.relay.clone(),
				teardown: self.teardown,
				sink: self.sink.clone(),
				metrics: self.metrics.clone(),
			};

			let halt = match self.dial_failure {
				DialFailurePolicy::Abandon => None,
				DialFailurePolicy::Halt => Some(halt_tx.clone()),
			};

			// Handle the connection in a new task.
			tokio::spawn(async move {
				if let Err(err) = session.run().await {
					tracing::warn!(id, %err, "session abandoned");
					if let Some(halt) = halt {
						let _ = halt.try_send(err);
					}
				}
			});
		}
	}
}
