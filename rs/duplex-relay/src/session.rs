use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use clap::ValueEnum;
use duplex::{Direction, Handle, Instrumented, Observer, Relay, Side, Sink};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::MetricsTracker;

/// What happens to the surviving direction once the other one ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Teardown {
	/// Each direction runs until its own source ends or fails.
	/// Both connections are closed once both directions are done.
	#[default]
	Independent,
	/// The first direction to end stops the other and closes both connections.
	Coordinated,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
	#[error("failed to connect to {upstream}: {source}")]
	Dial {
		upstream: Arc<str>,
		#[source]
		source: io::Error,
	},
}

/// One accepted client, relayed to the upstream.
pub struct Session {
	pub id: u64,
	pub client: TcpStream,
	pub peer: SocketAddr,
	pub upstream: Arc<str>,
	pub relay: Relay,
	pub teardown: Teardown,
	pub sink: Arc<dyn Sink>,
	pub metrics: MetricsTracker,
}

impl Session {
	#[tracing::instrument("session", skip_all, fields(id = self.id, peer = %self.peer))]
	pub async fn run(self) -> Result<(), SessionError> {
		let upstream = match TcpStream::connect(&*self.upstream).await {
			Ok(upstream) => upstream,
			Err(source) => {
				self.metrics.inc_dial_failures();
				// Returning drops the client, which closes the inbound connection.
				return Err(SessionError::Dial {
					upstream: self.upstream,
					source,
				});
			}
		};

		self.metrics.inc_active_sessions();
		struct SessionGuard {
			metrics: MetricsTracker,
		}
		impl Drop for SessionGuard {
			fn drop(&mut self) {
				self.metrics.dec_active_sessions();
			}
		}
		let _guard = SessionGuard {
			metrics: self.metrics.clone(),
		};

		let client = Instrumented::new(self.client, Observer::sink(self.sink.clone(), Side::Client));
		let upstream = Instrumented::new(upstream, Observer::sink(self.sink, Side::Upstream));

		let Handle { forward, backward } = self.relay.spawn(client, upstream);
		tracing::info!(upstream = %self.upstream, "streaming");

		match self.teardown {
			Teardown::Independent => {
				tokio::join!(
					finished(forward, "client->upstream", &self.metrics),
					finished(backward, "upstream->client", &self.metrics),
				);
			}
			Teardown::Coordinated => coordinated(forward, backward, &self.metrics).await,
		}

		Ok(())
	}
}

async fn coordinated(mut forward: Direction, mut backward: Direction, metrics: &MetricsTracker) {
	tokio::select! {
		res = &mut forward => {
			backward.abort();
			report(res, "client->upstream", metrics);
			report(backward.await, "upstream->client", metrics);
		}
		res = &mut backward => {
			forward.abort();
			report(res, "upstream->client", metrics);
			report(forward.await, "client->upstream", metrics);
		}
	}
}

async fn finished(direction: Direction, name: &'static str, metrics: &MetricsTracker) {
	report(direction.await, name, metrics);
}

fn report(res: duplex::Result<u64>, direction: &'static str, metrics: &MetricsTracker) {
	match res {
		Ok(bytes) => tracing::info!(direction, bytes, "transfer finished"),
		Err(duplex::Error::Cancelled) => tracing::debug!(direction, "transfer cancelled"),
		Err(err) => {
			metrics.inc_transfer_errors();
			tracing::warn!(direction, %err, "transfer failed");
		}
	}
}
