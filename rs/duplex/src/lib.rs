//! # duplex: instrumented duplex streaming
//!
//! `duplex` pairs two bidirectional byte streams and copies bytes between them in both directions,
//! reporting the byte count and latency of every individual read and write along the way.
//!
//! ## API
//!
//! - [Instrumented]: wraps any [tokio::io::AsyncRead] + [tokio::io::AsyncWrite] and notifies an [Observer].
//! - [Observer]: a pair of optional callbacks fired after each successful read or write.
//! - [Sink]: a shared metrics recorder; [Observer::sink] binds one to a [Side] of the session.
//! - [Relay]: spawns one copy task per direction and returns a [Handle] immediately.
//! - [relay]: runs both directions to completion and returns both results.
//!
//! Each direction is independent: one side reaching end-of-stream or failing never stops the other.
//! Use [Direction::abort] to tear down a direction explicitly.

mod error;
mod observer;
mod relay;
mod sink;
mod stream;

#[cfg(test)]
mod mock;

pub use error::*;
pub use observer::*;
pub use relay::*;
pub use sink::*;
pub use stream::*;
