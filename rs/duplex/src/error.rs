use std::io;

/// The terminal error of one relay direction.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("read failed: {0}")]
	Read(io::Error),

	#[error("write failed: {0}")]
	Write(io::Error),

	#[error("cancelled")]
	Cancelled,

	#[error("panicked")]
	Panicked,
}

impl Error {
	/// The underlying I/O error, if the direction failed on a read or a write.
	pub fn io(&self) -> Option<&io::Error> {
		match self {
			Self::Read(err) | Self::Write(err) => Some(err),
			Self::Cancelled | Self::Panicked => None,
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;
