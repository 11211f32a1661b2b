//! Error type shared by every component of the engine.
//!
//! Degenerate-but-legal inputs (an empty ROI, a zero threshold, a flat
//! detection window, an empty cluster) never produce an error: they produce an
//! empty result. Errors are reserved for malformed inputs and I/O failures.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors returned by featkit operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A cascade or descriptor stream is malformed, truncated, or its declared
    /// counts disagree with its length.
    #[error("failed to load {what}: {reason}")]
    Load {
        /// What was being loaded (e.g. "cascade").
        what: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The underlying byte source could not be read or written.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An argument is outside its documented domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A pixel buffer does not match `width * height * bytes_per_pixel`.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Length implied by the image dimensions and pixel format.
        expected: usize,
        /// Length of the supplied buffer.
        actual: usize,
    },

    /// Accumulating the integral image could exceed the safe 32-bit range
    /// (`width * height * 255 >= 2^32`).
    #[error("integral image of {width}x{height} would overflow 32-bit accumulation")]
    Overflow {
        /// Source width in pixels.
        width: usize,
        /// Source height in pixels.
        height: usize,
    },
}

impl Error {
    /// Creates a [`Error::Load`] error.
    #[must_use]
    pub fn load(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Load {
            what,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::InvalidArgument`] error.
    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Maps a read failure on a structured stream: running out of bytes means
    /// the stream is truncated, anything else is a genuine I/O failure.
    pub(crate) fn from_read(what: &'static str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::load(what, "unexpected end of data")
        } else {
            Self::Io(err)
        }
    }
}
