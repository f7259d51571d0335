//! Error types for layout decoding and encoding.

use thiserror::Error;

/// Result type alias for binform operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding or encoding binary layouts.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error while loading a byte source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read would run past the logical end of the stream.
    ///
    /// Fatal to the current decode path; the document layer converts it
    /// into a partial result plus a diagnostic at the nearest directory
    /// or section boundary.
    #[error("end of buffer: read of {needed} bytes at offset {offset:#x} exceeds length {len}")]
    EndOfBuffer {
        offset: usize,
        needed: usize,
        len: usize,
    },

    /// A signature or magic check failed; the buffer is not the format
    /// this decoder handles. Non-fatal at the document level.
    #[error("format mismatch: {0}")]
    FormatMismatch(&'static str),

    /// `put` called on a descriptor that is defined only for reading.
    #[error("unsupported put: {0}")]
    UnsupportedPut(&'static str),

    /// A string field did not decode in its declared text encoding.
    #[error("invalid text encoding")]
    InvalidEncoding,

    /// A value handed to `put` does not match the descriptor's shape.
    #[error("value does not match descriptor: expected {0}")]
    ValueMismatch(&'static str),
}
