//! Finder protocol error types.

use thiserror::Error;

use super::session::Step;

/// Errors raised by the TCP link to the printer.
///
/// Every `std::io::Error` is mapped to one of these at the link boundary.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Host name or address could not be resolved.
    #[error("Cannot resolve host: {0}")]
    HostUnresolvable(String),

    /// Connection attempt did not finish in time.
    #[error("Connection timed out: {0}")]
    Timeout(String),

    /// Any other socket failure (refused, reset, broken pipe, ...).
    #[error("Socket error: {0}")]
    Other(String),
}

/// Terminal failure of a transfer session.
///
/// The `Display` text is the message shown to the user.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("{}", connection_message(.0))]
    Connection(#[source] LinkError),

    /// Device answered, but not with the expected prefix.
    #[error("{}", .step.failed_message())]
    Protocol { step: Step, response: String },

    /// Device sent nothing back (or the exchange broke down).
    #[error("{}", .step.no_response_message())]
    NoResponse { step: Step },

    /// Device reported an error for a chunk.
    #[error("Part {index} failed.")]
    Chunk { index: u32, response: String },

    #[error("Part {index} error.")]
    ChunkNoResponse { index: u32 },
}

fn connection_message(err: &LinkError) -> &'static str {
    match err {
        LinkError::HostUnresolvable(_) => "Connection failed: Check IP address.",
        LinkError::Timeout(_) => "Connection failed: Timeout.",
        LinkError::Other(_) => "Connection failed.",
    }
}

/// Errors from decoding a chunk frame.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame must be {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("Bad frame magic: {0:02X?}")]
    Magic([u8; 4]),

    #[error("Part length {0} exceeds chunk size")]
    PartLength(u32),

    #[error("CRC mismatch: header {expected:#010x}, data {actual:#010x}")]
    Crc { expected: u32, actual: u32 },
}
