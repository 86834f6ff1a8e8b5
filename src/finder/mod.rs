//! FlashForge Finder network upload protocol (port 8899).
//!
//! Uploads G-code over a raw TCP socket: an `~M` command handshake, then
//! CRC-checked 4096-byte frames, then save and start print.
//!
//! # Example
//!
//! ```ignore
//! use finder_send::finder::{SessionControl, SessionOptions, TransferSession, filter_lines};
//!
//! let control = SessionControl::default();
//! let payload = filter_lines(&gcode);
//! let mut session = TransferSession::new("192.168.1.50", "cube", payload, SessionOptions::default(), &control);
//! let mut events = Vec::new();
//! let outcome = session.run(&mut events);
//! ```

mod error;
mod events;
mod filter;
mod link;
pub mod protocol;
mod session;

#[cfg(test)]
pub(crate) mod mock;

pub use error::{FrameError, LinkError, TransferError};
pub use events::{ProgressSink, TransferEvent, TransferOutcome};
pub use filter::{filter_blocks, filter_lines, normalize_line_endings};
pub use link::DeviceLink;
pub use protocol::{Frame, decode_frame, decode_response, encode_command, encode_frame};
pub use session::{SessionControl, SessionOptions, SessionState, Step, TransferSession};
