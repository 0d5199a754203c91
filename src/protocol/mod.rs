//! Protocol module - line framing and message types.
//!
//! This module implements the text protocol carried over the duplex stream:
//! - Line buffer for accumulating partial reads into `\n`-terminated lines
//! - Request/response types for the two-element array messages

mod line_buffer;
mod message;

pub use line_buffer::{LineBuffer, DEFAULT_CAPACITY, LINE_TERMINATOR};
pub use message::{Call, Request, RequestId, Response, CANCEL_FUNCTION, EVENT_ID};
