//! Stdio transport.
//!
//! - **stdin**: request lines from the host
//! - **stdout**: response and event lines, nothing else
//! - **stderr**: logs (never parsed by the host)
//!
//! Never use `println!` in an agent: anything printed to stdout that is not
//! a protocol line corrupts the stream.

use tokio::io::{Stdin, Stdout};

/// The process's stdin/stdout as a read half and a write half.
pub struct Stdio {
    /// Incoming request lines.
    pub reader: Stdin,
    /// Outgoing response and event lines.
    pub writer: Stdout,
}

impl Stdio {
    /// Split into `(reader, writer)`.
    pub fn into_split(self) -> (Stdin, Stdout) {
        (self.reader, self.writer)
    }
}

/// Open the process's stdin/stdout.
pub fn stdio() -> Stdio {
    Stdio {
        reader: tokio::io::stdin(),
        writer: tokio::io::stdout(),
    }
}
