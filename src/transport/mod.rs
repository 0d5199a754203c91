//! Transport module - the duplex byte stream the server runs on.
//!
//! Any `AsyncRead` + `AsyncWrite` pair works (see
//! [`ServerBuilder::serve`](crate::ServerBuilder::serve)). The usual case is
//! the process's own stdin/stdout, provided here.

mod stdio;

pub use stdio::{stdio, Stdio};
