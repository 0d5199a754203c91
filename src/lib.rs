//! # agentwire
//!
//! Bidirectional line-delimited JSON RPC for agents spoken to over stdio.
//!
//! A host process writes one request per line to the agent's stdin and
//! reads responses and unsolicited events, one per line, from its stdout.
//!
//! ## Wire format
//!
//! - **Request**: `[id, {"func": "name", "args": [...]}]`
//! - **Cancel**: `[id, {"func": "cancelRequest", "args": [target_id]}]`
//! - **Response**: `[id, payload]`, exactly one per request, in completion order
//! - **Event**: `[0, payload]`
//!
//! Faults never reach the wire as errors: they are logged and answered
//! with a `null` payload. Undecodable lines are dropped without a response.
//!
//! ## Example
//!
//! ```no_run
//! use agentwire::{Agent, Server};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> agentwire::Result<()> {
//!     let agent = Agent::builder()
//!         .method("ping", |_: Vec<Value>| Ok("pong"))
//!         .method_async("add", |(a, b): (i64, i64)| async move { Ok(a + b) })
//!         .build();
//!
//!     Server::builder()
//!         .agent(agent)
//!         .serve_stdio()
//!         .wait_for_shutdown()
//!         .await
//! }
//! ```

pub mod agent;
pub mod broadcaster;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod pending;
pub mod protocol;
pub mod transport;
pub mod writer;

mod server;

pub use agent::{Agent, AgentBuilder, EventSender, Outcome};
pub use error::{AgentwireError, DecodeError, Result};
pub use protocol::{Request, RequestId, Response};
pub use server::{Server, ServerBuilder, DEFAULT_READ_BUFFER_SIZE};
