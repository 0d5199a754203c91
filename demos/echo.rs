//! Echo Agent - simple request/response example.
//!
//! This example demonstrates:
//! - Building an agent with typed operations
//! - Serving it over stdin/stdout
//! - Logging to stderr so stdout carries only protocol lines
//!
//! # Talking to it from a shell
//!
//! ```text
//! $ cargo run --example echo
//! [1,{"func":"echo","args":[{"message":"hello"}]}]
//! [1,{"echo":"hello"}]
//! [2,{"func":"ping"}]
//! [2,"pong"]
//! ```
//!
//! Set `RUST_LOG=agentwire=debug` to follow each request on stderr.

use agentwire::{Agent, Server};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Input structure for the echo operation.
#[derive(Deserialize, Debug)]
struct EchoInput {
    message: String,
}

/// Output structure for the echo operation.
#[derive(Serialize, Debug)]
struct EchoOutput {
    echo: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let agent = Agent::builder()
        .method("ping", |_: Vec<Value>| Ok("pong"))
        .method("echo", |(input,): (EchoInput,)| {
            Ok(EchoOutput {
                echo: input.message,
            })
        })
        .build();

    // Runs until the host closes stdin
    Server::builder()
        .agent(agent)
        .serve_stdio()
        .wait_for_shutdown()
        .await?;

    Ok(())
}
