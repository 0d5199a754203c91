//! Event Agent - example of raising events while work is in flight.
//!
//! This example demonstrates:
//! - Taking an event sender from the builder before registering operations
//! - Emitting `[0, payload]` progress events from an async operation
//! - Answering the request once the work is done
//!
//! # Talking to it from a shell
//!
//! ```text
//! $ cargo run --example events
//! [1,{"func":"start_work","args":[3]}]
//! [0,{"message":"Step 1 of 3","percent":33}]
//! [0,{"message":"Step 2 of 3","percent":66}]
//! [0,{"message":"Step 3 of 3","percent":100}]
//! [1,"done"]
//! ```

use std::time::Duration;

use agentwire::{Agent, AgentwireError, Server};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Progress event structure.
#[derive(Serialize, Debug)]
struct ProgressEvent {
    percent: u32,
    message: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let builder = Agent::builder();
    let events = builder.events();

    let agent = builder
        .method_async("start_work", move |(steps,): (u32,)| {
            let events = events.clone();
            async move {
                for i in 1..=steps {
                    tokio::time::sleep(Duration::from_millis(100)).await;

                    let event = ProgressEvent {
                        percent: (i * 100) / steps.max(1),
                        message: format!("Step {} of {}", i, steps),
                    };
                    events.emit("progress", &event)?;
                }
                Ok::<_, AgentwireError>("done")
            }
        })
        .build();

    Server::builder()
        .agent(agent)
        .serve_stdio()
        .wait_for_shutdown()
        .await?;

    Ok(())
}
