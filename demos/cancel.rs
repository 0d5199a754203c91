//! Cancel Agent - example of long-running work the host can cancel.
//!
//! `count` is cancelable: it watches its token and stops as soon as a
//! `cancelRequest` for it arrives. `sleep` is not: cancelling it only stops
//! tracking it, and its result still arrives.
//!
//! # Talking to it from a shell
//!
//! ```text
//! $ cargo run --example cancel
//! [1,{"func":"count","args":[1000]}]
//! [2,{"func":"cancelRequest","args":[1]}]
//! [2,true]
//! [1,null]
//! [3,{"func":"cancelRequest","args":[1]}]
//! [3,false]
//! ```

use std::time::Duration;

use agentwire::{Agent, AgentwireError, Server};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let agent = Agent::builder()
        .method_cancelable("count", |(limit,): (u64,), token: CancellationToken| async move {
            let mut reached = 0;
            while reached < limit {
                tokio::select! {
                    () = token.cancelled() => {
                        tracing::info!(reached, "count cancelled");
                        break;
                    }
                    () = tokio::time::sleep(Duration::from_millis(50)) => reached += 1,
                }
            }
            Ok::<_, AgentwireError>(reached)
        })
        .method_async("sleep", |(millis,): (u64,)| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(millis)
        })
        .build();

    Server::builder()
        .agent(agent)
        .serve_stdio()
        .wait_for_shutdown()
        .await?;

    Ok(())
}
