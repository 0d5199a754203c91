//! Event broadcaster.
//!
//! Drains the bound agent's event stream and writes each event as an
//! unsolicited `[0, payload]` line, in emission order, on the same output
//! path as responses.
//!
//! When the binding ends the broadcaster is told to stop rather than being
//! aborted: events the agent raised before that point are still forwarded.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent::{Event, EventReceiver};
use crate::protocol::Response;
use crate::writer::WriterHandle;

/// Forward events until the stream ends, `stop` fires, or the output path
/// closes.
///
/// Once `stop` fires, events already queued are forwarded before returning.
/// Returns the number of events forwarded.
pub async fn broadcast_events(
    mut events: EventReceiver,
    writer: WriterHandle,
    stop: CancellationToken,
) -> usize {
    let mut forwarded = 0;

    loop {
        let event = tokio::select! {
            biased;
            () = stop.cancelled() => {
                // Only what was raised before the stop
                while let Some(event) = events.try_recv() {
                    if !forward(&writer, event, &mut forwarded).await {
                        break;
                    }
                }
                break;
            }
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if !forward(&writer, event, &mut forwarded).await {
            break;
        }
    }

    tracing::debug!(forwarded, "event stream finished");
    forwarded
}

/// Write one event. Returns `false` once the output path is gone.
async fn forward(writer: &WriterHandle, event: Event, forwarded: &mut usize) -> bool {
    tracing::debug!(kind = %event.kind, "forwarding event");

    match writer.send_response(&Response::event(event.payload)).await {
        Ok(()) => {
            *forwarded += 1;
            true
        }
        Err(e) => {
            tracing::error!(kind = %event.kind, error = %e, "failed to forward event");
            !writer.is_closed()
        }
    }
}

/// Spawn [`broadcast_events`] on its own task.
///
/// Cancel `stop` when the binding ends; the task finishes after forwarding
/// what was already queued.
pub fn spawn_broadcaster(
    events: EventReceiver,
    writer: WriterHandle,
    stop: CancellationToken,
) -> JoinHandle<usize> {
    tokio::spawn(broadcast_events(events, writer, stop))
}
