//! Agent event channel.
//!
//! The agent raises events through one typed channel instead of one
//! subscription per event kind. Any number of [`EventSender`] clones feed a
//! single [`EventReceiver`], which the broadcaster drains for as long as the
//! agent is bound. Emission order is preserved.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{AgentwireError, Result};

/// An unsolicited notification raised by the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event kind (for logging; not written to the wire).
    pub kind: String,
    /// Event data, written as the line payload.
    pub payload: Value,
}

impl Event {
    /// Create a new event.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// Sending half of the event channel.
///
/// Cheaply cloneable; hand a clone to every operation that raises events.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Emit an event with a serializable payload.
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot be serialized or the receiving
    /// side has been dropped.
    pub fn emit<T: Serialize>(&self, kind: &str, data: &T) -> Result<()> {
        let payload = serde_json::to_value(data)?;
        self.send(Event::new(kind, payload))
    }

    /// Emit a prebuilt event.
    ///
    /// # Errors
    ///
    /// Returns [`AgentwireError::EventChannelClosed`] if the receiving side
    /// has been dropped.
    pub fn send(&self, event: Event) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| AgentwireError::EventChannelClosed)
    }

    /// Whether the receiving side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of the event channel.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventReceiver {
    /// Wait for the next event. `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected sender/receiver pair.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}
