//! Agent module - the capability provider bound to a server.
//!
//! Provides:
//! - [`Agent`] / [`AgentBuilder`] - a fixed set of named operations plus an event stream
//! - [`OperationRegistry`] - resolves function names to operations
//! - [`Outcome`] - immediate value or pending (optionally cancelable) work
//! - [`EventSender`] - raises unsolicited events
//!
//! # Example
//!
//! ```
//! use agentwire::agent::Agent;
//! use serde_json::Value;
//! use tokio_util::sync::CancellationToken;
//!
//! let builder = Agent::builder();
//! let events = builder.events();
//!
//! let agent = builder
//!     .method("ping", |_: Vec<Value>| Ok("pong"))
//!     .method_async("complete", |(prefix,): (String,)| async move {
//!         Ok(format!("{prefix}()"))
//!     })
//!     .method_cancelable("index", move |_: Vec<Value>, token: CancellationToken| {
//!         let events = events.clone();
//!         async move {
//!             events.emit("indexing", &"started")?;
//!             token.cancelled().await;
//!             Ok::<_, agentwire::AgentwireError>(false)
//!         }
//!     })
//!     .build();
//!
//! assert!(agent.operations().contains("index"));
//! ```

mod events;
mod outcome;
mod registry;

pub use events::{event_channel, Event, EventReceiver, EventSender};
pub use outcome::{BoxFuture, CancelHandle, Outcome, PendingOperation};
pub use registry::{AsyncHandler, CancelableHandler, ImmediateHandler, Operation, OperationRegistry};

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Builder for an [`Agent`].
///
/// Use the fluent API to register operations, and [`AgentBuilder::events`]
/// to obtain a sender for events before the operations that raise them are
/// registered.
pub struct AgentBuilder {
    operations: OperationRegistry,
    events_tx: EventSender,
    events_rx: EventReceiver,
}

impl AgentBuilder {
    /// Create a new agent builder.
    pub fn new() -> Self {
        let (events_tx, events_rx) = event_channel();
        Self {
            operations: OperationRegistry::new(),
            events_tx,
            events_rx,
        }
    }

    /// A sender for this agent's event stream.
    pub fn events(&self) -> EventSender {
        self.events_tx.clone()
    }

    /// Register an operation that answers immediately.
    pub fn method<F, T, R>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(T) -> Result<R> + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        R: Serialize + 'static,
    {
        self.operations.method(name, handler);
        self
    }

    /// Register an operation that resolves later and cannot be cancelled.
    pub fn method_async<F, T, Fut, R>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Serialize + 'static,
    {
        self.operations.method_async(name, handler);
        self
    }

    /// Register an operation that resolves later and honours `cancelRequest`.
    ///
    /// The handler receives a [`CancellationToken`]; the dispatcher also stops
    /// awaiting the operation as soon as the token fires.
    pub fn method_cancelable<F, T, Fut, R>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Serialize + 'static,
    {
        self.operations.method_cancelable(name, handler);
        self
    }

    /// Register a raw operation that builds its own [`Outcome`].
    pub fn operation<O: Operation>(mut self, name: &str, operation: O) -> Self {
        self.operations.register(name, operation);
        self
    }

    /// Finish building.
    ///
    /// The builder's own sender is dropped here; the event stream ends once
    /// every clone handed out by [`AgentBuilder::events`] is dropped too.
    pub fn build(self) -> Agent {
        Agent {
            operations: self.operations,
            events: self.events_rx,
        }
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A capability provider: named operations plus an event stream.
pub struct Agent {
    operations: OperationRegistry,
    events: EventReceiver,
}

impl Agent {
    /// Create a new agent builder.
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Assemble an agent from parts built elsewhere.
    pub fn from_parts(operations: OperationRegistry, events: EventReceiver) -> Self {
        Self { operations, events }
    }

    /// The registered operations.
    pub fn operations(&self) -> &OperationRegistry {
        &self.operations
    }

    /// Split into operations and event stream.
    pub fn into_parts(self) -> (OperationRegistry, EventReceiver) {
        (self.operations, self.events)
    }
}
