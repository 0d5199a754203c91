//! Request dispatcher.
//!
//! Turns one decoded [`Request`] into exactly one [`Response`]:
//!
//! 1. No agent bound: answer `[0, null]`.
//! 2. `cancelRequest`: ask the pending registry, answer with the boolean.
//! 3. Otherwise resolve the function on the bound agent and invoke it.
//!    - Immediate result: answer right away.
//!    - Pending result: register the id *before* awaiting, await, unregister,
//!      then answer.
//! 4. Any fault along the way is logged and answered with `null`.
//!
//! [`Dispatcher::dispatch`] does all synchronous work (resolution,
//! invocation, registry insert, cancellation) and spawns pending work before
//! returning, so the caller can keep reading lines while it runs.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use crate::agent::{BoxFuture, CancelHandle, OperationRegistry, Outcome};
use crate::error::{AgentwireError, Result};
use crate::pending::{EntryHandle, PendingRegistry};
use crate::protocol::{Call, Request, RequestId, Response, EVENT_ID};

/// Result of dispatching one request.
pub enum Dispatch {
    /// The response is known already.
    Ready(Response),
    /// The response arrives once the pending operation resolves or faults.
    Pending(BoxFuture<'static, Response>),
}

impl Dispatch {
    /// Wait for the response.
    pub async fn into_response(self) -> Response {
        match self {
            Dispatch::Ready(response) => response,
            Dispatch::Pending(future) => future.await,
        }
    }

    /// Whether the response is still outstanding.
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Dispatch::Pending(_))
    }
}

/// State that lives exactly as long as one agent binding.
struct Binding {
    operations: OperationRegistry,
    pending: Arc<PendingRegistry>,
}

/// Dispatches requests to the currently bound agent.
#[derive(Default)]
pub struct Dispatcher {
    binding: RwLock<Option<Arc<Binding>>>,
}

impl Dispatcher {
    /// Create a dispatcher with no agent bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the agent's operations, replacing any previous binding.
    ///
    /// A fresh pending registry is created; the previous one (if any) is
    /// cleared, which cancels its cancelable operations.
    pub fn bind(&self, operations: OperationRegistry) {
        let binding = Arc::new(Binding {
            operations,
            pending: Arc::new(PendingRegistry::new()),
        });

        let previous = self
            .binding
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(binding);

        if let Some(previous) = previous {
            let dropped = previous.pending.clear();
            tracing::info!(dropped, "replaced agent binding");
        }
    }

    /// Drop the current binding. Returns whether one existed.
    pub fn unbind(&self) -> bool {
        let previous = self
            .binding
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match previous {
            Some(previous) => {
                let dropped = previous.pending.clear();
                tracing::debug!(dropped, "agent unbound");
                true
            }
            None => false,
        }
    }

    /// Whether an agent is bound.
    pub fn is_bound(&self) -> bool {
        self.binding().is_some()
    }

    /// The pending registry of the current binding.
    pub fn pending(&self) -> Option<Arc<PendingRegistry>> {
        self.binding().map(|b| Arc::clone(&b.pending))
    }

    fn binding(&self) -> Option<Arc<Binding>> {
        self.binding
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Dispatch a request.
    ///
    /// Never fails: faults become `null` payloads. Pending work is spawned
    /// before this returns; dropping a [`Dispatch::Pending`] discards the
    /// response but the operation still runs and leaves the registry when
    /// it settles.
    ///
    /// # Panics
    ///
    /// Panics if a pending operation is dispatched outside a Tokio runtime.
    pub fn dispatch(&self, request: Request) -> Dispatch {
        let Request { id, call } = request;

        let binding = match self.binding().ok_or(AgentwireError::ProviderNotBound) {
            Ok(binding) => binding,
            Err(e) => {
                tracing::warn!(id, function = call.function(), error = %e, "answering with id 0");
                return Dispatch::Ready(Response::null(EVENT_ID));
            }
        };

        match call {
            Call::Cancel { target } => {
                let cancelled = binding.pending.cancel(target);
                tracing::debug!(id, target_id = target, cancelled, "cancelRequest handled");
                Dispatch::Ready(Response::new(id, Value::Bool(cancelled)))
            }
            Call::Invoke { function, args } => binding.invoke(id, function, args),
        }
    }

    /// Dispatch a request and wait for its response.
    pub async fn handle(&self, request: Request) -> Response {
        self.dispatch(request).into_response().await
    }
}

impl Binding {
    fn invoke(&self, id: RequestId, function: String, args: Vec<Value>) -> Dispatch {
        tracing::debug!(id, function = %function, "dispatching");

        let operation = match self.operations.invoke(&function, args) {
            Ok(Outcome::Immediate(value)) => {
                return Dispatch::Ready(Response::new(id, value));
            }
            Ok(Outcome::Pending(operation)) => operation,
            Err(e) => {
                return Dispatch::Ready(Response::new(id, settle(id, &function, Err(e))));
            }
        };

        let (future, cancel) = operation.into_parts();
        let ticket = self.pending.insert(id, EntryHandle::from(cancel.clone()));
        let pending = Arc::clone(&self.pending);
        tracing::debug!(id, function = %function, cancelable = cancel.is_some(), "pending");

        // Runs even if the returned Dispatch is dropped, so the entry is
        // always removed once the operation settles
        let task = tokio::spawn(async move {
            let result = await_operation(future, cancel).await;
            // No-op if cancelRequest already removed the entry
            pending.complete(id, ticket);
            Response::new(id, settle(id, &function, result))
        });

        Dispatch::Pending(Box::pin(async move {
            task.await.unwrap_or_else(|e| {
                tracing::error!(id, error = %e, "pending response task failed");
                Response::null(id)
            })
        }))
    }
}

/// Run pending work on its own task so a panic is contained, stopping early
/// if the cancel handle fires.
async fn await_operation(
    future: BoxFuture<'static, Result<Value>>,
    cancel: Option<CancelHandle>,
) -> Result<Value> {
    let mut task = tokio::spawn(future);

    let joined = match cancel {
        Some(cancel) => {
            tokio::select! {
                joined = &mut task => joined,
                () = cancel.token().cancelled() => {
                    task.abort();
                    return Err(AgentwireError::Cancelled);
                }
            }
        }
        None => task.await,
    };

    joined.map_err(|e| AgentwireError::TaskFailed(e.to_string()))?
}

/// Collapse an operation result into a payload, logging faults.
fn settle(id: RequestId, function: &str, result: Result<Value>) -> Value {
    match result {
        Ok(value) => value,
        Err(AgentwireError::Cancelled) => {
            tracing::debug!(id, function, "operation cancelled");
            Value::Null
        }
        Err(e) => {
            tracing::error!(id, function, error = %e, "request failed");
            Value::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio_util::sync::CancellationToken;

    fn bound(agent: Agent) -> Dispatcher {
        let dispatcher = Dispatcher::new();
        let (operations, _) = agent.into_parts();
        dispatcher.bind(operations);
        dispatcher
    }

    fn ping_agent() -> Agent {
        Agent::builder()
            .method("ping", |_: Vec<Value>| Ok("pong"))
            .method("add", |(a, b): (i64, i64)| Ok(a + b))
            .method("fail", |_: Vec<Value>| -> Result<()> {
                Err(AgentwireError::provider("boom"))
            })
            .build()
    }

    #[tokio::test]
    async fn test_not_bound_answers_with_id_zero() {
        let dispatcher = Dispatcher::new();

        let response = dispatcher.handle(Request::invoke(12, "ping", vec![])).await;

        assert_eq!(response, Response::null(0));
        assert!(!dispatcher.is_bound());
    }

    #[tokio::test]
    async fn test_cancel_before_bind_answers_with_id_zero() {
        let dispatcher = Dispatcher::new();

        let response = dispatcher.handle(Request::cancel(7, 3)).await;

        assert_eq!(response, Response::null(0));
    }

    #[tokio::test]
    async fn test_immediate_result() {
        let dispatcher = bound(ping_agent());

        let dispatch = dispatcher.dispatch(Request::invoke(5, "ping", vec![]));
        assert!(!dispatch.is_pending());
        assert_eq!(dispatch.into_response().await, Response::new(5, json!("pong")));
        assert!(dispatcher.pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_positional_arguments() {
        let dispatcher = bound(ping_agent());

        let response = dispatcher
            .handle(Request::invoke(2, "add", vec![json!(40), json!(2)]))
            .await;

        assert_eq!(response, Response::new(2, json!(42)));
    }

    #[tokio::test]
    async fn test_unknown_function_answers_null() {
        let dispatcher = bound(ping_agent());

        let response = dispatcher.handle(Request::invoke(8, "missing", vec![])).await;

        assert_eq!(response, Response::null(8));
    }

    #[tokio::test]
    async fn test_fault_answers_null() {
        let dispatcher = bound(ping_agent());

        assert_eq!(
            dispatcher.handle(Request::invoke(9, "fail", vec![])).await,
            Response::null(9)
        );
        assert_eq!(
            dispatcher
                .handle(Request::invoke(10, "add", vec![json!("x")]))
                .await,
            Response::null(10)
        );
    }

    #[tokio::test]
    async fn test_cancel_unknown_target() {
        let dispatcher = bound(ping_agent());

        let response = dispatcher.handle(Request::cancel(7, 3)).await;

        assert_eq!(response, Response::new(7, json!(false)));
    }

    #[tokio::test]
    async fn test_pending_entry_lives_until_completion() {
        let gate = Arc::new(Notify::new());
        let gate_op = gate.clone();
        let dispatcher = bound(
            Agent::builder()
                .method_async("slow", move |_: Vec<Value>| {
                    let gate = gate_op.clone();
                    async move {
                        gate.notified().await;
                        Ok("finished")
                    }
                })
                .build(),
        );
        let pending = dispatcher.pending().unwrap();

        let dispatch = dispatcher.dispatch(Request::invoke(1, "slow", vec![]));
        assert!(dispatch.is_pending());
        assert!(pending.contains(1));

        gate.notify_one();
        let response = dispatch.into_response().await;

        assert_eq!(response, Response::new(1, json!("finished")));
        assert!(!pending.contains(1));
    }

    #[tokio::test]
    async fn test_dropped_dispatch_still_clears_entry() {
        let gate = Arc::new(Notify::new());
        let gate_op = gate.clone();
        let dispatcher = bound(
            Agent::builder()
                .method_async("slow", move |_: Vec<Value>| {
                    let gate = gate_op.clone();
                    async move {
                        gate.notified().await;
                        Ok(())
                    }
                })
                .build(),
        );
        let pending = dispatcher.pending().unwrap();

        drop(dispatcher.dispatch(Request::invoke(1, "slow", vec![])));
        assert!(pending.contains(1));

        gate.notify_one();
        for _ in 0..100 {
            if pending.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_cancelable_operation() {
        let dispatcher = bound(
            Agent::builder()
                .method_cancelable("forever", |_: Vec<Value>, token: CancellationToken| async move {
                    token.cancelled().await;
                    Ok("observed cancellation")
                })
                .build(),
        );
        let pending = dispatcher.pending().unwrap();

        let dispatch = dispatcher.dispatch(Request::invoke(3, "forever", vec![]));
        let waiter = tokio::spawn(dispatch.into_response());

        let cancel = dispatcher.handle(Request::cancel(4, 3)).await;
        assert_eq!(cancel, Response::new(4, json!(true)));
        assert!(pending.is_empty());

        let response = waiter.await.unwrap();
        assert_eq!(response, Response::null(3));

        // Already gone
        let again = dispatcher.handle(Request::cancel(5, 3)).await;
        assert_eq!(again, Response::new(5, json!(false)));
    }

    #[tokio::test]
    async fn test_cancel_plain_operation_keeps_running() {
        let gate = Arc::new(Notify::new());
        let gate_op = gate.clone();
        let dispatcher = bound(
            Agent::builder()
                .method_async("plain", move |_: Vec<Value>| {
                    let gate = gate_op.clone();
                    async move {
                        gate.notified().await;
                        Ok(99)
                    }
                })
                .build(),
        );
        let pending = dispatcher.pending().unwrap();

        let dispatch = dispatcher.dispatch(Request::invoke(6, "plain", vec![]));
        let waiter = tokio::spawn(dispatch.into_response());

        let cancel = dispatcher.handle(Request::cancel(7, 6)).await;
        assert_eq!(cancel, Response::new(7, json!(true)));
        assert!(!pending.contains(6));

        // The work was not stopped and still produces its result
        gate.notify_one();
        assert_eq!(waiter.await.unwrap(), Response::new(6, json!(99)));
    }

    #[tokio::test]
    async fn test_out_of_order_completion() {
        let gate = Arc::new(Notify::new());
        let gate_op = gate.clone();
        let dispatcher = bound(
            Agent::builder()
                .method_async("first", move |_: Vec<Value>| {
                    let gate = gate_op.clone();
                    async move {
                        gate.notified().await;
                        Ok("one")
                    }
                })
                .method_async("second", |_: Vec<Value>| async { Ok("two") })
                .build(),
        );

        let first = tokio::spawn(dispatcher.dispatch(Request::invoke(1, "first", vec![])).into_response());
        let second = tokio::spawn(dispatcher.dispatch(Request::invoke(2, "second", vec![])).into_response());

        assert_eq!(second.await.unwrap(), Response::new(2, json!("two")));
        assert!(!first.is_finished());

        gate.notify_one();
        assert_eq!(first.await.unwrap(), Response::new(1, json!("one")));
    }

    #[tokio::test]
    async fn test_panicking_operation_answers_null() {
        let dispatcher = bound(
            Agent::builder()
                .method_async("explode", |_: Vec<Value>| async {
                    if true {
                        panic!("operation blew up");
                    }
                    Ok(())
                })
                .build(),
        );

        let response = dispatcher.handle(Request::invoke(11, "explode", vec![])).await;

        assert_eq!(response, Response::null(11));
        assert!(dispatcher.pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rebind_clears_pending() {
        let dispatcher = bound(
            Agent::builder()
                .method_cancelable("wait", |_: Vec<Value>, token: CancellationToken| async move {
                    token.cancelled().await;
                    Ok(())
                })
                .build(),
        );
        let old_pending = dispatcher.pending().unwrap();

        let dispatch = dispatcher.dispatch(Request::invoke(1, "wait", vec![]));
        assert_eq!(old_pending.len(), 1);

        dispatcher.bind(ping_agent().into_parts().0);

        assert!(old_pending.is_empty());
        assert!(dispatcher.pending().unwrap().is_empty());
        let response = tokio::time::timeout(Duration::from_secs(1), dispatch.into_response())
            .await
            .unwrap();
        assert_eq!(response, Response::null(1));
    }

    #[tokio::test]
    async fn test_unbind() {
        let dispatcher = bound(ping_agent());

        assert!(dispatcher.unbind());
        assert!(!dispatcher.unbind());
        assert!(dispatcher.pending().is_none());
        assert_eq!(
            dispatcher.handle(Request::invoke(5, "ping", vec![])).await,
            Response::null(0)
        );
    }
}
