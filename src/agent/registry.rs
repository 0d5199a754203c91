//! Operation registry for resolving requests by function name.
//!
//! The registry maps operation names to handlers. The set is fixed once the
//! agent is built; a name that is not registered resolves to
//! [`AgentwireError::UnknownFunction`].
//!
//! Positional arguments arrive as a JSON array and are deserialized into the
//! handler's argument type, so a tuple binds them in order:
//!
//! ```
//! use agentwire::agent::OperationRegistry;
//! use serde_json::json;
//!
//! let mut registry = OperationRegistry::new();
//! registry.method("add", |(a, b): (i64, i64)| Ok(a + b));
//!
//! assert!(registry.contains("add"));
//! let outcome = registry.invoke("add", vec![json!(2), json!(3)]).unwrap();
//! assert!(!outcome.is_pending());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{CancelHandle, Outcome, PendingOperation};
use crate::error::{AgentwireError, Result};

/// Trait for operation handlers.
pub trait Operation: Send + Sync + 'static {
    /// Invoke the operation with positional arguments.
    fn invoke(&self, args: Vec<Value>) -> Result<Outcome>;
}

impl<F> Operation for F
where
    F: Fn(Vec<Value>) -> Result<Outcome> + Send + Sync + 'static,
{
    fn invoke(&self, args: Vec<Value>) -> Result<Outcome> {
        (self)(args)
    }
}

/// Deserialize positional arguments into `T`.
fn parse_args<T: DeserializeOwned>(function: &str, args: Vec<Value>) -> Result<T> {
    serde_json::from_value(Value::Array(args)).map_err(|source| {
        AgentwireError::InvalidArguments {
            function: function.to_string(),
            source,
        }
    })
}

/// Resolve a finished operation into a payload.
fn to_payload<R: Serialize>(result: Result<R>) -> Result<Value> {
    Ok(serde_json::to_value(result?)?)
}

/// Handler that answers immediately.
pub struct ImmediateHandler<F, T, R> {
    name: String,
    handler: F,
    _phantom: PhantomData<fn(T) -> R>,
}

impl<F, T, R> ImmediateHandler<F, T, R>
where
    F: Fn(T) -> Result<R> + Send + Sync + 'static,
    T: DeserializeOwned + 'static,
    R: Serialize + 'static,
{
    /// Create a new immediate handler.
    pub fn new(name: &str, handler: F) -> Self {
        Self {
            name: name.to_string(),
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R> Operation for ImmediateHandler<F, T, R>
where
    F: Fn(T) -> Result<R> + Send + Sync + 'static,
    T: DeserializeOwned + 'static,
    R: Serialize + 'static,
{
    fn invoke(&self, args: Vec<Value>) -> Result<Outcome> {
        let parsed = parse_args(&self.name, args)?;
        let value = to_payload((self.handler)(parsed))?;
        Ok(Outcome::Immediate(value))
    }
}

/// Handler whose result arrives later and cannot be cancelled.
pub struct AsyncHandler<F, T, Fut> {
    name: String,
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, Fut, R> AsyncHandler<F, T, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
    R: Serialize + 'static,
{
    /// Create a new async handler.
    pub fn new(name: &str, handler: F) -> Self {
        Self {
            name: name.to_string(),
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, Fut, R> Operation for AsyncHandler<F, T, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
    R: Serialize + 'static,
{
    fn invoke(&self, args: Vec<Value>) -> Result<Outcome> {
        let parsed = parse_args(&self.name, args)?;
        let fut = (self.handler)(parsed);
        Ok(Outcome::Pending(PendingOperation::new(async move {
            to_payload(fut.await)
        })))
    }
}

/// Handler whose result arrives later and which observes a cancellation token.
pub struct CancelableHandler<F, T, Fut> {
    name: String,
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, Fut, R> CancelableHandler<F, T, Fut>
where
    F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
    R: Serialize + 'static,
{
    /// Create a new cancelable handler.
    pub fn new(name: &str, handler: F) -> Self {
        Self {
            name: name.to_string(),
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, Fut, R> Operation for CancelableHandler<F, T, Fut>
where
    F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
    R: Serialize + 'static,
{
    fn invoke(&self, args: Vec<Value>) -> Result<Outcome> {
        let parsed = parse_args(&self.name, args)?;
        let cancel = CancelHandle::new();
        let fut = (self.handler)(parsed, cancel.token().clone());
        Ok(Outcome::Pending(PendingOperation::cancelable(
            async move { to_payload(fut.await) },
            cancel,
        )))
    }
}

/// Registry mapping operation names to handlers.
#[derive(Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Box<dyn Operation>>,
}

impl OperationRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw operation that builds its own [`Outcome`].
    ///
    /// Registering the same name twice replaces the earlier operation.
    pub fn register<O: Operation>(&mut self, name: &str, operation: O) {
        if self
            .operations
            .insert(name.to_string(), Box::new(operation))
            .is_some()
        {
            tracing::warn!(function = name, "replacing previously registered operation");
        }
    }

    /// Register an operation that answers immediately.
    pub fn method<F, T, R>(&mut self, name: &str, handler: F)
    where
        F: Fn(T) -> Result<R> + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        R: Serialize + 'static,
    {
        self.register(name, ImmediateHandler::new(name, handler));
    }

    /// Register an operation that resolves later and cannot be cancelled.
    pub fn method_async<F, T, Fut, R>(&mut self, name: &str, handler: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Serialize + 'static,
    {
        self.register(name, AsyncHandler::new(name, handler));
    }

    /// Register an operation that resolves later and honours `cancelRequest`.
    pub fn method_cancelable<F, T, Fut, R>(&mut self, name: &str, handler: F)
    where
        F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Serialize + 'static,
    {
        self.register(name, CancelableHandler::new(name, handler));
    }

    /// Check whether an operation is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Get an operation by name.
    pub fn get(&self, name: &str) -> Option<&dyn Operation> {
        self.operations.get(name).map(|op| op.as_ref())
    }

    /// Names of all registered operations.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if no operations are registered.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Resolve `name` and invoke it with `args`.
    ///
    /// # Errors
    ///
    /// [`AgentwireError::UnknownFunction`] if the name is not registered,
    /// otherwise whatever the operation itself fails with.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Outcome> {
        let operation = self
            .get(name)
            .ok_or_else(|| AgentwireError::UnknownFunction(name.to_string()))?;

        operation.invoke(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn immediate(outcome: Outcome) -> Value {
        match outcome {
            Outcome::Immediate(value) => value,
            Outcome::Pending(op) => panic!("expected immediate, got {:?}", op),
        }
    }

    #[test]
    fn test_register_method() {
        let mut registry = OperationRegistry::new();

        registry.method("ping", |_: Vec<Value>| Ok("pong"));

        assert!(registry.contains("ping"));
        assert_eq!(registry.len(), 1);
        let value = immediate(registry.invoke("ping", vec![]).unwrap());
        assert_eq!(value, json!("pong"));
    }

    #[test]
    fn test_positional_arguments() {
        let mut registry = OperationRegistry::new();

        registry.method("concat", |(a, b, n): (String, String, usize)| {
            Ok(format!("{}{}", a, b).repeat(n))
        });

        let value = immediate(
            registry
                .invoke("concat", vec![json!("ab"), json!("c"), json!(2)])
                .unwrap(),
        );
        assert_eq!(value, json!("abcabc"));
    }

    #[test]
    fn test_unknown_function() {
        let registry = OperationRegistry::new();

        let err = registry.invoke("nope", vec![]).unwrap_err();
        assert!(matches!(err, AgentwireError::UnknownFunction(ref name) if name == "nope"));
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn test_invalid_arguments() {
        let mut registry = OperationRegistry::new();
        registry.method("square", |(n,): (i64,)| Ok(n * n));

        let err = registry.invoke("square", vec![json!("four")]).unwrap_err();
        assert!(matches!(err, AgentwireError::InvalidArguments { ref function, .. } if function == "square"));
    }

    #[test]
    fn test_provider_fault() {
        let mut registry = OperationRegistry::new();
        registry.method("fail", |_: Vec<Value>| -> Result<()> {
            Err(AgentwireError::provider("boom"))
        });

        let err = registry.invoke("fail", vec![]).unwrap_err();
        assert!(matches!(err, AgentwireError::Provider(ref m) if m == "boom"));
    }

    #[tokio::test]
    async fn test_async_method_is_pending() {
        let mut registry = OperationRegistry::new();
        registry.method_async("later", |(n,): (i64,)| async move { Ok(n + 1) });

        let outcome = registry.invoke("later", vec![json!(41)]).unwrap();
        let op = match outcome {
            Outcome::Pending(op) => op,
            Outcome::Immediate(v) => panic!("expected pending, got {}", v),
        };
        assert!(!op.is_cancelable());

        let (future, _) = op.into_parts();
        assert_eq!(future.await.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn test_cancelable_method_receives_token() {
        let mut registry = OperationRegistry::new();
        registry.method_cancelable("wait", |_: Vec<Value>, token: CancellationToken| async move {
            token.cancelled().await;
            Ok("stopped")
        });

        let op = match registry.invoke("wait", vec![]).unwrap() {
            Outcome::Pending(op) => op,
            Outcome::Immediate(v) => panic!("expected pending, got {}", v),
        };
        assert!(op.is_cancelable());

        let (future, cancel) = op.into_parts();
        cancel.unwrap().cancel();
        assert_eq!(future.await.unwrap(), json!("stopped"));
    }

    #[test]
    fn test_raw_operation() {
        let mut registry = OperationRegistry::new();
        registry.register("count", |args: Vec<Value>| -> Result<Outcome> {
            Ok(Outcome::Immediate(json!(args.len())))
        });

        let value = immediate(registry.invoke("count", vec![json!(1), json!(2)]).unwrap());
        assert_eq!(value, json!(2));
    }

    #[test]
    fn test_names() {
        let mut registry = OperationRegistry::new();
        registry.method("a", |_: Vec<Value>| Ok(()));
        registry.method("b", |_: Vec<Value>| Ok(()));

        let mut names: Vec<_> = registry.names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["a", "b"]);
    }
}
