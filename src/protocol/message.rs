//! Wire-level message types.
//!
//! Every unit on the wire is a two-element JSON array:
//!
//! ```text
//! request:   [id, {"func": name, "args": [...]}]
//! cancel:    [id, {"func": "cancelRequest", "args": [targetId]}]
//! response:  [id, payload]
//! event:     [0, payload]
//! ```

use serde_json::Value;

/// Caller-chosen correlation id. Treated as opaque.
pub type RequestId = i64;

/// Id used for unsolicited event lines (and for not-bound answers).
pub const EVENT_ID: RequestId = 0;

/// Reserved function name handled by the dispatcher itself.
pub const CANCEL_FUNCTION: &str = "cancelRequest";

/// What a request asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// Cancel the in-flight operation started by request `target`.
    Cancel {
        /// Id of the request to cancel.
        target: RequestId,
    },
    /// Invoke a named operation on the bound agent.
    Invoke {
        /// Operation name.
        function: String,
        /// Positional arguments, in order.
        args: Vec<Value>,
    },
}

impl Call {
    /// Name of the function as it appeared on the wire.
    pub fn function(&self) -> &str {
        match self {
            Call::Cancel { .. } => CANCEL_FUNCTION,
            Call::Invoke { function, .. } => function,
        }
    }
}

/// A decoded request. Consumed exactly once by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id echoed in the response.
    pub id: RequestId,
    /// Requested call.
    pub call: Call,
}

impl Request {
    /// Create an invocation request.
    pub fn invoke(id: RequestId, function: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            id,
            call: Call::Invoke {
                function: function.into(),
                args,
            },
        }
    }

    /// Create a cancellation request for `target`.
    pub fn cancel(id: RequestId, target: RequestId) -> Self {
        Self {
            id,
            call: Call::Cancel { target },
        }
    }

    /// Whether this is a `cancelRequest`.
    #[inline]
    pub fn is_cancel(&self) -> bool {
        matches!(self.call, Call::Cancel { .. })
    }
}

/// A response (or unsolicited event) line.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Echoed request id, or [`EVENT_ID`].
    pub id: RequestId,
    /// Result value; `null` for faults.
    pub payload: Value,
}

impl Response {
    /// Create a response for request `id`.
    pub fn new(id: RequestId, payload: Value) -> Self {
        Self { id, payload }
    }

    /// A `null`-payload response, used for faults and cancellations.
    pub fn null(id: RequestId) -> Self {
        Self::new(id, Value::Null)
    }

    /// An unsolicited event line.
    pub fn event(payload: Value) -> Self {
        Self::new(EVENT_ID, payload)
    }

    /// Whether this line carries the reserved event id.
    #[inline]
    pub fn is_event(&self) -> bool {
        self.id == EVENT_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_function_name() {
        assert_eq!(Request::cancel(1, 2).call.function(), "cancelRequest");
        assert_eq!(Request::invoke(1, "ping", vec![]).call.function(), "ping");
    }

    #[test]
    fn test_is_cancel() {
        assert!(Request::cancel(7, 3).is_cancel());
        assert!(!Request::invoke(7, "ping", vec![json!(1)]).is_cancel());
    }

    #[test]
    fn test_event_response_uses_reserved_id() {
        let event = Response::event(json!({"kind": "progress"}));
        assert_eq!(event.id, EVENT_ID);
        assert!(event.is_event());
        assert!(!Response::null(4).is_event());
    }
}
