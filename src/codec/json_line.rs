//! JSON line codec using `serde_json`.
//!
//! One message per line, compact JSON, no embedded terminator. `serde_json`
//! escapes control characters inside strings, so a compact encoding never
//! contains a raw `\n`.
//!
//! # Example
//!
//! ```
//! use agentwire::codec::JsonLineCodec;
//! use agentwire::protocol::Response;
//! use serde_json::json;
//!
//! let request = JsonLineCodec::decode(br#"[5,{"func":"ping","args":[]}]"#).unwrap();
//! assert_eq!(request.id, 5);
//! assert_eq!(request.call.function(), "ping");
//!
//! let line = JsonLineCodec::encode(&Response::new(5, json!("pong"))).unwrap();
//! assert_eq!(&line[..], br#"[5,"pong"]"#);
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodeError, Result};
use crate::protocol::{Call, Request, RequestId, Response, CANCEL_FUNCTION};

/// Body of a request line.
#[derive(Debug, Serialize, Deserialize)]
struct WireCall {
    func: String,
    #[serde(default)]
    args: Vec<Value>,
}

/// Codec for the line-delimited JSON wire format.
pub struct JsonLineCodec;

impl JsonLineCodec {
    /// Decode one line (without terminator) into a request.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the line is not `[id, {"func", "args"}]`,
    /// or if a `cancelRequest` lacks an integer target.
    pub fn decode(line: &[u8]) -> std::result::Result<Request, DecodeError> {
        let (id, wire): (RequestId, WireCall) = serde_json::from_slice(line)?;

        let call = if wire.func == CANCEL_FUNCTION {
            let target = wire
                .args
                .first()
                .and_then(Value::as_i64)
                .ok_or(DecodeError::InvalidCancelTarget)?;
            Call::Cancel { target }
        } else {
            Call::Invoke {
                function: wire.func,
                args: wire.args,
            }
        };

        Ok(Request { id, call })
    }

    /// Encode a response as a single line (without terminator).
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot be serialized.
    pub fn encode(response: &Response) -> Result<Bytes> {
        let line = serde_json::to_vec(&(response.id, &response.payload))?;
        Ok(Bytes::from(line))
    }

    /// Encode a request as a single line (host side).
    ///
    /// # Errors
    ///
    /// Returns error if an argument cannot be serialized.
    pub fn encode_request(request: &Request) -> Result<Bytes> {
        let wire = match &request.call {
            Call::Cancel { target } => WireCall {
                func: CANCEL_FUNCTION.to_string(),
                args: vec![Value::from(*target)],
            },
            Call::Invoke { function, args } => WireCall {
                func: function.clone(),
                args: args.clone(),
            },
        };
        let line = serde_json::to_vec(&(request.id, wire))?;
        Ok(Bytes::from(line))
    }

    /// Decode a response line (host side).
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the line is not `[id, payload]`.
    pub fn decode_response(line: &[u8]) -> std::result::Result<Response, DecodeError> {
        let (id, payload): (RequestId, Value) = serde_json::from_slice(line)?;
        Ok(Response { id, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_invoke() {
        let request = JsonLineCodec::decode(br#"[5,{"func":"ping","args":[]}]"#).unwrap();

        assert_eq!(request, Request::invoke(5, "ping", vec![]));
    }

    #[test]
    fn test_decode_keeps_argument_order() {
        let request =
            JsonLineCodec::decode(br#"[9,{"func":"edit","args":["a.rs",3,{"x":true},null]}]"#)
                .unwrap();

        match request.call {
            Call::Invoke { function, args } => {
                assert_eq!(function, "edit");
                assert_eq!(args, vec![json!("a.rs"), json!(3), json!({"x": true}), json!(null)]);
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[test]
    fn test_decode_missing_args_defaults_to_empty() {
        let request = JsonLineCodec::decode(br#"[1,{"func":"ping"}]"#).unwrap();

        assert_eq!(request, Request::invoke(1, "ping", vec![]));
    }

    #[test]
    fn test_decode_cancel() {
        let request = JsonLineCodec::decode(br#"[7,{"func":"cancelRequest","args":[3]}]"#).unwrap();

        assert_eq!(request, Request::cancel(7, 3));
    }

    #[test]
    fn test_decode_cancel_without_target() {
        let err = JsonLineCodec::decode(br#"[7,{"func":"cancelRequest","args":[]}]"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidCancelTarget));

        let err =
            JsonLineCodec::decode(br#"[7,{"func":"cancelRequest","args":["3"]}]"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidCancelTarget));
    }

    #[test]
    fn test_decode_truncated_line() {
        let err = JsonLineCodec::decode(br#"[5,{"func":"pi"#).unwrap_err();
        assert!(matches!(err, DecodeError::Syntax(_)));
    }

    #[test]
    fn test_decode_non_array() {
        let err = JsonLineCodec::decode(br#"{"id":5,"func":"ping"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Shape(_)));
    }

    #[test]
    fn test_decode_missing_func() {
        let err = JsonLineCodec::decode(br#"[5,{"args":[]}]"#).unwrap_err();
        assert!(matches!(err, DecodeError::Shape(_)));
    }

    #[test]
    fn test_decode_extra_elements() {
        assert!(JsonLineCodec::decode(br#"[5,{"func":"ping"},1]"#).is_err());
    }

    #[test]
    fn test_decode_non_integer_id() {
        assert!(JsonLineCodec::decode(br#"["5",{"func":"ping"}]"#).is_err());
    }

    #[test]
    fn test_encode_response() {
        let line = JsonLineCodec::encode(&Response::new(7, json!(false))).unwrap();
        assert_eq!(&line[..], b"[7,false]");

        let line = JsonLineCodec::encode(&Response::null(0)).unwrap();
        assert_eq!(&line[..], b"[0,null]");
    }

    #[test]
    fn test_encode_never_embeds_newline() {
        let payload = json!({"text": "line one\nline two\r\n"});
        let line = JsonLineCodec::encode(&Response::new(1, payload)).unwrap();

        assert!(!line.contains(&b'\n'));
    }

    #[test]
    fn test_response_round_trip() {
        let response = Response::new(42, json!({"files": ["a", "b"], "ok": true}));

        let line = JsonLineCodec::encode(&response).unwrap();
        let decoded = JsonLineCodec::decode_response(&line).unwrap();

        assert_eq!(decoded, response);
    }

    #[test]
    fn test_request_round_trip() {
        let request = Request::invoke(3, "complete", vec![json!("fn main"), json!(12)]);
        let line = JsonLineCodec::encode_request(&request).unwrap();
        assert_eq!(JsonLineCodec::decode(&line).unwrap(), request);

        let cancel = Request::cancel(4, 3);
        let line = JsonLineCodec::encode_request(&cancel).unwrap();
        assert_eq!(&line[..], br#"[4,{"func":"cancelRequest","args":[3]}]"#);
    }
}
