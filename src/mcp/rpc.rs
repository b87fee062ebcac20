//! JSON-RPC 2.0 envelope parsing and response framing
//!
//! Ids are echoed exactly: string and `i64` ids go through the SDK response
//! types, anything else (null, floats, large unsigned) is framed by hand with
//! the original JSON value so a numeric id is never turned into a string.

use rust_mcp_sdk::schema::{
    JsonrpcErrorResponse, JsonrpcResultResponse, RequestId, Result as McpResult, RpcError,
};
use serde_json::{json, Map, Value};

use crate::errors::McpError;

pub const JSONRPC_VERSION: &str = "2.0";

/// A structurally valid incoming message.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    /// No `id` member; never answered.
    Notification {
        method: String,
        params: Option<Value>,
    },
}

/// Validates the envelope of one JSON-RPC message.
///
/// `Err(Some(response))` is an `Invalid Request` error to send back;
/// `Err(None)` means the message was a malformed notification and must be
/// dropped without a response.
pub fn parse_envelope(payload: Value) -> Result<Incoming, Option<Value>> {
    let Value::Object(mut object) = payload else {
        return Err(Some(invalid_request(None, "message must be a JSON object")));
    };

    let id = object.remove("id");
    if let Some(id) = &id {
        if !matches!(id, Value::String(_) | Value::Number(_) | Value::Null) {
            return Err(Some(invalid_request(
                None,
                "id must be a string, a number or null",
            )));
        }
    }

    let reject = |id: Option<Value>, reason: &'static str| {
        id.map(|id| invalid_request(Some(id), reason))
    };

    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(reject(id, "jsonrpc must be \"2.0\""));
    }

    let method = match object.remove("method") {
        Some(Value::String(method)) if !method.trim().is_empty() => method,
        _ => return Err(reject(id, "method must be a non-empty string")),
    };

    let params = match object.remove("params") {
        None => None,
        Some(params @ (Value::Object(_) | Value::Array(_))) => Some(params),
        Some(_) => return Err(reject(id, "params must be an object or an array")),
    };

    Ok(match id {
        Some(id) => Incoming::Request { id, method, params },
        None => Incoming::Notification { method, params },
    })
}

pub fn invalid_request(id: Option<Value>, reason: &'static str) -> Value {
    mcp_error_to_json_rpc(id, &McpError::InvalidRequest(reason))
}

pub fn parse_error() -> Value {
    mcp_error_to_json_rpc(None, &McpError::Parse)
}

pub fn mcp_error_to_json_rpc(id: Option<Value>, err: &McpError) -> Value {
    json_rpc_error_with_data(id, err.code(), err.message(), err.data())
}

pub fn json_rpc_error(id: Option<Value>, code: i32, message: &str) -> Value {
    json_rpc_error_with_data(id, code, message, None)
}

pub fn json_rpc_error_with_data(
    id: Option<Value>,
    code: i32,
    message: &str,
    data: Option<Value>,
) -> Value {
    if let Some(request_id) = id.as_ref().and_then(value_to_request_id) {
        let response = JsonrpcErrorResponse::new(
            RpcError {
                code: i64::from(code),
                data: data.clone(),
                message: message.to_string(),
            },
            Some(request_id),
        );
        if let Ok(value) = serde_json::to_value(response) {
            return value;
        }
    }

    let mut error = Map::new();
    error.insert("code".to_string(), json!(code));
    error.insert("message".to_string(), json!(message));
    if let Some(data) = data {
        error.insert("data".to_string(), data);
    }

    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id.unwrap_or(Value::Null),
        "error": Value::Object(error),
    })
}

pub fn json_rpc_result(id: Option<Value>, result: Value) -> Value {
    if let Some(request_id) = id.as_ref().and_then(value_to_request_id) {
        let extra = result.as_object().cloned();
        if extra.is_some() {
            let response = JsonrpcResultResponse::new(request_id, McpResult { meta: None, extra });
            if let Ok(value) = serde_json::to_value(response) {
                return value;
            }
        }
    }

    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id.unwrap_or(Value::Null),
        "result": result
    })
}

/// SDK id for values the SDK can represent without changing their JSON form.
pub fn value_to_request_id(value: &Value) -> Option<RequestId> {
    match value {
        Value::String(id) => Some(RequestId::String(id.clone())),
        Value::Number(number) if number.is_i64() => number.as_i64().map(RequestId::Integer),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{INVALID_REQUEST, PARSE_ERROR};

    #[test]
    fn parses_request_with_params() {
        let incoming = parse_envelope(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/list",
            "params": {}
        }))
        .expect("valid request");

        assert_eq!(
            incoming,
            Incoming::Request {
                id: json!(1),
                method: "tools/list".to_string(),
                params: Some(json!({})),
            }
        );
    }

    #[test]
    fn missing_id_is_notification() {
        let incoming = parse_envelope(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .expect("valid notification");

        assert!(matches!(incoming, Incoming::Notification { .. }));
    }

    #[test]
    fn explicit_null_id_is_a_request() {
        let incoming = parse_envelope(json!({
            "jsonrpc": "2.0",
            "id": null,
            "method": "ping"
        }))
        .expect("valid request");

        assert!(matches!(incoming, Incoming::Request { id: Value::Null, .. }));
    }

    #[test]
    fn malformed_notification_is_silent() {
        let outcome = parse_envelope(json!({ "jsonrpc": "1.0", "method": "ping" }));
        assert_eq!(outcome, Err(None));

        let outcome = parse_envelope(json!({ "jsonrpc": "2.0", "method": "ping", "params": 3 }));
        assert_eq!(outcome, Err(None));
    }

    #[test]
    fn malformed_request_echoes_id() {
        let response = parse_envelope(json!({ "jsonrpc": "2.0", "id": "abc" }))
            .expect_err("method is required")
            .expect("requests get an answer");

        assert_eq!(response["id"], "abc");
        assert_eq!(response["error"]["code"], INVALID_REQUEST);
        assert_eq!(
            response["error"]["data"]["message"],
            "method must be a non-empty string"
        );
    }

    #[test]
    fn non_object_payload_is_invalid_request() {
        let response = parse_envelope(json!(42))
            .expect_err("not an object")
            .expect("answered");

        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["error"]["code"], INVALID_REQUEST);
    }

    #[test]
    fn result_echoes_numeric_id_as_number() {
        let response = json_rpc_result(Some(json!(1)), json!({}));
        assert_eq!(
            response,
            json!({ "jsonrpc": "2.0", "id": 1, "result": {} })
        );

        let response = json_rpc_result(Some(json!("1")), json!({}));
        assert_eq!(response["id"], json!("1"));
    }

    #[test]
    fn unusual_ids_are_echoed_verbatim() {
        let float_id = json_rpc_result(Some(json!(1.5)), json!({}));
        assert_eq!(float_id["id"], json!(1.5));

        let big_id = json_rpc_error(Some(json!(u64::MAX)), -32601, "Method not found");
        assert_eq!(big_id["id"], json!(u64::MAX));
        assert_eq!(big_id["error"]["code"], -32601);

        let null_id = json_rpc_result(Some(Value::Null), json!({}));
        assert_eq!(null_id["id"], Value::Null);
    }

    #[test]
    fn error_and_result_are_exclusive() {
        let error = json_rpc_error(Some(json!(5)), -32601, "Method not found");
        assert!(error.get("error").is_some());
        assert!(error.get("result").is_none());

        let result = json_rpc_result(Some(json!(5)), json!({ "tools": [] }));
        assert!(result.get("result").is_some());
        assert!(result.get("error").is_none());
    }

    #[test]
    fn parse_error_has_null_id() {
        let response = parse_error();
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["error"]["code"], PARSE_ERROR);
        assert_eq!(response["error"]["message"], "Parse error");
    }
}
