/// Stratum v1 JSON-RPC message types
///
/// Newline-delimited JSON. Replies always carry `"jsonrpc":"2.0"`; server
/// pushes carry `"id": null`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Size of the miner-chosen extranonce2, in bytes.
pub const EXTRANONCE2_SIZE: u32 = 4;

/// BIP-320 general purpose version bits.
pub const BIP320_MASK: u32 = 0x1fffe000;
pub const BIP320_MASK_STR: &str = "1fffe000";

/// Longest accepted request line, terminator excluded.
pub const MAX_REQ_SIZE: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumRequest {
    #[serde(default)]
    pub id: Value,

    pub method: String,

    #[serde(default)]
    pub params: Value,
}

impl StratumRequest {
    /// Params as a list of strings; `None` if any entry is not a string.
    pub fn string_params(&self) -> Option<Vec<String>> {
        match &self.params {
            Value::Null => Some(Vec::new()),
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumResponse {
    pub id: Value,

    pub jsonrpc: String,

    /// Present on every success reply, even when `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Serialized as `null` on success.
    pub error: Option<StratumError>,
}

impl StratumResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: StratumError) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
        }
    }

    /// A result paired with a soft error (share accepted, but warned).
    pub fn with_warning(id: Value, result: Value, error: StratumError) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: Some(error),
        }
    }
}

/// Server-initiated notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumPush {
    pub id: Value,
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
}

impl StratumPush {
    pub fn new(method: &str, params: Value) -> Self {
        Self {
            id: Value::Null,
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StratumError {
    pub code: i32,
    pub message: String,
}

impl StratumError {
    pub const GENERIC: i32 = -1;
    pub const METHOD_NOT_FOUND: i32 = -3;
    pub const PARSE_ERROR: i32 = -32700;
    pub const DUPLICATE_SHARE: i32 = 22;
    pub const INVALID_SHARE: i32 = 23;
    pub const NOT_SUBSCRIBED: i32 = 25;
    pub const ILLEGAL_PARAMS: i32 = 27;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_params() -> Self {
        Self::new(Self::GENERIC, "Invalid params")
    }

    pub fn invalid_authorize() -> Self {
        Self::new(Self::GENERIC, "Invalid authorize")
    }

    pub fn blacklisted() -> Self {
        Self::new(Self::GENERIC, "You are blacklisted")
    }

    pub fn malformed_pow() -> Self {
        Self::new(Self::GENERIC, "Malformed PoW result")
    }

    pub fn high_invalid_rate() -> Self {
        Self::new(Self::GENERIC, "High rate of invalid shares")
    }

    pub fn method_not_found() -> Self {
        Self::new(Self::METHOD_NOT_FOUND, "Method not found")
    }

    pub fn parse_error() -> Self {
        Self::new(Self::PARSE_ERROR, "Parse error")
    }

    pub fn duplicate_share() -> Self {
        Self::new(Self::DUPLICATE_SHARE, "Duplicate share")
    }

    pub fn invalid_share() -> Self {
        Self::new(Self::INVALID_SHARE, "Invalid share")
    }

    pub fn not_subscribed() -> Self {
        Self::new(Self::NOT_SUBSCRIBED, "Not subscribed")
    }

    pub fn illegal_params() -> Self {
        Self::new(Self::ILLEGAL_PARAMS, "Illegal params")
    }

    pub fn too_few_params() -> Self {
        Self::new(Self::ILLEGAL_PARAMS, "Too few params")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let req: StratumRequest =
            serde_json::from_str(r#"{"method":"mining.extranonce.subscribe"}"#).unwrap();
        assert!(req.id.is_null());
        assert_eq!(req.string_params(), Some(vec![]));
    }

    #[test]
    fn test_string_params() {
        let req: StratumRequest =
            serde_json::from_str(r#"{"id":1,"method":"mining.submit","params":["a","b"]}"#)
                .unwrap();
        assert_eq!(req.string_params().unwrap(), vec!["a", "b"]);

        let mixed: StratumRequest =
            serde_json::from_str(r#"{"id":1,"method":"mining.submit","params":["a",2]}"#).unwrap();
        assert!(mixed.string_params().is_none());
    }

    #[test]
    fn test_success_shape() {
        let v = serde_json::to_value(StratumResponse::success(json!(7), json!(false))).unwrap();
        assert_eq!(v, json!({"id": 7, "jsonrpc": "2.0", "result": false, "error": null}));
    }

    #[test]
    fn test_error_shape() {
        let v = serde_json::to_value(StratumResponse::error(
            json!(3),
            StratumError::duplicate_share(),
        ))
        .unwrap();
        assert_eq!(
            v,
            json!({"id": 3, "jsonrpc": "2.0", "error": {"code": 22, "message": "Duplicate share"}})
        );
    }

    #[test]
    fn test_push_shape() {
        let v = serde_json::to_value(StratumPush::new("mining.set_difficulty", json!([1024.0])))
            .unwrap();
        assert_eq!(
            v,
            json!({
                "id": null,
                "jsonrpc": "2.0",
                "method": "mining.set_difficulty",
                "params": [1024.0]
            })
        );
    }
}
