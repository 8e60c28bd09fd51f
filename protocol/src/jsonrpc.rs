//! Request/response envelopes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Integer(i64),
}

impl Default for RequestId {
    fn default() -> Self {
        RequestId::Integer(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub id: RequestId,
    pub result: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub id: RequestId,
    pub error: JsonRpcErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: i64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            id: RequestId::Integer(id),
            method: method.into(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_without_params_omits_the_field() {
        let req = JsonRpcRequest::new(3, "service.status", None);
        let json = serde_json::to_string(&req).unwrap_or_default();
        assert_eq!(json, r#"{"id":3,"method":"service.status"}"#);
    }

    #[test]
    fn string_and_integer_ids_both_parse() {
        let a: Result<JsonRpcRequest, _> =
            serde_json::from_str(r#"{"id":"abc","method":"hello"}"#);
        let b: Result<JsonRpcRequest, _> = serde_json::from_str(r#"{"id":7,"method":"hello"}"#);
        assert_eq!(a.map(|r| r.id).ok(), Some(RequestId::String("abc".into())));
        assert_eq!(b.map(|r| r.id).ok(), Some(RequestId::Integer(7)));
    }

    #[test]
    fn error_data_is_optional() {
        let err = JsonRpcError {
            id: RequestId::Integer(1),
            error: JsonRpcErrorBody {
                code: 13,
                message: "certificate not found: X".into(),
                data: None,
            },
        };
        let value = serde_json::to_value(&err).unwrap_or_default();
        assert_eq!(
            value,
            serde_json::json!({"id": 1, "error": {"code": 13, "message": "certificate not found: X"}})
        );
    }
}
