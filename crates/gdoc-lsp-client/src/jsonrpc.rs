//! JSON-RPC 2.0 message types for LSP communication.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

fn version() -> String {
    JSONRPC_VERSION.to_owned()
}

/// Request identifier; servers may use numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric identifier, used for every client-issued request.
    Number(i64),
    /// String identifier.
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(id) => write!(formatter, "{id}"),
            Self::String(id) => formatter.write_str(id),
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

/// A JSON-RPC 2.0 request message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version, always "2.0".
    #[serde(default = "version")]
    pub jsonrpc: String,
    /// Unique request identifier.
    pub id: RequestId,
    /// The method to invoke.
    pub method: String,
    /// Optional parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Creates a new request with a specific ID.
    #[must_use]
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: version(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no response expected).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Protocol version, always "2.0".
    #[serde(default = "version")]
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Optional parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Creates a new notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: version(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response message.
///
/// A successful response with a `null` result is represented as
/// `result: Some(Value::Null)` when built locally; when parsed, a `null`
/// result reads back as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version.
    #[serde(default = "version")]
    pub jsonrpc: String,
    /// Request identifier this response corresponds to.
    pub id: Option<RequestId>,
    /// The result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Builds a success response.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: version(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn failure(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: version(),
            id: Some(id),
            result: None,
            error: Some(error),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// `MethodNotFound` as defined by JSON-RPC.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// `InternalError` as defined by JSON-RPC.
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Builds an error object without data.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Any message that can arrive on the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    /// A request (from the server's side this is a server-initiated request).
    Request(JsonRpcRequest),
    /// A notification.
    Notification(JsonRpcNotification),
    /// A response to an earlier request.
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// Classifies a raw frame.
    ///
    /// A frame carrying `method` is a request when it also carries an `id`
    /// and a notification otherwise; anything else is treated as a response.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error when the frame is not valid JSON or
    /// does not fit the selected shape.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(bytes)?;
        let has_method = value.get("method").is_some();
        let has_id = value.get("id").is_some_and(|id| !id.is_null());

        if has_method && has_id {
            serde_json::from_value(value).map(Self::Request)
        } else if has_method {
            serde_json::from_value(value).map(Self::Notification)
        } else {
            serde_json::from_value(value).map(Self::Response)
        }
    }

    /// Serialises the message into a frame payload.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error if a parameter value cannot be
    /// serialised.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::Request(request) => serde_json::to_vec(request),
            Self::Notification(notification) => serde_json::to_vec(notification),
            Self::Response(response) => serde_json::to_vec(response),
        }
    }

    /// Method name, when the message carries one.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(request) => Some(request.method.as_str()),
            Self::Notification(notification) => Some(notification.method.as_str()),
            Self::Response(_) => None,
        }
    }
}
