//! JSON-RPC 2.0 message types exchanged over the channel.
//!
//! Both peers send requests and both answer them, so every type here is
//! serialisable and deserialisable.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version carried on every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard and application-defined JSON-RPC error codes.
pub mod codes {
    /// The payload was not valid JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// The method does not exist on the receiving peer.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// The parameters could not be decoded.
    pub const INVALID_PARAMS: i64 = -32602;
    /// The receiver failed while producing a result.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// A hook or host API implementation returned an error.
    pub const APPLICATION_ERROR: i64 = -32000;
    /// The host has no API surface to serve the call.
    pub const HOST_API_UNAVAILABLE: i64 = -32001;
}

/// A JSON-RPC 2.0 request message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version, always "2.0".
    pub jsonrpc: String,
    /// Request identifier, unique per sending peer.
    pub id: i64,
    /// The method to invoke.
    pub method: String,
    /// Optional parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Creates a request with the given identifier.
    #[must_use]
    pub fn new(id: i64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no response expected).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Protocol version, always "2.0".
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Optional parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    /// Creates a notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version.
    pub jsonrpc: String,
    /// Identifier of the request being answered.
    pub id: Option<i64>,
    /// The result on success. A `null` result decodes as `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Builds a success response.
    #[must_use]
    pub fn success(id: i64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn failure(id: Option<i64>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Creates an error object without data.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// The receiver does not implement `method`.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    /// The parameters could not be decoded.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }

    /// The receiver failed internally.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }

    /// An implementation returned an application-level error.
    #[must_use]
    pub fn application(message: impl Into<String>) -> Self {
        Self::new(codes::APPLICATION_ERROR, message)
    }
}

/// Any message that can arrive on the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A call expecting a response.
    Request(Request),
    /// A fire-and-forget call.
    Notification(Notification),
    /// An answer to an earlier request.
    Response(Response),
}

impl Message {
    /// Classifies and decodes a raw frame payload.
    ///
    /// Messages carrying a `method` and a non-null `id` are requests, those
    /// with only a `method` are notifications, everything else is treated as
    /// a response.
    ///
    /// # Errors
    ///
    /// Returns the decoding error if the payload is not a valid message.
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
}

/// Decodes request parameters, treating absent parameters as `null`.
///
/// # Errors
///
/// Returns an `INVALID_PARAMS` error object when decoding fails.
pub fn decode_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|err| RpcError::invalid_params(format!("invalid parameters: {err}")))
}

/// Encodes a handler result.
///
/// # Errors
///
/// Returns an `INTERNAL_ERROR` error object when encoding fails.
pub fn encode_result<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value)
        .map_err(|err| RpcError::internal(format!("failed to encode result: {err}")))
}
