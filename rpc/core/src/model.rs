//! RPC data models and types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Method name used for both fetching and submitting work.
pub const GETWORK_METHOD: &str = "getwork";

/// Request id used when fetching work.
pub const FETCH_REQUEST_ID: u64 = 0;

/// Request id used when submitting a solved header.
pub const SUBMIT_REQUEST_ID: u64 = 1;

/// Decoded length of the `data` field (header plus SHA-256 padding).
pub const DATA_LEN: usize = 128;
/// Decoded length of the `hash1` field.
pub const HASH1_LEN: usize = 64;
/// Decoded length of the `midstate` field.
pub const MIDSTATE_LEN: usize = 32;
/// Decoded length of the `target` field.
pub const TARGET_LEN: usize = 32;

/// Failure to turn a getwork `result` object into a [`WorkTemplate`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("JSON key '{0}' not found")]
    MissingField(&'static str),

    #[error("JSON key '{0}' is not a string")]
    NotAString(&'static str),

    #[error("JSON key '{field}' is not valid hex: {source}")]
    InvalidHex {
        field: &'static str,
        source: hex::FromHexError,
    },

    #[error("JSON key '{field}' decodes to {actual} bytes, expected {expected}")]
    WrongLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// RPC error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Http(u16),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("JSON-decode of work failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Invalid endpoint: {0}")]
    Endpoint(String),
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Malformed(err.to_string())
    }
}

/// JSON-RPC request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl RpcRequest {
    /// Request for a fresh work unit.
    pub fn get_work() -> Self {
        Self {
            method: GETWORK_METHOD.to_string(),
            params: Vec::new(),
            id: FETCH_REQUEST_ID,
        }
    }

    /// Request submitting a solved header, hex encoded.
    pub fn submit_work(data: &[u8]) -> Self {
        Self {
            method: GETWORK_METHOD.to_string(),
            params: vec![Value::String(hex::encode(data))],
            id: SUBMIT_REQUEST_ID,
        }
    }
}

/// Error object carried in a JSON-RPC response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// JSON-RPC response envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
    #[serde(default)]
    pub id: Option<Value>,
}

impl RpcResponse {
    /// Returns the `result` member, or the server-reported error.
    pub fn into_result(self) -> Result<Value, RpcError> {
        if let Some(err) = self.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        self.result
            .ok_or_else(|| RpcError::Malformed("response carries no result".to_string()))
    }
}

/// Work unit as delivered by the work source, all fields decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkTemplate {
    /// Header template in getwork word order, padding included.
    pub data: [u8; DATA_LEN],
    /// Pre-padded buffer for the second hashing pass.
    pub hash1: [u8; HASH1_LEN],
    /// Compression state after the first 64 bytes of `data`.
    pub midstate: [u8; MIDSTATE_LEN],
    /// Little-endian 256-bit threshold.
    pub target: [u8; TARGET_LEN],
}

impl WorkTemplate {
    /// Decodes a getwork `result` object.
    pub fn decode(result: &Value) -> Result<Self, DecodeError> {
        Ok(Self {
            midstate: hex_field(result, "midstate")?,
            data: hex_field(result, "data")?,
            hash1: hex_field(result, "hash1")?,
            target: hex_field(result, "target")?,
        })
    }
}

fn hex_field<const N: usize>(obj: &Value, key: &'static str) -> Result<[u8; N], DecodeError> {
    let value = obj.get(key).ok_or(DecodeError::MissingField(key))?;
    let hex_str = value.as_str().ok_or(DecodeError::NotAString(key))?;
    let bytes = hex::decode(hex_str).map_err(|source| DecodeError::InvalidHex { field: key, source })?;
    bytes.try_into().map_err(|bytes: Vec<u8>| DecodeError::WrongLength {
        field: key,
        expected: N,
        actual: bytes.len(),
    })
}
