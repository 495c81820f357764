//! Bus wire protocol: framing and message types.
//!
//! Frame format is a 4-byte big-endian length prefix followed by a UTF-8
//! JSON-RPC 2.0 payload:
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! Method calls carry their arguments as a JSON array in `params`. A few
//! method names are reserved for the bus itself and never reach the method
//! table: property access, signal subscription, and introspection. Signal
//! delivery to subscribed connections uses JSON-RPC notifications (no
//! `id`) with method [`NOTIFICATION_SIGNAL`].

use crate::config::BusConfig;
use crate::error::{EchoBusError, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Reserved method: read a property. Params: `[name]`.
pub const METHOD_PROPERTIES_GET: &str = "Properties.Get";
/// Reserved method: write a property. Params: `[name, value]`.
pub const METHOD_PROPERTIES_SET: &str = "Properties.Set";
/// Reserved method: start receiving signal notifications on this
/// connection. No params.
pub const METHOD_SIGNALS_SUBSCRIBE: &str = "Signals.Subscribe";
/// Reserved method: describe the registered surface. No params.
pub const METHOD_INTROSPECT: &str = "Introspect";
/// Notification method used for signal delivery. Params:
/// `{"name": ..., "payload": [...]}`.
pub const NOTIFICATION_SIGNAL: &str = "signal";

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

impl BusRequest {
    /// Create a new JSON-RPC 2.0 request.
    pub fn new(method: impl Into<String>, params: serde_json::Value, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params: Some(params),
            id: Some(serde_json::Value::Number(id.into())),
        }
    }

    /// Create a notification (a request without an id, expecting no reply).
    pub fn notification(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params: Some(params),
            id: None,
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BusRpcError>,
    pub id: Option<serde_json::Value>,
}

impl BusResponse {
    /// Create a success response.
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<serde_json::Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(BusRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }

    /// Create an error response from a service-side failure.
    pub fn from_error(id: Option<serde_json::Value>, err: &EchoBusError) -> Self {
        Self::error(id, err.to_rpc_error_code(), err.to_string())
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Read a length-prefixed frame from an async reader.
///
/// Returns `None` on clean EOF (peer closed the connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > BusConfig::MAX_FRAME_SIZE {
        return Err(EchoBusError::Io {
            message: format!(
                "frame size {} exceeds maximum {}",
                len,
                BusConfig::MAX_FRAME_SIZE
            ),
            source: None,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

/// Write a length-prefixed frame to an async writer.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
