//! Bus client: connects to a published service endpoint and issues calls.
//!
//! A tokio `Mutex` serializes access to the TCP stream, so one client can
//! be shared across async tasks. After [`BusClient::subscribe`], signal
//! notification frames may arrive interleaved with call responses; frames
//! that are not the awaited response are buffered and handed out through
//! [`BusClient::next_signal`].

use super::protocol::{
    read_frame, write_frame, BusRequest, BusResponse, METHOD_INTROSPECT, METHOD_PROPERTIES_GET,
    METHOD_PROPERTIES_SET, METHOD_SIGNALS_SUBSCRIBE,
};
use crate::config::BusConfig;
use crate::error::{EchoBusError, Result};
use serde_json::Value;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

/// A signal as observed by a subscribed client.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedSignal {
    pub name: String,
    pub payload: Vec<Value>,
}

/// Client side of the bus transport.
#[derive(Debug)]
pub struct BusClient {
    stream: Mutex<TcpStream>,
    pending_signals: Mutex<VecDeque<ReceivedSignal>>,
    addr: SocketAddr,
    next_id: AtomicU64,
}

impl BusClient {
    /// Connect to a service endpoint, bounded by the configured connect
    /// timeout.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = tokio::time::timeout(BusConfig::CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| EchoBusError::Io {
                message: format!("timed out connecting to {}", addr),
                source: None,
            })?
            .map_err(|e| EchoBusError::Io {
                message: format!("failed to connect to {}: {}", addr, e),
                source: Some(e),
            })?;

        debug!("connected to bus endpoint {}", addr);

        Ok(Self {
            stream: Mutex::new(stream),
            pending_signals: Mutex::new(VecDeque::new()),
            addr,
            next_id: AtomicU64::new(1),
        })
    }

    /// Call a method and return its result value.
    ///
    /// A structured error response from the service surfaces as
    /// [`EchoBusError::Remote`] with the original code and message.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.request(method, Value::Array(args)).await
    }

    /// Read a property.
    pub async fn get_property(&self, name: &str) -> Result<Value> {
        self.request(METHOD_PROPERTIES_GET, serde_json::json!([name]))
            .await
    }

    /// Write a property.
    pub async fn set_property(&self, name: &str, value: Value) -> Result<()> {
        self.request(METHOD_PROPERTIES_SET, serde_json::json!([name, value]))
            .await
            .map(|_| ())
    }

    /// Fetch the service's description of its registered surface.
    pub async fn introspect(&self) -> Result<Value> {
        self.request(METHOD_INTROSPECT, serde_json::json!([])).await
    }

    /// Start receiving signals on this connection.
    pub async fn subscribe(&self) -> Result<()> {
        self.request(METHOD_SIGNALS_SUBSCRIBE, serde_json::json!([]))
            .await
            .map(|_| ())
    }

    /// Next signal notification.
    ///
    /// Returns a buffered signal if one arrived interleaved with an earlier
    /// call, otherwise blocks on the stream. Returns `None` when the
    /// connection closes.
    pub async fn next_signal(&self) -> Result<Option<ReceivedSignal>> {
        if let Some(signal) = self.pending_signals.lock().await.pop_front() {
            return Ok(Some(signal));
        }

        let mut stream = self.stream.lock().await;
        loop {
            let (mut reader, _) = stream.split();
            let Some(frame) = read_frame(&mut reader).await? else {
                return Ok(None);
            };
            if let Some(signal) = parse_signal(&frame) {
                return Ok(Some(signal));
            }
            // A response frame with no call waiting for it; drop it.
            debug!("discarding non-signal frame while waiting for signals");
        }
    }

    /// The address of the connected endpoint.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = BusRequest::new(method, params, id);
        let request_bytes = serde_json::to_vec(&request)?;

        let mut stream = self.stream.lock().await;
        let (mut reader, mut writer) = stream.split();

        write_frame(&mut writer, &request_bytes).await?;

        // Signal notifications may arrive before our response; buffer them.
        loop {
            let frame = read_frame(&mut reader)
                .await?
                .ok_or_else(|| EchoBusError::Io {
                    message: format!("connection to {} closed mid-call", self.addr),
                    source: None,
                })?;

            if let Some(signal) = parse_signal(&frame) {
                self.pending_signals.lock().await.push_back(signal);
                continue;
            }

            let response: BusResponse =
                serde_json::from_slice(&frame).map_err(|e| EchoBusError::Json {
                    message: format!("failed to parse response: {}", e),
                    source: Some(e),
                })?;

            if let Some(err) = response.error {
                return Err(EchoBusError::Remote {
                    code: err.code,
                    message: err.message,
                });
            }

            return response.result.ok_or_else(|| EchoBusError::Json {
                message: "response missing result".to_string(),
                source: None,
            });
        }
    }
}

/// Parse a frame as a signal notification, or `None` if it is a response.
fn parse_signal(frame: &[u8]) -> Option<ReceivedSignal> {
    let value: Value = serde_json::from_slice(frame).ok()?;
    if value.get("method")?.as_str()? != super::protocol::NOTIFICATION_SIGNAL {
        return None;
    }
    let params = value.get("params")?;
    Some(ReceivedSignal {
        name: params.get("name")?.as_str()?.to_string(),
        payload: params.get("payload")?.as_array()?.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::server::{BusServer, InboundCall, InboundRequest};
    use tokio::sync::{broadcast, mpsc};

    fn spawn_echo_loop() -> mpsc::Sender<InboundCall> {
        let (tx, mut rx) = mpsc::channel::<InboundCall>(8);
        tokio::spawn(async move {
            while let Some(call) = rx.recv().await {
                let result = match call.request {
                    InboundRequest::Call { method, args } if method == "fail" => {
                        Err(EchoBusError::UnknownMethod { name: format!("{:?}", args) })
                    }
                    InboundRequest::Call { args, .. } => Ok(Value::Array(args)),
                    InboundRequest::GetProperty { name } => Ok(Value::String(name)),
                    InboundRequest::SetProperty { .. } => Ok(Value::Null),
                    InboundRequest::Introspect => Ok(serde_json::json!({"methods": []})),
                };
                let _ = call.reply.send(result);
            }
        });
        tx
    }

    #[tokio::test]
    async fn test_call_success() {
        let inbound = spawn_echo_loop();
        let (signals, _) = broadcast::channel(8);
        let mut handle = BusServer::publish("org.test.Echo", "127.0.0.1", 0, inbound, signals)
            .await
            .unwrap();

        let client = BusClient::connect(handle.addr()).await.unwrap();
        let result = client
            .call("echo", vec![serde_json::json!("hi")])
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!(["hi"]));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_remote_error_carries_code() {
        let inbound = spawn_echo_loop();
        let (signals, _) = broadcast::channel(8);
        let mut handle = BusServer::publish("org.test.Echo", "127.0.0.1", 0, inbound, signals)
            .await
            .unwrap();

        let client = BusClient::connect(handle.addr()).await.unwrap();
        match client.call("fail", vec![]).await {
            Err(EchoBusError::Remote { code, .. }) => assert_eq!(code, -32601),
            other => panic!("Expected Remote error, got: {:?}", other),
        }

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_connect_to_dead_endpoint_fails() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let result = BusClient::connect(addr).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_client_detects_server_shutdown() {
        let inbound = spawn_echo_loop();
        let (signals, _) = broadcast::channel(8);
        let mut handle = BusServer::publish("org.test.Echo", "127.0.0.1", 0, inbound, signals)
            .await
            .unwrap();

        let client = BusClient::connect(handle.addr()).await.unwrap();
        assert!(client.call("echo", vec![]).await.is_ok());

        handle.shutdown();

        // Retry until the endpoint is fully closed (up to 1s)
        let mut detected_shutdown = false;
        for _ in 0..20 {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            if client.call("echo", vec![]).await.is_err() {
                detected_shutdown = true;
                break;
            }
        }
        assert!(detected_shutdown, "Client should detect endpoint shutdown");
    }
}
