//! Bus server: the transport endpoint a published service listens on.
//!
//! Accepts local TCP connections and forwards their requests, one
//! [`InboundCall`] at a time, into the service's single inbound queue. The
//! dispatch loop answers through a oneshot channel per call, so connection
//! tasks may be concurrent while the object itself is driven strictly
//! serially.
//!
//! Each connection gets a dedicated writer task owning the write half of
//! the socket; response frames and signal notification frames are pushed
//! through one outgoing queue so they never interleave on the wire.

use super::protocol::{
    read_frame, write_frame, BusRequest, BusResponse, METHOD_INTROSPECT, METHOD_PROPERTIES_GET,
    METHOD_PROPERTIES_SET, METHOD_SIGNALS_SUBSCRIBE, NOTIFICATION_SIGNAL,
};
use crate::config::BusConfig;
use crate::error::{EchoBusError, Result};
use crate::signal::SignalEvent;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A request as the dispatch loop sees it, with the transport's reserved
/// method names already resolved.
#[derive(Debug)]
pub enum InboundRequest {
    Call { method: String, args: Vec<Value> },
    GetProperty { name: String },
    SetProperty { name: String, value: Value },
    Introspect,
}

/// One inbound request plus the channel its answer travels back on.
#[derive(Debug)]
pub struct InboundCall {
    pub request: InboundRequest,
    pub reply: oneshot::Sender<Result<Value>>,
}

/// Handle to a running bus endpoint. Dropping shuts down the endpoint.
pub struct BusServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<JoinHandle<()>>,
}

impl BusServerHandle {
    /// The address the endpoint is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and signal all active connection
    /// handlers to close.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
    }
}

impl Drop for BusServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Bus endpoint listener.
pub struct BusServer;

impl BusServer {
    /// Publish a service endpoint.
    ///
    /// Binds `host:port` (port 0 = OS-assigned) and starts the accept loop
    /// in a background task. A bind failure (such as the port already being
    /// taken) is a `Registration` error and nothing is published.
    pub async fn publish(
        service_name: &str,
        host: &str,
        port: u16,
        inbound: mpsc::Sender<InboundCall>,
        signals: broadcast::Sender<SignalEvent>,
    ) -> Result<BusServerHandle> {
        let bind_addr = format!("{}:{}", host, port);
        let listener =
            TcpListener::bind(&bind_addr)
                .await
                .map_err(|e| EchoBusError::Registration {
                    service: service_name.to_string(),
                    message: format!("failed to bind {}: {}", bind_addr, e),
                })?;
        let addr = listener
            .local_addr()
            .map_err(|e| EchoBusError::Registration {
                service: service_name.to_string(),
                message: e.to_string(),
            })?;

        info!("bus endpoint for {} listening on {}", service_name, addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        let active_connections = Arc::new(AtomicUsize::new(0));

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            inbound,
            signals,
            shutdown_rx,
            conn_shutdown_rx,
            active_connections,
        ));

        Ok(BusServerHandle {
            addr,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop(
        listener: TcpListener,
        inbound: mpsc::Sender<InboundCall>,
        signals: broadcast::Sender<SignalEvent>,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
        active_connections: Arc<AtomicUsize>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("bus endpoint shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let current = active_connections.load(Ordering::Relaxed);
                            if current >= BusConfig::MAX_CONNECTIONS {
                                warn!(
                                    "rejecting connection from {}: at max capacity ({})",
                                    peer_addr,
                                    BusConfig::MAX_CONNECTIONS
                                );
                                continue;
                            }

                            active_connections.fetch_add(1, Ordering::Relaxed);
                            let inbound = inbound.clone();
                            let signals = signals.clone();
                            let conns = active_connections.clone();
                            let conn_shutdown = conn_shutdown_rx.clone();

                            tokio::spawn(async move {
                                debug!("connection from {}", peer_addr);
                                if let Err(e) =
                                    Self::handle_connection(stream, inbound, signals, conn_shutdown).await
                                {
                                    debug!("connection {} ended: {}", peer_addr, e);
                                }
                                conns.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("accept error: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        inbound: mpsc::Sender<InboundCall>,
        signals: broadcast::Sender<SignalEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        let (outgoing_tx, mut outgoing_rx) =
            mpsc::channel::<Vec<u8>>(BusConfig::OUTGOING_QUEUE_CAPACITY);

        // Sole owner of the write half; exits when every sender is gone.
        let writer_task = tokio::spawn(async move {
            while let Some(frame) = outgoing_rx.recv().await {
                if write_frame(&mut writer, &frame).await.is_err() {
                    break;
                }
            }
        });

        let mut forwarder: Option<JoinHandle<()>> = None;

        let result = loop {
            let frame = tokio::select! {
                result = read_frame(&mut reader) => match result {
                    Ok(Some(f)) => f,
                    Ok(None) => break Ok(()), // clean disconnect
                    Err(e) => break Err(e),
                },
                _ = shutdown_rx.changed() => break Ok(()),
            };

            let response = match serde_json::from_slice::<BusRequest>(&frame) {
                Err(e) => Some(BusResponse::error(
                    None,
                    -32700,
                    format!("Parse error: {}", e),
                )),
                Ok(request) => {
                    Self::process_request(request, &inbound, &signals, &outgoing_tx, &mut forwarder)
                        .await
                }
            };

            if let Some(response) = response {
                match serde_json::to_vec(&response) {
                    Ok(bytes) => {
                        if outgoing_tx.send(bytes).await.is_err() {
                            break Ok(());
                        }
                    }
                    Err(e) => break Err(e.into()),
                }
            }
        };

        if let Some(f) = forwarder {
            f.abort();
        }
        // Close the outgoing queue so the writer drains pending frames and
        // exits before the socket is dropped.
        drop(outgoing_tx);
        let _ = writer_task.await;

        result
    }

    async fn process_request(
        request: BusRequest,
        inbound: &mpsc::Sender<InboundCall>,
        signals: &broadcast::Sender<SignalEvent>,
        outgoing_tx: &mpsc::Sender<Vec<u8>>,
        forwarder: &mut Option<JoinHandle<()>>,
    ) -> Option<BusResponse> {
        if request.jsonrpc != "2.0" {
            return Some(BusResponse::error(
                request.id,
                -32600,
                "Invalid Request: expected jsonrpc 2.0".to_string(),
            ));
        }

        let id = request.id;
        let params = request.params.unwrap_or(Value::Array(Vec::new()));

        if request.method == METHOD_SIGNALS_SUBSCRIBE {
            // Subscription starts at this point in time; events emitted
            // earlier are not replayed.
            if forwarder.is_none() {
                let rx = signals.subscribe();
                *forwarder = Some(tokio::spawn(forward_signals(rx, outgoing_tx.clone())));
            }
            return Some(BusResponse::success(id, Value::Bool(true)));
        }

        let inbound_request = match build_inbound_request(&request.method, params) {
            Ok(r) => r,
            Err(e) => return Some(BusResponse::from_error(id, &e)),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let call = InboundCall {
            request: inbound_request,
            reply: reply_tx,
        };
        if inbound.send(call).await.is_err() {
            return Some(BusResponse::error(id, -32603, "service stopped".to_string()));
        }

        match reply_rx.await {
            Ok(Ok(value)) => Some(BusResponse::success(id, value)),
            Ok(Err(e)) => Some(BusResponse::from_error(id, &e)),
            Err(_) => Some(BusResponse::error(id, -32603, "service stopped".to_string())),
        }
    }
}

/// Map a wire method name onto the loop's request shape.
fn build_inbound_request(method: &str, params: Value) -> Result<InboundRequest> {
    match method {
        METHOD_PROPERTIES_GET => {
            let name = params
                .get(0)
                .and_then(Value::as_str)
                .ok_or_else(|| EchoBusError::Validation {
                    expected: "string".to_string(),
                    message: format!("{} expects [name]", METHOD_PROPERTIES_GET),
                    index: Some(0),
                })?;
            Ok(InboundRequest::GetProperty {
                name: name.to_string(),
            })
        }
        METHOD_PROPERTIES_SET => {
            let name = params
                .get(0)
                .and_then(Value::as_str)
                .ok_or_else(|| EchoBusError::Validation {
                    expected: "string".to_string(),
                    message: format!("{} expects [name, value]", METHOD_PROPERTIES_SET),
                    index: Some(0),
                })?;
            let value = params.get(1).cloned().ok_or_else(|| EchoBusError::Validation {
                expected: "value".to_string(),
                message: format!("{} expects [name, value]", METHOD_PROPERTIES_SET),
                index: Some(1),
            })?;
            Ok(InboundRequest::SetProperty {
                name: name.to_string(),
                value,
            })
        }
        METHOD_INTROSPECT => Ok(InboundRequest::Introspect),
        other => {
            let args = match params {
                Value::Array(args) => args,
                Value::Null => Vec::new(),
                _ => {
                    return Err(EchoBusError::Validation {
                        expected: "array".to_string(),
                        message: "params must be an array of arguments".to_string(),
                        index: None,
                    })
                }
            };
            Ok(InboundRequest::Call {
                method: other.to_string(),
                args,
            })
        }
    }
}

/// Push every broadcast signal into one connection's outgoing queue as a
/// notification frame. Ends when the emitter or the connection goes away.
async fn forward_signals(mut rx: broadcast::Receiver<SignalEvent>, tx: mpsc::Sender<Vec<u8>>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let params = match serde_json::to_value(&event) {
                    Ok(p) => p,
                    Err(e) => {
                        error!("failed to encode signal {}: {}", event.name, e);
                        continue;
                    }
                };
                let frame = BusRequest::notification(NOTIFICATION_SIGNAL, params);
                let bytes = match serde_json::to_vec(&frame) {
                    Ok(b) => b,
                    Err(e) => {
                        error!("failed to encode signal frame: {}", e);
                        continue;
                    }
                };
                if tx.send(bytes).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("signal subscriber lagged; {} event(s) dropped", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
