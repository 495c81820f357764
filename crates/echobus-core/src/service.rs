//! Service lifecycle controller.
//!
//! Owns the published identity, the exposed object, and the serial
//! dispatch loop. State machine:
//!
//! ```text
//! Unregistered -> Registered -> Running -> Stopped
//! ```
//!
//! `start` is the only place that talks to the transport; `run` blocks
//! consuming the inbound queue one call at a time until the shutdown token
//! is marked (by `Quit`, or by whatever the binary wires to it, such as
//! Ctrl-C); `stop` unpublishes and is idempotent.

use crate::bus::server::{BusServer, BusServerHandle, InboundCall, InboundRequest};
use crate::config::{BusConfig, ServiceConfig};
use crate::error::{EchoBusError, Result};
use crate::object::ServiceObject;
use crate::shutdown::ShutdownToken;
use crate::wire::WireValue;
use serde_json::Value;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Lifecycle states of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Unregistered,
    Registered,
    Running,
    Stopped,
}

/// The published identity other processes resolve while the service is
/// alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    pub service_name: String,
    pub object_path: String,
    pub interface_name: String,
}

impl ServiceHandle {
    fn from_config(config: &ServiceConfig) -> Self {
        Self {
            service_name: config.service_name.clone(),
            object_path: config.object_path.clone(),
            interface_name: config.interface_name.clone(),
        }
    }
}

/// A service: one exposed object plus the machinery to publish and drive
/// it.
pub struct Service {
    config: ServiceConfig,
    object: ServiceObject,
    state: ServiceState,
    shutdown: ShutdownToken,
    inbound_tx: mpsc::Sender<InboundCall>,
    inbound_rx: Option<mpsc::Receiver<InboundCall>>,
    handle: Option<ServiceHandle>,
    bus: Option<BusServerHandle>,
}

impl Service {
    /// Create an unregistered service around an object.
    pub fn new(config: ServiceConfig, object: ServiceObject) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(BusConfig::INBOUND_QUEUE_CAPACITY);
        Self {
            config,
            object,
            state: ServiceState::Unregistered,
            shutdown: ShutdownToken::new(),
            inbound_tx,
            inbound_rx: Some(inbound_rx),
            handle: None,
            bus: None,
        }
    }

    /// Publish the service on the bus and enter `Running`.
    ///
    /// Returns the bound endpoint address. Fails with `Registration` (and
    /// stays out of `Running`) if the endpoint cannot be published, or if
    /// the service was already started.
    pub async fn start(&mut self, host: &str, port: u16) -> Result<SocketAddr> {
        if self.state != ServiceState::Unregistered {
            return Err(EchoBusError::Registration {
                service: self.config.service_name.clone(),
                message: format!("cannot start from state {:?}", self.state),
            });
        }

        let bus = BusServer::publish(
            &self.config.service_name,
            host,
            port,
            self.inbound_tx.clone(),
            self.object.signal_sender(),
        )
        .await?;
        let addr = bus.addr();

        self.handle = Some(ServiceHandle::from_config(&self.config));
        self.bus = Some(bus);
        self.state = ServiceState::Registered;
        info!(
            "registered {} at {} ({})",
            self.config.service_name, self.config.object_path, addr
        );

        self.state = ServiceState::Running;
        Ok(addr)
    }

    /// Block processing inbound calls until shutdown is requested.
    ///
    /// Calls are taken from the queue one at a time and run to completion;
    /// the shutdown marker is only checked between calls, so `Quit` never
    /// interrupts the call that carried it. Ends in `Stopped`.
    pub async fn run(&mut self) -> Result<()> {
        if self.state != ServiceState::Running {
            return Err(EchoBusError::Registration {
                service: self.config.service_name.clone(),
                message: format!("cannot run from state {:?}", self.state),
            });
        }
        let mut inbound_rx = self.inbound_rx.take().ok_or_else(|| EchoBusError::Registration {
            service: self.config.service_name.clone(),
            message: "dispatch loop already consumed".to_string(),
        })?;

        info!("{} entering dispatch loop", self.config.service_name);
        let shutdown = self.shutdown.clone();
        loop {
            if shutdown.is_requested() {
                break;
            }
            tokio::select! {
                _ = shutdown.wait() => break,
                call = inbound_rx.recv() => match call {
                    Some(call) => self.handle_call(call),
                    // Endpoint gone; nothing more can arrive
                    None => break,
                },
            }
        }

        self.stop();
        Ok(())
    }

    /// Unpublish and enter `Stopped`. Calling again is a no-op.
    pub fn stop(&mut self) {
        if self.state == ServiceState::Stopped {
            return;
        }
        if let Some(mut bus) = self.bus.take() {
            bus.shutdown();
        }
        self.handle = None;
        self.state = ServiceState::Stopped;
        info!("{} stopped", self.config.service_name);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// The published identity, while the service is alive.
    pub fn handle(&self) -> Option<&ServiceHandle> {
        self.handle.as_ref()
    }

    /// Token marking this service for shutdown; clone it to wire external
    /// termination (such as Ctrl-C) to the same path `Quit` takes.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Loopback sender into the inbound queue, bypassing the transport.
    /// Used by in-process callers and tests.
    pub fn local_sender(&self) -> mpsc::Sender<InboundCall> {
        self.inbound_tx.clone()
    }

    /// Serve one inbound request to completion and answer it.
    fn handle_call(&mut self, call: InboundCall) {
        let result = match call.request {
            InboundRequest::Call { method, args } => self
                .object
                .dispatch(&self.shutdown, &method, &args)
                .map(outputs_to_json),
            InboundRequest::GetProperty { name } => {
                self.object.get_property(&name).map(|v| v.to_json())
            }
            InboundRequest::SetProperty { name, value } => self
                .object
                .set_property(&name, &value)
                .map(|()| Value::Null),
            InboundRequest::Introspect => Ok(self.object.introspect()),
        };
        // A closed reply channel means the caller's connection went away
        // mid-call; the loop keeps serving.
        if call.reply.send(result).is_err() {
            debug!("caller disappeared before reply");
        }
    }
}

fn outputs_to_json(outputs: Vec<WireValue>) -> Value {
    Value::Array(outputs.iter().map(WireValue::to_json).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::client::BusClient;
    use crate::dispatch::MethodDescriptor;
    use crate::wire::WireKind;

    fn quit_only_object() -> ServiceObject {
        let mut object = ServiceObject::new();
        object
            .register_method(MethodDescriptor::new(
                "Quit",
                vec![],
                vec![],
                Box::new(|ctx, _args| {
                    ctx.request_shutdown();
                    Ok(vec![])
                }),
            ))
            .unwrap();
        object
            .register_method(MethodDescriptor::new(
                "s",
                vec![WireKind::String],
                vec![WireKind::String],
                Box::new(|_ctx, args| Ok(args)),
            ))
            .unwrap();
        object
    }

    fn config() -> ServiceConfig {
        ServiceConfig::new("org.test.Echo", "/org/test/Echo", "org.test.Echo").unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle_states() {
        let mut service = Service::new(config(), quit_only_object());
        assert_eq!(service.state(), ServiceState::Unregistered);
        assert!(service.handle().is_none());

        service.start("127.0.0.1", 0).await.unwrap();
        assert_eq!(service.state(), ServiceState::Running);
        assert_eq!(
            service.handle().unwrap().service_name,
            "org.test.Echo"
        );

        service.stop();
        assert_eq!(service.state(), ServiceState::Stopped);
        assert!(service.handle().is_none());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut service = Service::new(config(), quit_only_object());
        service.start("127.0.0.1", 0).await.unwrap();

        service.stop();
        assert_eq!(service.state(), ServiceState::Stopped);
        // Second stop is a no-op, not an error
        service.stop();
        assert_eq!(service.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_start_twice_is_registration_error() {
        let mut service = Service::new(config(), quit_only_object());
        service.start("127.0.0.1", 0).await.unwrap();

        let result = service.start("127.0.0.1", 0).await;
        assert!(matches!(result, Err(EchoBusError::Registration { .. })));
    }

    #[tokio::test]
    async fn test_run_without_start_is_error() {
        let mut service = Service::new(config(), quit_only_object());
        assert!(matches!(
            service.run().await,
            Err(EchoBusError::Registration { .. })
        ));
    }

    #[tokio::test]
    async fn test_quit_stops_the_loop() {
        let mut service = Service::new(config(), quit_only_object());
        let addr = service.start("127.0.0.1", 0).await.unwrap();

        let join = tokio::spawn(async move {
            service.run().await.unwrap();
            service
        });

        let client = BusClient::connect(addr).await.unwrap();
        client.call("Quit", vec![]).await.unwrap();

        let service = join.await.unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_external_termination_stops_the_loop() {
        let mut service = Service::new(config(), quit_only_object());
        service.start("127.0.0.1", 0).await.unwrap();
        let token = service.shutdown_token();

        let join = tokio::spawn(async move {
            service.run().await.unwrap();
            service
        });

        token.request();
        let service = join.await.unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_failed_call_does_not_stop_the_loop() {
        let mut service = Service::new(config(), quit_only_object());
        let addr = service.start("127.0.0.1", 0).await.unwrap();
        let join = tokio::spawn(async move {
            service.run().await.unwrap();
            service
        });

        let client = BusClient::connect(addr).await.unwrap();
        // A failing call is answered with a structured error
        assert!(client.call("nonexistent", vec![]).await.is_err());
        // ...and the loop keeps serving
        let result = client
            .call("s", vec![serde_json::json!("still alive")])
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!(["still alive"]));

        client.call("Quit", vec![]).await.unwrap();
        let service = join.await.unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
    }
}
