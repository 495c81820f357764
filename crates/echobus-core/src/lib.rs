//! Echobus - a typed IPC echo service for exercising bus clients.
//!
//! This crate is the core of a small test double: it publishes one object
//! on a local bus endpoint, dispatches typed method calls to registered
//! handlers, validates every value that crosses the wire against a closed
//! set of wire kinds, emits broadcast signals, exposes typed properties,
//! and shuts down cleanly on `Quit`.
//!
//! # Example
//!
//! ```rust,ignore
//! use echobus::{echo_object, Service, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> echobus::Result<()> {
//!     let config = ServiceConfig::new(
//!         "org.echobus.EchoServer",
//!         "/org/echobus/EchoServer",
//!         "org.echobus.EchoServer",
//!     )?;
//!     let mut service = Service::new(config, echo_object()?);
//!     let addr = service.start("127.0.0.1", 0).await?;
//!     println!("listening on {}", addr);
//!
//!     // Blocks until Quit() is called over the bus
//!     service.run().await
//! }
//! ```

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod echo;
pub mod error;
pub mod object;
pub mod property;
pub mod service;
pub mod shutdown;
pub mod signal;
pub mod wire;

// Re-export commonly used types
pub use bus::{BusClient, ReceivedSignal};
pub use config::{BusConfig, ServiceConfig};
pub use dispatch::{CallContext, HandlerError, MethodDescriptor, MethodTable};
pub use echo::{echo_object, FOO_SIGNAL, PROPERTY_S, PROPERTY_S_INITIAL};
pub use error::{EchoBusError, Result};
pub use object::ServiceObject;
pub use property::{PropertyAccess, PropertyDescriptor, PropertyStore};
pub use service::{Service, ServiceHandle, ServiceState};
pub use shutdown::ShutdownToken;
pub use signal::{SignalDescriptor, SignalEmitter, SignalEvent};
pub use wire::{WireKind, WireValue, ALL_KINDS};
