//! The supplied bus transport: framed JSON over local TCP.
//!
//! This module plays the role of the external bus library the service
//! publishes itself on. The service core never touches sockets directly;
//! it sees only the [`server::InboundCall`] queue the endpoint feeds and
//! the broadcast channel it drains signals from.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{BusClient, ReceivedSignal};
pub use server::{BusServer, BusServerHandle, InboundCall, InboundRequest};
