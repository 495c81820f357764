//! Signal emitter: fire-and-forget broadcast of named, typed events.
//!
//! Built on `tokio::sync::broadcast`. Emission validates the payload
//! against the registered descriptor, then attempts delivery to however
//! many subscribers currently exist — zero is fine, there is no
//! acknowledgment and no replay.

use crate::config::BusConfig;
use crate::error::{EchoBusError, Result};
use crate::wire::{WireKind, WireValue};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::debug;

/// A registered signal: name plus the payload kinds it carries.
#[derive(Debug, Clone)]
pub struct SignalDescriptor {
    pub name: String,
    pub payload: Vec<WireKind>,
}

impl SignalDescriptor {
    pub fn new(name: impl Into<String>, payload: Vec<WireKind>) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// One emitted signal, as fanned out to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct SignalEvent {
    pub name: String,
    pub payload: Vec<WireValue>,
}

/// Validates and broadcasts signals to current subscribers.
pub struct SignalEmitter {
    signals: HashMap<String, SignalDescriptor>,
    sender: broadcast::Sender<SignalEvent>,
}

impl SignalEmitter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BusConfig::SIGNAL_CHANNEL_CAPACITY);
        Self {
            signals: HashMap::new(),
            sender,
        }
    }

    /// Register a signal descriptor. Registering the same name again
    /// replaces the previous descriptor.
    pub fn register(&mut self, descriptor: SignalDescriptor) {
        self.signals.insert(descriptor.name.clone(), descriptor);
    }

    /// Registered descriptors, for introspection.
    pub fn descriptors(&self) -> impl Iterator<Item = &SignalDescriptor> {
        self.signals.values()
    }

    /// Emit a signal to all current subscribers.
    ///
    /// The payload is validated against the registered descriptor before
    /// anything is sent. Delivery is fire-and-forget: no subscribers is not
    /// an error, and this returns once the broadcast send has been
    /// attempted.
    pub fn emit(&self, name: &str, payload: Vec<WireValue>) -> Result<()> {
        let descriptor = self
            .signals
            .get(name)
            .ok_or_else(|| EchoBusError::UnknownSignal {
                name: name.to_string(),
            })?;

        if payload.len() != descriptor.payload.len() {
            return Err(EchoBusError::Validation {
                expected: descriptor
                    .payload
                    .iter()
                    .map(WireKind::signature)
                    .collect::<Vec<_>>()
                    .join(""),
                message: format!(
                    "signal {} carries {} value(s), got {}",
                    name,
                    descriptor.payload.len(),
                    payload.len()
                ),
                index: None,
            });
        }
        for (i, (value, kind)) in payload.iter().zip(&descriptor.payload).enumerate() {
            value.expect_kind(*kind).map_err(|e| e.at_index(i))?;
        }

        let receivers = self.sender.receiver_count();
        // Err here only means no subscribers; fire-and-forget
        let _ = self.sender.send(SignalEvent {
            name: name.to_string(),
            payload,
        });
        debug!("signal {} emitted to {} subscriber(s)", name, receivers);
        Ok(())
    }

    /// Subscribe to all signals emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SignalEvent> {
        self.sender.subscribe()
    }

    /// Handle the bus server uses to create subscriptions per connection.
    pub fn sender(&self) -> broadcast::Sender<SignalEvent> {
        self.sender.clone()
    }
}

impl Default for SignalEmitter {
    fn default() -> Self {
        Self::new()
    }
}
