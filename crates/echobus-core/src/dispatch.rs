//! Method dispatcher: routes one inbound call to its registered handler
//! and produces a validated response.
//!
//! Dispatch is five steps: look the method up, check arity, validate each
//! argument against the declared input kinds, invoke the handler, and
//! validate the handler's outputs against the declared output kinds. A
//! handler failure is wrapped in `EchoBusError::Handler` with the cause
//! preserved — dispatch never suppresses it, and a failed call never takes
//! the loop down.

use crate::error::{EchoBusError, Result};
use crate::shutdown::ShutdownToken;
use crate::signal::SignalEmitter;
use crate::wire::{WireKind, WireValue};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Error type handlers may fail with; the cause survives into
/// `EchoBusError::Handler`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A registered method handler.
///
/// Inputs are already validated against the descriptor when the handler
/// runs. The [`CallContext`] gives handlers access to the signal emitter
/// and the shutdown token, mirroring how a bus adaptor hands its callbacks
/// the connection for emitting signals.
pub type MethodHandler =
    Box<dyn Fn(&CallContext<'_>, Vec<WireValue>) -> std::result::Result<Vec<WireValue>, HandlerError> + Send + Sync>;

/// What a handler can reach while a call is in flight.
pub struct CallContext<'a> {
    emitter: &'a SignalEmitter,
    shutdown: &'a ShutdownToken,
}

impl<'a> CallContext<'a> {
    pub fn new(emitter: &'a SignalEmitter, shutdown: &'a ShutdownToken) -> Self {
        Self { emitter, shutdown }
    }

    /// Emit a registered signal. Completes (or fails) before the enclosing
    /// dispatch returns.
    pub fn emit(&self, name: &str, payload: Vec<WireValue>) -> Result<()> {
        self.emitter.emit(name, payload)
    }

    /// Mark the service for shutdown. The dispatch loop observes the marker
    /// between calls, so the current call still completes normally.
    pub fn request_shutdown(&self) {
        self.shutdown.request();
    }
}

/// A method's registration: name, signature, and handler.
pub struct MethodDescriptor {
    pub name: String,
    pub inputs: Vec<WireKind>,
    pub outputs: Vec<WireKind>,
    handler: MethodHandler,
}

impl MethodDescriptor {
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<WireKind>,
        outputs: Vec<WireKind>,
        handler: MethodHandler,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            handler,
        }
    }
}

/// The method registry for one exposed object.
///
/// Populated once at construction, immutable afterwards.
#[derive(Default)]
pub struct MethodTable {
    methods: HashMap<String, MethodDescriptor>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method. Fails if a method of the same name already
    /// exists.
    pub fn register(&mut self, descriptor: MethodDescriptor) -> Result<()> {
        if self.methods.contains_key(&descriptor.name) {
            return Err(EchoBusError::DuplicateMethod {
                name: descriptor.name,
            });
        }
        self.methods.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Registered descriptors, for introspection.
    pub fn descriptors(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.methods.values()
    }

    /// Dispatch one call: validate, invoke, validate the result.
    pub fn dispatch(
        &self,
        ctx: &CallContext<'_>,
        method: &str,
        raw_args: &[Value],
    ) -> Result<Vec<WireValue>> {
        let descriptor = self.methods.get(method).ok_or_else(|| {
            warn!("method not found: {}", method);
            EchoBusError::UnknownMethod {
                name: method.to_string(),
            }
        })?;

        if raw_args.len() != descriptor.inputs.len() {
            return Err(EchoBusError::Arity {
                method: method.to_string(),
                expected: descriptor.inputs.len(),
                got: raw_args.len(),
            });
        }

        let mut args = Vec::with_capacity(raw_args.len());
        for (i, (raw, kind)) in raw_args.iter().zip(&descriptor.inputs).enumerate() {
            args.push(kind.coerce(raw).map_err(|e| e.at_index(i))?);
        }

        debug!("dispatch {}({} arg(s))", method, args.len());

        let outputs = (descriptor.handler)(ctx, args).map_err(|source| EchoBusError::Handler {
            method: method.to_string(),
            source,
        })?;

        // A conforming handler never fails this; it exists to catch handler
        // bugs deterministically.
        if outputs.len() != descriptor.outputs.len() {
            return Err(EchoBusError::Handler {
                method: method.to_string(),
                source: format!(
                    "declared {} output(s), returned {}",
                    descriptor.outputs.len(),
                    outputs.len()
                )
                .into(),
            });
        }
        for (i, (value, kind)) in outputs.iter().zip(&descriptor.outputs).enumerate() {
            value.expect_kind(*kind).map_err(|e| e.at_index(i))?;
        }

        Ok(outputs)
    }
}
