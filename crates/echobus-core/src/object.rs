//! The exposed object: method table, signal emitter, and property store
//! composed behind one registration and dispatch surface.
//!
//! An object is populated once (methods, signals, properties) and then
//! handed to the lifecycle controller, which drives it from the serial
//! dispatch loop.

use crate::dispatch::{CallContext, MethodDescriptor, MethodTable};
use crate::error::Result;
use crate::property::{PropertyDescriptor, PropertyStore};
use crate::shutdown::ShutdownToken;
use crate::signal::{SignalDescriptor, SignalEmitter, SignalEvent};
use crate::wire::{WireKind, WireValue};
use serde_json::{json, Value};
use tokio::sync::broadcast;

/// One addressable object: everything a caller can reach through the bus.
#[derive(Default)]
pub struct ServiceObject {
    methods: MethodTable,
    signals: SignalEmitter,
    properties: PropertyStore,
}

impl ServiceObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method. Fails on duplicate names.
    pub fn register_method(&mut self, descriptor: MethodDescriptor) -> Result<()> {
        self.methods.register(descriptor)
    }

    /// Register a signal the object may emit.
    pub fn register_signal(&mut self, descriptor: SignalDescriptor) {
        self.signals.register(descriptor);
    }

    /// Register a property with its initial value.
    pub fn register_property(
        &mut self,
        descriptor: PropertyDescriptor,
        initial: WireValue,
    ) -> Result<()> {
        self.properties.register(descriptor, initial)
    }

    /// Dispatch one method call against this object.
    pub fn dispatch(
        &self,
        shutdown: &ShutdownToken,
        method: &str,
        raw_args: &[Value],
    ) -> Result<Vec<WireValue>> {
        let ctx = CallContext::new(&self.signals, shutdown);
        self.methods.dispatch(&ctx, method, raw_args)
    }

    /// Read a property.
    pub fn get_property(&self, name: &str) -> Result<WireValue> {
        self.properties.get(name)
    }

    /// Write a property from its raw wire form.
    pub fn set_property(&mut self, name: &str, raw: &Value) -> Result<()> {
        self.properties.set(name, raw)
    }

    /// Subscription handle for the bus server's signal fan-out.
    pub fn signal_sender(&self) -> broadcast::Sender<SignalEvent> {
        self.signals.sender()
    }

    /// Subscribe directly, bypassing the bus. Used by in-process callers
    /// and tests.
    pub fn subscribe_signals(&self) -> broadcast::Receiver<SignalEvent> {
        self.signals.subscribe()
    }

    /// JSON description of the registered surface, sorted by name so the
    /// output is deterministic.
    pub fn introspect(&self) -> Value {
        let mut methods: Vec<Value> = self
            .methods
            .descriptors()
            .map(|d| {
                json!({
                    "name": d.name,
                    "inputs": d.inputs.iter().map(WireKind::signature).collect::<Vec<_>>(),
                    "outputs": d.outputs.iter().map(WireKind::signature).collect::<Vec<_>>(),
                })
            })
            .collect();
        methods.sort_by_key(|m| m["name"].as_str().map(String::from));

        let mut signals: Vec<Value> = self
            .signals
            .descriptors()
            .map(|d| {
                json!({
                    "name": d.name,
                    "payload": d.payload.iter().map(WireKind::signature).collect::<Vec<_>>(),
                })
            })
            .collect();
        signals.sort_by_key(|s| s["name"].as_str().map(String::from));

        let mut properties: Vec<Value> = self
            .properties
            .descriptors()
            .map(|d| {
                json!({
                    "name": d.name,
                    "kind": d.kind.signature(),
                    "access": match d.access {
                        crate::property::PropertyAccess::ReadOnly => "read",
                        crate::property::PropertyAccess::ReadWrite => "readwrite",
                    },
                })
            })
            .collect();
        properties.sort_by_key(|p| p["name"].as_str().map(String::from));

        json!({
            "methods": methods,
            "signals": signals,
            "properties": properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyAccess;

    fn object() -> ServiceObject {
        let mut object = ServiceObject::new();
        object
            .register_method(MethodDescriptor::new(
                "s",
                vec![WireKind::String],
                vec![WireKind::String],
                Box::new(|_ctx, args| Ok(args)),
            ))
            .unwrap();
        object.register_signal(SignalDescriptor::new("foo", vec![WireKind::String]));
        object
            .register_property(
                PropertyDescriptor::new("propertyS", WireKind::String, PropertyAccess::ReadOnly),
                WireValue::String("constant".into()),
            )
            .unwrap();
        object
    }

    #[test]
    fn test_dispatch_through_object() {
        let object = object();
        let shutdown = ShutdownToken::new();
        let outputs = object
            .dispatch(&shutdown, "s", &[serde_json::json!("echo me")])
            .unwrap();
        assert_eq!(outputs, vec![WireValue::String("echo me".into())]);
    }

    #[test]
    fn test_property_read_unaffected_by_calls() {
        let object = object();
        let shutdown = ShutdownToken::new();
        object
            .dispatch(&shutdown, "s", &[serde_json::json!("noise")])
            .unwrap();
        assert_eq!(
            object.get_property("propertyS").unwrap(),
            WireValue::String("constant".into())
        );
    }

    #[test]
    fn test_introspect_lists_surface() {
        let object = object();
        let description = object.introspect();

        let methods = description["methods"].as_array().unwrap();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0]["name"], "s");
        assert_eq!(methods[0]["inputs"][0], "s");

        assert_eq!(description["signals"][0]["name"], "foo");
        assert_eq!(description["properties"][0]["access"], "read");
    }
}
