//! Property store: named, typed attributes readable independently of
//! method calls.
//!
//! Backing values are owned exclusively by the store and only change
//! through [`PropertyStore::set`] (when the descriptor allows writes) or at
//! registration. The dispatch loop is serial, so no locking is needed here.

use crate::error::{EchoBusError, Result};
use crate::wire::{WireKind, WireValue};
use serde_json::Value;
use std::collections::HashMap;

/// Whether a property can be written over the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyAccess {
    ReadOnly,
    ReadWrite,
}

/// A registered property: name, kind, and access mode.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: WireKind,
    pub access: PropertyAccess,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, kind: WireKind, access: PropertyAccess) -> Self {
        Self {
            name: name.into(),
            kind,
            access,
        }
    }
}

struct PropertyEntry {
    descriptor: PropertyDescriptor,
    value: WireValue,
}

/// Holds property descriptors and their backing values.
#[derive(Default)]
pub struct PropertyStore {
    entries: HashMap<String, PropertyEntry>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a property with its initial value.
    ///
    /// The initial value must match the descriptor's kind; registering the
    /// same name again replaces the previous entry.
    pub fn register(&mut self, descriptor: PropertyDescriptor, initial: WireValue) -> Result<()> {
        initial.expect_kind(descriptor.kind)?;
        self.entries.insert(
            descriptor.name.clone(),
            PropertyEntry {
                descriptor,
                value: initial,
            },
        );
        Ok(())
    }

    /// Registered descriptors, for introspection.
    pub fn descriptors(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.entries.values().map(|e| &e.descriptor)
    }

    /// Read a property's current value.
    pub fn get(&self, name: &str) -> Result<WireValue> {
        self.entries
            .get(name)
            .map(|e| e.value.clone())
            .ok_or_else(|| EchoBusError::UnknownProperty {
                name: name.to_string(),
            })
    }

    /// Write a property from its raw wire form.
    ///
    /// Fails with `ReadOnly` for read-only descriptors and validates the
    /// value against the descriptor's kind before anything is stored.
    pub fn set(&mut self, name: &str, raw: &Value) -> Result<()> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| EchoBusError::UnknownProperty {
                name: name.to_string(),
            })?;

        if entry.descriptor.access == PropertyAccess::ReadOnly {
            return Err(EchoBusError::ReadOnly {
                name: name.to_string(),
            });
        }

        entry.value = entry.descriptor.kind.coerce(raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> PropertyStore {
        let mut store = PropertyStore::new();
        store
            .register(
                PropertyDescriptor::new("propertyS", WireKind::String, PropertyAccess::ReadOnly),
                WireValue::String("constant".into()),
            )
            .unwrap();
        store
            .register(
                PropertyDescriptor::new("count", WireKind::Uint32, PropertyAccess::ReadWrite),
                WireValue::Uint32(0),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_get_returns_registered_value() {
        let store = store();
        assert_eq!(
            store.get("propertyS").unwrap(),
            WireValue::String("constant".into())
        );
    }

    #[test]
    fn test_get_unknown_property() {
        let store = store();
        assert!(matches!(
            store.get("nope"),
            Err(EchoBusError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_set_read_only_rejected() {
        let mut store = store();
        let result = store.set("propertyS", &json!("mutated"));
        assert!(matches!(result, Err(EchoBusError::ReadOnly { .. })));
        // Value unchanged
        assert_eq!(
            store.get("propertyS").unwrap(),
            WireValue::String("constant".into())
        );
    }

    #[test]
    fn test_set_read_write_validates_then_stores() {
        let mut store = store();
        assert!(matches!(
            store.set("count", &json!("not a number")),
            Err(EchoBusError::Validation { .. })
        ));
        assert_eq!(store.get("count").unwrap(), WireValue::Uint32(0));

        store.set("count", &json!(7)).unwrap();
        assert_eq!(store.get("count").unwrap(), WireValue::Uint32(7));
    }

    #[test]
    fn test_register_rejects_kind_mismatch() {
        let mut store = PropertyStore::new();
        let result = store.register(
            PropertyDescriptor::new("p", WireKind::String, PropertyAccess::ReadOnly),
            WireValue::Int32(1),
        );
        assert!(matches!(result, Err(EchoBusError::Validation { .. })));
    }
}
