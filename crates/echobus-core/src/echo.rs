//! The echo test double: one method per wire kind, each returning its
//! argument unchanged.
//!
//! Methods are named by signature code (`y`, `b`, `n`, `i`, `u`, `x`, `t`,
//! `d`, `s`) with container echoes as `array_y` and `array_s`. The string
//! echo additionally emits the `foo` signal carrying a message derived from
//! its input, and `Quit` terminates the service. The read-only `propertyS`
//! holds a fixed constant.

use crate::dispatch::MethodDescriptor;
use crate::error::Result;
use crate::object::ServiceObject;
use crate::property::{PropertyAccess, PropertyDescriptor};
use crate::signal::SignalDescriptor;
use crate::wire::{WireKind, WireValue, ALL_KINDS};

/// Name of the signal the string echo emits.
pub const FOO_SIGNAL: &str = "foo";

/// Name of the read-only string property.
pub const PROPERTY_S: &str = "propertyS";

/// Initial (and, absent a writer, permanent) value of [`PROPERTY_S`].
pub const PROPERTY_S_INITIAL: &str = "initial property value";

/// Wire method name for the echo of a given kind.
pub fn echo_method_name(kind: WireKind) -> String {
    match kind {
        WireKind::ByteArray => "array_y".to_string(),
        WireKind::StringArray => "array_s".to_string(),
        primitive => primitive.signature().to_string(),
    }
}

/// Build the echo object: echo methods for every kind, `Quit`, the `foo`
/// signal, and `propertyS`.
pub fn echo_object() -> Result<ServiceObject> {
    let mut object = ServiceObject::new();

    object.register_signal(SignalDescriptor::new(FOO_SIGNAL, vec![WireKind::String]));

    for kind in ALL_KINDS {
        let descriptor = if kind == WireKind::String {
            // The string echo also fires the foo signal, before dispatch
            // returns to the caller.
            MethodDescriptor::new(
                echo_method_name(kind),
                vec![kind],
                vec![kind],
                Box::new(|ctx, args| {
                    if let Some(WireValue::String(text)) = args.first() {
                        ctx.emit(
                            FOO_SIGNAL,
                            vec![WireValue::String(format!("foo signal {}", text))],
                        )?;
                    }
                    Ok(args)
                }),
            )
        } else {
            MethodDescriptor::new(
                echo_method_name(kind),
                vec![kind],
                vec![kind],
                Box::new(|_ctx, args| Ok(args)),
            )
        };
        object.register_method(descriptor)?;
    }

    object.register_method(MethodDescriptor::new(
        "Quit",
        vec![],
        vec![],
        Box::new(|ctx, _args| {
            ctx.request_shutdown();
            Ok(vec![])
        }),
    ))?;

    object.register_property(
        PropertyDescriptor::new(PROPERTY_S, WireKind::String, PropertyAccess::ReadOnly),
        WireValue::String(PROPERTY_S_INITIAL.to_string()),
    )?;

    Ok(object)
}
