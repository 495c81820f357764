//! Wire type registry: the closed vocabulary of values that cross the bus.
//!
//! The bus carries JSON frames, so inbound arguments arrive as raw
//! `serde_json::Value`s. [`WireKind::coerce`] is the single place raw values
//! become typed [`WireValue`]s: strict kind equality (a float is never
//! accepted where an integer kind is expected, and vice versa), numeric
//! range checks, and per-element validation for container kinds with the
//! first offending index reported.

use crate::error::{EchoBusError, Result};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// The fixed set of wire kinds the service can echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireKind {
    Byte,
    Boolean,
    Int16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Double,
    String,
    ByteArray,
    StringArray,
}

/// All kinds, in signature order. Used to build the echo surface and to
/// iterate in tests.
pub const ALL_KINDS: [WireKind; 11] = [
    WireKind::Byte,
    WireKind::Boolean,
    WireKind::Int16,
    WireKind::Int32,
    WireKind::Uint32,
    WireKind::Int64,
    WireKind::Uint64,
    WireKind::Double,
    WireKind::String,
    WireKind::ByteArray,
    WireKind::StringArray,
];

impl WireKind {
    /// Short signature code for this kind, after the D-Bus type codes.
    /// The echo methods are named by these.
    pub fn signature(&self) -> &'static str {
        match self {
            WireKind::Byte => "y",
            WireKind::Boolean => "b",
            WireKind::Int16 => "n",
            WireKind::Int32 => "i",
            WireKind::Uint32 => "u",
            WireKind::Int64 => "x",
            WireKind::Uint64 => "t",
            WireKind::Double => "d",
            WireKind::String => "s",
            WireKind::ByteArray => "ay",
            WireKind::StringArray => "as",
        }
    }

    /// Human-readable name, used in validation error messages.
    pub fn name(&self) -> &'static str {
        match self {
            WireKind::Byte => "byte",
            WireKind::Boolean => "boolean",
            WireKind::Int16 => "int16",
            WireKind::Int32 => "int32",
            WireKind::Uint32 => "uint32",
            WireKind::Int64 => "int64",
            WireKind::Uint64 => "uint64",
            WireKind::Double => "double",
            WireKind::String => "string",
            WireKind::ByteArray => "byte array",
            WireKind::StringArray => "string array",
        }
    }

    /// Element kind for container kinds, `None` for primitives.
    pub fn element(&self) -> Option<WireKind> {
        match self {
            WireKind::ByteArray => Some(WireKind::Byte),
            WireKind::StringArray => Some(WireKind::String),
            _ => None,
        }
    }

    /// Validate a raw JSON value against this kind and produce the typed
    /// wire value.
    ///
    /// Strict: no numeric coercion across kinds. Numeric range is checked
    /// against the kind's domain; container elements are validated in order
    /// and the first failure carries its element index.
    pub fn coerce(&self, raw: &Value) -> Result<WireValue> {
        match self {
            WireKind::Byte => signed_in_range(*self, raw, 0, u8::MAX as i64)
                .map(|v| WireValue::Byte(v as u8)),
            WireKind::Boolean => raw
                .as_bool()
                .map(WireValue::Boolean)
                .ok_or_else(|| kind_mismatch(*self, raw)),
            WireKind::Int16 => signed_in_range(*self, raw, i16::MIN as i64, i16::MAX as i64)
                .map(|v| WireValue::Int16(v as i16)),
            WireKind::Int32 => signed_in_range(*self, raw, i32::MIN as i64, i32::MAX as i64)
                .map(|v| WireValue::Int32(v as i32)),
            WireKind::Uint32 => {
                unsigned_in_range(*self, raw, u32::MAX as u64).map(|v| WireValue::Uint32(v as u32))
            }
            WireKind::Int64 => {
                let n = expect_integer(*self, raw)?;
                n.as_i64()
                    .map(WireValue::Int64)
                    .ok_or_else(|| range_overflow(*self, n))
            }
            WireKind::Uint64 => unsigned_in_range(*self, raw, u64::MAX).map(WireValue::Uint64),
            WireKind::Double => {
                let n = raw
                    .as_number()
                    .ok_or_else(|| kind_mismatch(*self, raw))?;
                if !n.is_f64() {
                    return Err(EchoBusError::Validation {
                        expected: self.name().to_string(),
                        message: "kind mismatch: got integer where double expected".to_string(),
                        index: None,
                    });
                }
                // is_f64 guarantees as_f64 is Some
                Ok(WireValue::Double(n.as_f64().unwrap_or_default()))
            }
            WireKind::String => raw
                .as_str()
                .map(|s| WireValue::String(s.to_string()))
                .ok_or_else(|| kind_mismatch(*self, raw)),
            WireKind::ByteArray => {
                let arr = raw.as_array().ok_or_else(|| kind_mismatch(*self, raw))?;
                let mut out = Vec::with_capacity(arr.len());
                for (i, el) in arr.iter().enumerate() {
                    let v = signed_in_range(WireKind::Byte, el, 0, u8::MAX as i64)
                        .map_err(|e| e.at_index(i))?;
                    out.push(v as u8);
                }
                Ok(WireValue::ByteArray(out))
            }
            WireKind::StringArray => {
                let arr = raw.as_array().ok_or_else(|| kind_mismatch(*self, raw))?;
                let mut out = Vec::with_capacity(arr.len());
                for (i, el) in arr.iter().enumerate() {
                    let s = el
                        .as_str()
                        .ok_or_else(|| kind_mismatch(WireKind::String, el).at_index(i))?;
                    out.push(s.to_string());
                }
                Ok(WireValue::StringArray(out))
            }
        }
    }
}

impl fmt::Display for WireKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed value as it travels across the bus.
///
/// The tag is always consistent with the payload, and container kinds hold
/// homogeneously typed elements by construction. Serializes to the untagged
/// JSON wire form (`Byte(7)` becomes `7`, `StringArray` becomes a JSON
/// array of strings).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireValue {
    Byte(u8),
    Boolean(bool),
    Int16(i16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Double(f64),
    String(String),
    ByteArray(Vec<u8>),
    StringArray(Vec<String>),
}

impl WireValue {
    /// The kind tag of this value.
    pub fn kind(&self) -> WireKind {
        match self {
            WireValue::Byte(_) => WireKind::Byte,
            WireValue::Boolean(_) => WireKind::Boolean,
            WireValue::Int16(_) => WireKind::Int16,
            WireValue::Int32(_) => WireKind::Int32,
            WireValue::Uint32(_) => WireKind::Uint32,
            WireValue::Int64(_) => WireKind::Int64,
            WireValue::Uint64(_) => WireKind::Uint64,
            WireValue::Double(_) => WireKind::Double,
            WireValue::String(_) => WireKind::String,
            WireValue::ByteArray(_) => WireKind::ByteArray,
            WireValue::StringArray(_) => WireKind::StringArray,
        }
    }

    /// Check this value's kind tag against an expected kind.
    ///
    /// Strict kind equality: an `Int32` never passes for `Int16` even when
    /// the payload would fit.
    pub fn expect_kind(&self, expected: WireKind) -> Result<()> {
        if self.kind() == expected {
            Ok(())
        } else {
            Err(EchoBusError::Validation {
                expected: expected.name().to_string(),
                message: format!("kind mismatch: got {}", self.kind()),
                index: None,
            })
        }
    }

    /// JSON wire form of this value.
    ///
    /// Non-finite doubles cannot be represented in JSON and serialize to
    /// `null`; in-process callers that need bit-exact doubles keep the
    /// `WireValue` instead.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Name of a JSON value's type, for kind mismatch messages.
fn json_type_name(raw: &Value) -> &'static str {
    match raw {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn kind_mismatch(kind: WireKind, raw: &Value) -> EchoBusError {
    EchoBusError::Validation {
        expected: kind.name().to_string(),
        message: format!("kind mismatch: got {}", json_type_name(raw)),
        index: None,
    }
}

fn range_overflow(kind: WireKind, value: impl fmt::Display) -> EchoBusError {
    EchoBusError::Validation {
        expected: kind.name().to_string(),
        message: format!("range overflow: {} cannot represent {}", kind.name(), value),
        index: None,
    }
}

/// Require a JSON integer (not a float, not a string) for an integer kind.
fn expect_integer(kind: WireKind, raw: &Value) -> Result<&serde_json::Number> {
    let n = raw.as_number().ok_or_else(|| kind_mismatch(kind, raw))?;
    if n.is_f64() {
        return Err(EchoBusError::Validation {
            expected: kind.name().to_string(),
            message: "kind mismatch: got float where integer expected".to_string(),
            index: None,
        });
    }
    Ok(n)
}

fn signed_in_range(kind: WireKind, raw: &Value, min: i64, max: i64) -> Result<i64> {
    let n = expect_integer(kind, raw)?;
    match n.as_i64() {
        Some(v) if (min..=max).contains(&v) => Ok(v),
        Some(v) => Err(range_overflow(kind, v)),
        // Positive integer beyond i64::MAX
        None => Err(range_overflow(kind, n)),
    }
}

fn unsigned_in_range(kind: WireKind, raw: &Value, max: u64) -> Result<u64> {
    let n = expect_integer(kind, raw)?;
    match n.as_u64() {
        Some(v) if v <= max => Ok(v),
        Some(v) => Err(range_overflow(kind, v)),
        // Negative integer
        None => Err(range_overflow(kind, n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_validation(result: Result<WireValue>) {
        match result {
            Err(EchoBusError::Validation { .. }) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[test]
    fn test_byte_range() {
        assert_eq!(
            WireKind::Byte.coerce(&json!(0)).unwrap(),
            WireValue::Byte(0)
        );
        assert_eq!(
            WireKind::Byte.coerce(&json!(255)).unwrap(),
            WireValue::Byte(255)
        );
        assert_validation(WireKind::Byte.coerce(&json!(-1)));
        assert_validation(WireKind::Byte.coerce(&json!(256)));
    }

    #[test]
    fn test_int16_range() {
        assert_eq!(
            WireKind::Int16.coerce(&json!(-32768)).unwrap(),
            WireValue::Int16(i16::MIN)
        );
        assert_eq!(
            WireKind::Int16.coerce(&json!(32767)).unwrap(),
            WireValue::Int16(i16::MAX)
        );
        assert_validation(WireKind::Int16.coerce(&json!(-32769)));
        assert_validation(WireKind::Int16.coerce(&json!(32768)));
    }

    #[test]
    fn test_int32_range() {
        assert_eq!(
            WireKind::Int32.coerce(&json!(i32::MIN)).unwrap(),
            WireValue::Int32(i32::MIN)
        );
        assert_eq!(
            WireKind::Int32.coerce(&json!(i32::MAX)).unwrap(),
            WireValue::Int32(i32::MAX)
        );
        assert_validation(WireKind::Int32.coerce(&json!(i32::MIN as i64 - 1)));
        assert_validation(WireKind::Int32.coerce(&json!(i32::MAX as i64 + 1)));
    }

    #[test]
    fn test_uint32_range() {
        assert_eq!(
            WireKind::Uint32.coerce(&json!(0)).unwrap(),
            WireValue::Uint32(0)
        );
        assert_eq!(
            WireKind::Uint32.coerce(&json!(u32::MAX)).unwrap(),
            WireValue::Uint32(u32::MAX)
        );
        assert_validation(WireKind::Uint32.coerce(&json!(-1)));
        assert_validation(WireKind::Uint32.coerce(&json!(u32::MAX as u64 + 1)));
    }

    #[test]
    fn test_int64_range() {
        assert_eq!(
            WireKind::Int64.coerce(&json!(i64::MIN)).unwrap(),
            WireValue::Int64(i64::MIN)
        );
        assert_eq!(
            WireKind::Int64.coerce(&json!(i64::MAX)).unwrap(),
            WireValue::Int64(i64::MAX)
        );
        // Representable in JSON but not in int64
        assert_validation(WireKind::Int64.coerce(&json!(i64::MAX as u64 + 1)));
    }

    #[test]
    fn test_uint64_range() {
        assert_eq!(
            WireKind::Uint64.coerce(&json!(0)).unwrap(),
            WireValue::Uint64(0)
        );
        assert_eq!(
            WireKind::Uint64.coerce(&json!(u64::MAX)).unwrap(),
            WireValue::Uint64(u64::MAX)
        );
        assert_validation(WireKind::Uint64.coerce(&json!(-1)));
    }

    #[test]
    fn test_no_cross_kind_coercion() {
        // Floats are never accepted for integer kinds
        assert_validation(WireKind::Int32.coerce(&json!(1.0)));
        // Integers are never accepted for double
        assert_validation(WireKind::Double.coerce(&json!(1)));
        // Strings are never numbers
        assert_validation(WireKind::Int16.coerce(&json!("5")));
        // Booleans are not bytes
        assert_validation(WireKind::Byte.coerce(&json!(true)));
    }

    #[test]
    fn test_double_accepts_floats() {
        assert_eq!(
            WireKind::Double.coerce(&json!(1.5)).unwrap(),
            WireValue::Double(1.5)
        );
        assert_eq!(
            WireKind::Double.coerce(&json!(-0.0)).unwrap(),
            WireValue::Double(-0.0)
        );
    }

    #[test]
    fn test_boolean_and_string() {
        assert_eq!(
            WireKind::Boolean.coerce(&json!(true)).unwrap(),
            WireValue::Boolean(true)
        );
        assert_validation(WireKind::Boolean.coerce(&json!(1)));
        assert_eq!(
            WireKind::String.coerce(&json!("hi")).unwrap(),
            WireValue::String("hi".into())
        );
        assert_validation(WireKind::String.coerce(&json!(null)));
    }

    #[test]
    fn test_byte_array_elements_validated() {
        assert_eq!(
            WireKind::ByteArray.coerce(&json!([0, 128, 255])).unwrap(),
            WireValue::ByteArray(vec![0, 128, 255])
        );
        match WireKind::ByteArray.coerce(&json!([0, 300, 1])) {
            Err(EchoBusError::Validation { index, .. }) => assert_eq!(index, Some(1)),
            other => panic!("Expected Validation at index 1, got: {:?}", other),
        }
    }

    #[test]
    fn test_string_array_preserves_order() {
        assert_eq!(
            WireKind::StringArray.coerce(&json!(["a", "b", "c"])).unwrap(),
            WireValue::StringArray(vec!["a".into(), "b".into(), "c".into()])
        );
        match WireKind::StringArray.coerce(&json!(["a", 2])) {
            Err(EchoBusError::Validation { index, .. }) => assert_eq!(index, Some(1)),
            other => panic!("Expected Validation at index 1, got: {:?}", other),
        }
    }

    #[test]
    fn test_expect_kind_is_strict() {
        assert!(WireValue::Int16(5).expect_kind(WireKind::Int16).is_ok());
        assert!(WireValue::Int32(5).expect_kind(WireKind::Int16).is_err());
        assert!(WireValue::Byte(5).expect_kind(WireKind::Uint32).is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let v = WireValue::StringArray(vec!["a".into(), "b".into()]);
        let raw = v.to_json();
        assert_eq!(WireKind::StringArray.coerce(&raw).unwrap(), v);

        let v = WireValue::Double(1.25);
        assert_eq!(WireKind::Double.coerce(&v.to_json()).unwrap(), v);

        let v = WireValue::Uint64(u64::MAX);
        assert_eq!(WireKind::Uint64.coerce(&v.to_json()).unwrap(), v);
    }

    #[test]
    fn test_signatures() {
        assert_eq!(WireKind::Byte.signature(), "y");
        assert_eq!(WireKind::StringArray.signature(), "as");
        assert_eq!(WireKind::ByteArray.element(), Some(WireKind::Byte));
        assert_eq!(WireKind::Double.element(), None);
    }
}
