//! Error types for the echo bus.
//!
//! Every failure a caller can observe across the transport boundary is a
//! variant here, so the bus server can turn any of them into a structured
//! JSON-RPC error response instead of dropping the connection.

use thiserror::Error;

/// Main error type for echo bus operations.
#[derive(Debug, Error)]
pub enum EchoBusError {
    // Wire type validation
    #[error("Invalid value for wire kind {expected}: {message}")]
    Validation {
        /// Signature code of the expected kind (e.g. `"n"`, `"as"`).
        expected: String,
        message: String,
        /// Index of the offending argument or container element, when known.
        index: Option<usize>,
    },

    #[error("Method {method} expects {expected} argument(s), got {got}")]
    Arity {
        method: String,
        expected: usize,
        got: usize,
    },

    // Registration and lookup
    #[error("Unknown method: {name}")]
    UnknownMethod { name: String },

    #[error("Unknown signal: {name}")]
    UnknownSignal { name: String },

    #[error("Unknown property: {name}")]
    UnknownProperty { name: String },

    #[error("Method already registered: {name}")]
    DuplicateMethod { name: String },

    #[error("Property {name} is read-only")]
    ReadOnly { name: String },

    // Handler failures: the underlying cause is preserved, never swallowed
    #[error("Handler for {method} failed: {source}")]
    Handler {
        method: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // Service lifecycle
    #[error("Failed to register service {service}: {message}")]
    Registration { service: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // Transport plumbing
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// An error response received from the remote side of the bus.
    #[error("Remote error {code}: {message}")]
    Remote { code: i32, message: String },
}

/// Result type alias for echo bus operations.
pub type Result<T> = std::result::Result<T, EchoBusError>;

impl From<std::io::Error> for EchoBusError {
    fn from(err: std::io::Error) -> Self {
        EchoBusError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for EchoBusError {
    fn from(err: serde_json::Error) -> Self {
        EchoBusError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl EchoBusError {
    /// Attach an argument index to a `Validation` error.
    ///
    /// Used by the dispatcher and the container validators so the caller
    /// learns which argument (or element) failed first. Other variants pass
    /// through unchanged.
    pub fn at_index(self, idx: usize) -> Self {
        match self {
            EchoBusError::Validation {
                expected, message, ..
            } => EchoBusError::Validation {
                expected,
                message: format!("{} (at index {})", message, idx),
                index: Some(idx),
            },
            other => other,
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Standard JSON-RPC error codes:
    /// - -32700: Parse error
    /// - -32600: Invalid Request
    /// - -32601: Method not found
    /// - -32602: Invalid params
    /// - -32603: Internal error
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Handler failure
    /// - -32001: Unknown property
    /// - -32002: Read-only property
    /// - -32003: Unknown signal
    /// - -32004: Registration conflict
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            EchoBusError::UnknownMethod { .. } => -32601,

            EchoBusError::Validation { .. } | EchoBusError::Arity { .. } => -32602,

            EchoBusError::Handler { .. } => -32000,

            EchoBusError::UnknownProperty { .. } => -32001,

            EchoBusError::ReadOnly { .. } => -32002,

            EchoBusError::UnknownSignal { .. } => -32003,

            EchoBusError::DuplicateMethod { .. }
            | EchoBusError::Registration { .. }
            | EchoBusError::Config { .. } => -32004,

            EchoBusError::Remote { code, .. } => *code,

            // Transport faults are internal errors
            _ => -32603,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EchoBusError::UnknownMethod {
            name: "frobnicate".into(),
        };
        assert_eq!(err.to_string(), "Unknown method: frobnicate");
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(
            EchoBusError::UnknownMethod { name: "x".into() }.to_rpc_error_code(),
            -32601
        );
        assert_eq!(
            EchoBusError::Arity {
                method: "s".into(),
                expected: 1,
                got: 0
            }
            .to_rpc_error_code(),
            -32602
        );
        assert_eq!(
            EchoBusError::ReadOnly {
                name: "propertyS".into()
            }
            .to_rpc_error_code(),
            -32002
        );
    }

    #[test]
    fn test_at_index_attaches_to_validation_only() {
        let err = EchoBusError::Validation {
            expected: "y".into(),
            message: "out of range".into(),
            index: None,
        }
        .at_index(2);
        match err {
            EchoBusError::Validation { index, message, .. } => {
                assert_eq!(index, Some(2));
                assert!(message.contains("index 2"));
            }
            other => panic!("Expected Validation, got: {:?}", other),
        }

        let err = EchoBusError::UnknownMethod { name: "x".into() }.at_index(0);
        assert!(matches!(err, EchoBusError::UnknownMethod { .. }));
    }

    #[test]
    fn test_handler_error_preserves_source() {
        let cause: Box<dyn std::error::Error + Send + Sync> = "boom".into();
        let err = EchoBusError::Handler {
            method: "s".into(),
            source: cause,
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("boom"));
    }
}
