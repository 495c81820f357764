//! Service identity configuration and bus limits.

use crate::error::{EchoBusError, Result};
use std::time::Duration;

/// The published identity of the service: well-known name, object path, and
/// interface name.
///
/// No validation beyond non-empty; the bus treats all three as opaque
/// strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub service_name: String,
    pub object_path: String,
    pub interface_name: String,
}

impl ServiceConfig {
    /// Build a config, rejecting empty identity strings.
    pub fn new(
        service_name: impl Into<String>,
        object_path: impl Into<String>,
        interface_name: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            service_name: service_name.into(),
            object_path: object_path.into(),
            interface_name: interface_name.into(),
        };
        if config.service_name.is_empty() {
            return Err(EchoBusError::Config {
                message: "service name must not be empty".to_string(),
            });
        }
        if config.object_path.is_empty() {
            return Err(EchoBusError::Config {
                message: "object path must not be empty".to_string(),
            });
        }
        if config.interface_name.is_empty() {
            return Err(EchoBusError::Config {
                message: "interface name must not be empty".to_string(),
            });
        }
        Ok(config)
    }
}

/// Fixed limits for the bus transport.
pub struct BusConfig;

impl BusConfig {
    /// Maximum size of a single frame payload.
    pub const MAX_FRAME_SIZE: usize = 1_048_576; // 1MB

    /// Maximum concurrent client connections.
    pub const MAX_CONNECTIONS: usize = 32;

    /// Client-side connect timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Depth of the serial inbound call queue.
    pub const INBOUND_QUEUE_CAPACITY: usize = 64;

    /// Buffered signal events per subscriber before lag is reported.
    pub const SIGNAL_CHANNEL_CAPACITY: usize = 256;

    /// Buffered outgoing frames per connection.
    pub const OUTGOING_QUEUE_CAPACITY: usize = 64;
}
