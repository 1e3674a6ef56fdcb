use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_DISCONNECT_TIMEOUT_MS, DEFAULT_DISCOVERY_TIMEOUT_MS,
    DEFAULT_SCAN_DURATION_MS, DEFAULT_WRITE_TIMEOUT_MS, UNKNOWN_DEVICE_NAME, UUID_LAMP_SERVICE,
    UUID_LAMP_WRITE_CHAR,
};

/// Lamp session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LampConfig {
    /// Service that carries the command characteristic
    pub service_uuid: Uuid,
    /// Characteristic that command frames are written to
    pub write_characteristic_uuid: Uuid,
    /// How long a scan runs before it completes on its own
    pub scan_duration_ms: u64,
    /// Upper bound for the transport-level connect
    pub connect_timeout_ms: u64,
    /// Upper bound for resolving the lamp service
    pub discovery_timeout_ms: u64,
    /// Upper bound for a single characteristic write
    pub write_timeout_ms: u64,
    /// Upper bound for link teardown; Disconnected is reached regardless
    pub disconnect_timeout_ms: u64,
    /// Name shown for devices that advertise none
    pub unknown_device_name: String,
    /// Only advertisements whose name contains this are kept
    pub name_filter: Option<String>,
}

impl Default for LampConfig {
    fn default() -> Self {
        LampConfig {
            service_uuid: UUID_LAMP_SERVICE,
            write_characteristic_uuid: UUID_LAMP_WRITE_CHAR,
            scan_duration_ms: DEFAULT_SCAN_DURATION_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            discovery_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            disconnect_timeout_ms: DEFAULT_DISCONNECT_TIMEOUT_MS,
            unknown_device_name: UNKNOWN_DEVICE_NAME.to_string(),
            name_filter: None,
        }
    }
}

impl LampConfig {
    pub fn scan_duration(&self) -> Duration {
        Duration::from_millis(self.scan_duration_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    /// Whether an advertised name passes `name_filter`
    pub fn accepts_name(&self, name: Option<&str>) -> bool {
        match &self.name_filter {
            None => true,
            Some(filter) => name.map(|n| n.contains(filter.as_str())).unwrap_or(false),
        }
    }
}
