//! Discovered lamp device representation and address handling

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::core::error::LampError;

/// Opaque platform token used by the transport to reach a device.
/// The core never inspects it.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct DeviceHandle(String);

impl DeviceHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceHandle(..)")
    }
}

/// Represents a discovered lamp device
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    /// Stable hardware identifier, normalised (upper-case MAC or lower-case UUID)
    pub address: String,
    /// Advertised name, or the configured placeholder
    pub name: String,
    /// Platform connection token
    #[serde(skip)]
    pub handle: DeviceHandle,
}

impl Device {
    /// Creates a new Device, substituting `placeholder` when no name was advertised
    pub fn new(address: String, name: Option<String>, handle: DeviceHandle, placeholder: &str) -> Self {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| placeholder.to_string());
        Self {
            address,
            name,
            handle,
        }
    }
}

/// Devices are identified by address only
impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Device {}

fn mac_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").expect("MAC address pattern is valid")
    })
}

fn embedded_mac_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([0-9A-Fa-f]{2}[:_-]){5}[0-9A-Fa-f]{2}").expect("MAC address pattern is valid")
    })
}

/// Validates and normalises a device address.
///
/// Accepts a colon separated MAC (`AA:BB:CC:DD:EE:FF`, any case) or a
/// 128-bit UUID, which is how platforms without MAC exposure identify
/// peripherals.
pub fn parse_address(address: &str) -> Result<String, LampError> {
    let trimmed = address.trim();
    if mac_regex().is_match(trimmed) {
        return Ok(trimmed.to_uppercase());
    }
    if trimmed.len() == 36 {
        if let Ok(uuid) = Uuid::parse_str(trimmed) {
            return Ok(uuid.hyphenated().to_string());
        }
    }
    Err(LampError::InvalidAddress(address.to_string()))
}

/// Derives an address from a platform device id, e.g. a BlueZ object path
/// `/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF`. Falls back to the id itself
/// when it is a UUID.
pub fn address_from_platform_id(id: &str) -> Option<String> {
    if let Some(m) = embedded_mac_regex().find_iter(id).last() {
        return Some(m.as_str().replace(['_', '-'], ":").to_uppercase());
    }
    parse_address(id).ok()
}
