//! Defines shared data structures for the Bluetooth module.

use serde::Serialize;

use crate::core::bluetooth::commands::Channel;
use crate::core::bluetooth::connection::ConnectionState;
use crate::core::bluetooth::device::DeviceHandle;
use crate::core::error::LampError;

/// A single advertisement as reported by the transport
#[derive(Debug, Clone)]
pub struct Advertisement {
    /// Raw device identifier as reported by the platform
    pub address: String,
    /// Advertised local name, if any
    pub name: Option<String>,
    /// Platform connection token
    pub handle: DeviceHandle,
}

/// Why a connection ended up in `Disconnected`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DisconnectReason {
    /// The caller asked for it
    Requested,
    /// The transport reported the link as lost
    LinkLost,
    /// A connect to another address replaced this one
    Superseded,
    /// The transport-level connect failed or timed out
    ConnectFailed(String),
    /// The lamp service could not be resolved
    ServiceDiscoveryFailed(String),
}

impl DisconnectReason {
    /// The error a caller would see for this reason, if it is a failure
    pub fn as_error(&self) -> Option<LampError> {
        match self {
            Self::ConnectFailed(msg) => Some(LampError::ConnectFailed(msg.clone())),
            Self::ServiceDiscoveryFailed(msg) => Some(LampError::ServiceDiscoveryFailed(msg.clone())),
            _ => None,
        }
    }
}

/// Notifications published to subscribers, in event order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum LampNotification {
    /// The transport link is up
    Connected { address: String },
    /// Services resolved, commands may be sent
    Ready { address: String },
    /// The connection entered `Disconnected`
    Disconnected { address: String, reason: DisconnectReason },
    /// A characteristic write failed; connection state is unchanged
    WriteFailed { channel: Channel, error: LampError },
}

/// How a scan session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ScanOutcome {
    /// The configured duration elapsed
    Completed,
    /// The caller cancelled the scan
    Cancelled,
    /// The transport reported a scan failure
    Failed(String),
}

impl ScanOutcome {
    pub fn into_result(self) -> Result<(), LampError> {
        match self {
            Self::Failed(msg) => Err(LampError::ScanFailed(msg)),
            _ => Ok(()),
        }
    }
}

/// Snapshot of the current connection record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub address: String,
    pub state: ConnectionState,
    pub retry_count: u32,
    pub last_error: Option<LampError>,
}
