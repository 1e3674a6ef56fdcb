//! Error taxonomy for the lamp session layer
//! Argument errors are rejected at the call site, transport failures drive
//! the state machine to a safe state and are reported as notifications.

use serde::Serialize;
use thiserror::Error;

use crate::core::bluetooth::connection::ConnectionState;

/// Errors surfaced by the lamp controller
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LampError {
    /// A colour component or brightness level is out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The device identifier is not a MAC address or platform UUID
    #[error("Invalid device address: {0:?}")]
    InvalidAddress(String),

    /// A scan session is already running
    #[error("A scan is already in progress")]
    AlreadyScanning,

    /// The transport could not start or continue scanning
    #[error("Scan failed: {0}")]
    ScanFailed(String),

    /// The link to the lamp could not be established
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// The lamp service or its write characteristic could not be resolved
    #[error("Service discovery failed: {0}")]
    ServiceDiscoveryFailed(String),

    /// A command was issued outside the Ready state
    #[error("Lamp is not ready (state: {0:?})")]
    NotReady(ConnectionState),

    /// The transport rejected a characteristic write
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// The controller task is no longer running
    #[error("Lamp controller has stopped")]
    ControllerStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LampError::NotReady(ConnectionState::Connecting);
        assert_eq!(err.to_string(), "Lamp is not ready (state: Connecting)");

        let err = LampError::InvalidAddress("nope".into());
        assert_eq!(err.to_string(), "Invalid device address: \"nope\"");
    }
}
