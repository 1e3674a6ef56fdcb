//! Bluetooth functionality for the LED lamp controller
//! This module handles all bluetooth operations including scanning,
//! connecting, and sending command frames to the lamp.

pub mod commands;
pub mod connection;
pub mod constants;
pub mod device;
pub mod dispatcher;
pub mod manager;
pub mod registry;
pub mod scanner;
pub mod transport;
pub mod types;

// Re-export types that should be publicly accessible
pub use commands::{encode_brightness, encode_color, Channel, Frame, LampCommand, Rgb};
pub use connection::ConnectionState;
pub use constants::*; // Re-export all constants
pub use device::{parse_address, Device, DeviceHandle};
pub use manager::{LampHandle, LampManager, ScanHandle};
pub use transport::{AdvertisementStream, BluestTransport, LampLink, LampTransport};
pub use types::{Advertisement, ConnectionInfo, DisconnectReason, LampNotification, ScanOutcome};
