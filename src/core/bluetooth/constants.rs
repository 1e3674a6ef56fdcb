//! Constants used throughout the application
//! This module contains all the constant values used by the lamp controller,
//! such as UUIDs, frame markers, timeouts, and other default values.

use uuid::Uuid;

/// The service that exposes the lamp's command characteristic
pub const UUID_LAMP_SERVICE: Uuid = Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb);

/// The characteristic that receives command frames (write, no response)
pub const UUID_LAMP_WRITE_CHAR: Uuid = Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);

/// First byte of every command frame
pub const FRAME_START: u8 = 0x56;

/// Last byte of every command frame
pub const FRAME_END: u8 = 0xAA;

/// Selector byte that marks a brightness frame
pub const BRIGHTNESS_SELECTOR: u8 = 0x01;

/// Colour frame size in bytes
pub const COLOR_FRAME_LEN: usize = 5;

/// Brightness frame size in bytes
pub const BRIGHTNESS_FRAME_LEN: usize = 4;

/// Highest brightness level accepted by the lamp
pub const MAX_BRIGHTNESS: i32 = 100;

/// Name used when an advertisement carries no local name
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown Device";

/// Scan duration in milliseconds
pub const DEFAULT_SCAN_DURATION_MS: u64 = 10_000;

/// Timeout for the transport-level connect in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Timeout for service discovery in milliseconds
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 10_000;

/// Timeout for a single characteristic write in milliseconds
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 2_000;

/// Timeout for link teardown in milliseconds
pub const DEFAULT_DISCONNECT_TIMEOUT_MS: u64 = 3_000;

/// Maximum number of connection attempts made by the caller-side retry helper
pub const MAX_CONNECT_RETRIES: usize = 3;

/// Delay between caller-side connection attempts in milliseconds
pub const CONNECT_RETRY_DELAY_MS: u64 = 1000;

/// Capacity of the notification broadcast channel
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 64;
