//! Core functionality for the LED lamp controller
//! This module contains the lamp session layer: scanning, connection
//! lifecycle, command encoding and dispatch.

pub mod bluetooth;
pub mod error;
pub mod presets;

// Re-export commonly used types
pub use bluetooth::{LampHandle, LampManager};
pub use error::LampError;
pub use presets::{default_presets, find_preset, Preset};
