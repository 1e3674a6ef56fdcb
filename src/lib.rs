//! LED lamp controller library
//! Discovers a BLE RGB lamp, manages the connection to it and drives it
//! with colour and brightness frames.

// Module declarations
pub mod commands;
pub mod config;
pub mod core;
pub mod logging;
pub mod state;
pub mod utils;

pub use crate::config::AppConfig;
pub use crate::core::bluetooth::{LampHandle, LampManager, LampNotification};
pub use crate::core::error::LampError;
pub use crate::state::AppState;
