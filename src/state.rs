//! Application state management
//! This module defines and manages the global application state.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use log::info;

use crate::config::AppConfig;
use crate::core::bluetooth::{BluestTransport, LampHandle, LampManager, LampTransport};

/// Global application state
pub struct AppState {
    pub config: AppConfig,
    pub config_path: PathBuf,
    /// Handle to the running lamp manager
    pub lamp: LampHandle,
}

impl AppState {
    /// Loads the config and starts a lamp manager on the system adapter
    pub async fn new(config_path: PathBuf) -> Result<Self> {
        let config = AppConfig::load_config(&config_path).await?;

        info!("Initializing Bluetooth transport...");
        let transport = BluestTransport::new(
            config.lamp.service_uuid,
            config.lamp.write_characteristic_uuid,
        )
        .await?;

        Ok(Self::with_transport(config, config_path, Arc::new(transport)))
    }

    /// Starts a lamp manager on the given transport
    pub fn with_transport(
        config: AppConfig,
        config_path: PathBuf,
        transport: Arc<dyn LampTransport>,
    ) -> Self {
        let lamp = LampManager::spawn(transport, config.lamp.clone());
        Self {
            config,
            config_path,
            lamp,
        }
    }
}
