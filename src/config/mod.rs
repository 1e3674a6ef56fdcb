pub mod lamp_config;

use std::path::Path;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::lamp_config::LampConfig;
use crate::core::presets::{default_presets, Preset};
use crate::utils::ensure_directory_exists;

pub const CONFIG_FILE_NAME: &str = "ledlamp_config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub lamp: LampConfig,
    pub presets: Vec<Preset>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            lamp: LampConfig::default(),
            presets: default_presets(),
        }
    }
}

impl AppConfig {
    /// Loads the config from `file_path`, falling back to defaults when the
    /// file does not exist.
    pub async fn load_config(file_path: &Path) -> Result<Self> {
        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Saves the config to `file_path`, creating its directory if needed.
    pub async fn save_config(&self, file_path: &Path) -> Result<()> {
        if let Some(config_dir) = file_path.parent() {
            ensure_directory_exists(config_dir).await?;
        }

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;

        info!("Config saved to {:?}.", file_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path() -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("ledlamp-config-{}", uuid::Uuid::new_v4()))
            .join(CONFIG_FILE_NAME)
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let config = AppConfig::load_config(&scratch_path()).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.presets.len(), 5);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let path = scratch_path();
        let mut config = AppConfig::default();
        config.lamp.name_filter = Some("LED".into());
        config.lamp.scan_duration_ms = 4000;

        config.save_config(&path).await.unwrap();
        let loaded = AppConfig::load_config(&path).await.unwrap();
        assert_eq!(loaded, config);

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
