//! LED lamp controller CLI
//!
//! # Usage
//!
//! ```bash
//! # List nearby lamps
//! ledlamp-controller scan --duration-ms 5000
//!
//! # Set a colour, a brightness or a preset
//! ledlamp-controller color AA:BB:CC:DD:EE:FF 255 107 107
//! ledlamp-controller brightness AA:BB:CC:DD:EE:FF 30
//! ledlamp-controller preset AA:BB:CC:DD:EE:FF night
//! ```

use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use log::{info, Level};

use ledlamp_controller_lib::commands;
use ledlamp_controller_lib::config::{AppConfig, CONFIG_FILE_NAME};
use ledlamp_controller_lib::logging::setup_logging;
use ledlamp_controller_lib::state::AppState;

/// LED lamp controller
#[derive(Parser, Debug)]
#[command(name = "ledlamp-controller")]
#[command(author, version, about = "Control a Bluetooth LE RGB lamp", long_about = None)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan for nearby lamps
    Scan {
        /// Scan length; the configured duration when omitted
        #[arg(short, long)]
        duration_ms: Option<u64>,
    },

    /// Set the lamp colour
    Color {
        address: String,
        r: i32,
        g: i32,
        b: i32,
    },

    /// Set the lamp brightness (0-100)
    Brightness { address: String, level: i32 },

    /// Apply a named preset
    Preset { address: String, name: String },

    /// List the configured presets
    Presets,

    /// Write the default config file
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::Trace,
        "debug" => Level::Debug,
        "warn" => Level::Warn,
        "error" => Level::Error,
        _ => Level::Info,
    };
    setup_logging(level);

    info!("LED lamp controller v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Presets => {
            let config = AppConfig::load_config(&cli.config).await?;
            for preset in &config.presets {
                let c = preset.color;
                println!(
                    "{:<10} rgb({}, {}, {}) brightness {}",
                    preset.name, c.r, c.g, c.b, preset.brightness
                );
            }
            Ok(())
        }
        Commands::InitConfig => AppConfig::default().save_config(&cli.config).await,
        Commands::Scan { duration_ms } => {
            let app_state = AppState::new(cli.config).await?;
            scan(&app_state, duration_ms).await
        }
        Commands::Color { address, r, g, b } => {
            let app_state = AppState::new(cli.config).await?;
            drive_lamp(&app_state, &address, LampAction::Color(r, g, b)).await
        }
        Commands::Brightness { address, level } => {
            let app_state = AppState::new(cli.config).await?;
            drive_lamp(&app_state, &address, LampAction::Brightness(level)).await
        }
        Commands::Preset { address, name } => {
            let app_state = AppState::new(cli.config).await?;
            drive_lamp(&app_state, &address, LampAction::Preset(name)).await
        }
    }
}

enum LampAction {
    Color(i32, i32, i32),
    Brightness(i32),
    Preset(String),
}

async fn scan(app_state: &AppState, duration_ms: Option<u64>) -> anyhow::Result<()> {
    let mut scan = commands::start_scan(app_state, duration_ms)
        .await
        .map_err(|e| anyhow!(e))?;

    tokio::select! {
        _ = async {
            while let Some(device) = scan.next_device().await {
                println!("{}  {}", device.address, device.name);
            }
        } => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping scan.");
            commands::stop_scan(app_state);
        }
    }

    scan.finished().await.into_result()?;
    Ok(())
}

/// Connects, applies `action`, waits for the frames to go out, then disconnects
async fn drive_lamp(app_state: &AppState, address: &str, action: LampAction) -> anyhow::Result<()> {
    commands::connect_and_wait(app_state, address)
        .await
        .map_err(|e| anyhow!(e))?;

    let result = match action {
        LampAction::Color(r, g, b) => commands::send_color(app_state, r, g, b).await,
        LampAction::Brightness(level) => commands::send_brightness(app_state, level).await,
        LampAction::Preset(name) => commands::apply_preset(app_state, &name).await,
    };
    if result.is_ok() {
        app_state.lamp.wait_idle().await?;
    }
    commands::disconnect(app_state).await.map_err(|e| anyhow!(e))?;

    result.map_err(|e| anyhow!(e))
}
