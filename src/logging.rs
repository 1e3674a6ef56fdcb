use std::sync::OnceLock;

use chrono::Local;
use log::{Level, Metadata, Record, SetLoggerError};
use serde::Serialize;
use tokio::sync::broadcast;

const LOG_CHANNEL_CAPACITY: usize = 256;

static LOGGER: OnceLock<ChannelLogger> = OnceLock::new();

#[derive(Debug, Serialize, Clone)]
pub struct LogMessage {
    pub level: String,
    pub message: String,
    pub timestamp: String,
}

/// Writes records to stderr and republishes them to in-process subscribers
pub struct ChannelLogger {
    sender: broadcast::Sender<LogMessage>,
    level: Level,
}

impl ChannelLogger {
    pub fn new(level: Level) -> Self {
        let (sender, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        Self { sender, level }
    }

    /// Installs the logger process-wide. Fails if a logger is already set.
    pub fn init(level: Level) -> Result<(), SetLoggerError> {
        let logger = LOGGER.get_or_init(|| ChannelLogger::new(level));
        log::set_logger(logger).map(|()| log::set_max_level(level.to_level_filter()))
    }

    /// Receives log messages emitted after this call; `None` before `init`
    pub fn subscribe() -> Option<broadcast::Receiver<LogMessage>> {
        LOGGER.get().map(|logger| logger.sender.subscribe())
    }

    fn emit_log(&self, record: &Record) {
        let log_message = LogMessage {
            level: record.level().to_string(),
            message: record.args().to_string(),
            timestamp: Local::now().to_rfc3339(),
        };

        // Nobody listening is the common case
        let _ = self.sender.send(log_message);
    }
}

impl log::Log for ChannelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
            self.emit_log(record);
        }
    }

    fn flush(&self) {}
}

fn fallback_builder(level: Level) -> env_logger::Builder {
    let mut builder = env_logger::builder();
    builder.filter_level(level.to_level_filter());
    builder
}

/// Installs [`ChannelLogger`], falling back to env_logger if that fails
pub fn setup_logging(level: Level) {
    if ChannelLogger::init(level).is_err() {
        let _ = fallback_builder(level).try_init();
    }
    log::info!("Logging initialized at {} level", level);
}
