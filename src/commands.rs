//! Presentation-facing commands
//! This module defines the operations a front end invokes on the lamp.
//! Errors are stringified here, at the outer edge.

use std::time::Duration;

use log::{info, warn};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::core::bluetooth::{
    parse_address, ConnectionInfo, ConnectionState, Device, DisconnectReason, LampHandle,
    LampNotification, Rgb, ScanHandle, CONNECT_RETRY_DELAY_MS, MAX_CONNECT_RETRIES,
};
use crate::core::error::LampError;
use crate::core::presets::find_preset;
use crate::state::AppState;

/// Starts a scan for lamps
///
/// # Arguments
/// * `app_state` - The application state
/// * `duration_ms` - Scan length; the configured duration when `None`
///
/// # Returns
/// A handle that yields each newly found device and the scan outcome.
pub async fn start_scan(
    app_state: &AppState,
    duration_ms: Option<u64>,
) -> Result<ScanHandle, String> {
    let duration = duration_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| app_state.config.lamp.scan_duration());

    app_state
        .lamp
        .start_scan(duration)
        .await
        .map_err(|e| e.to_string())
}

pub fn stop_scan(app_state: &AppState) {
    app_state.lamp.cancel_scan();
}

pub async fn get_discovered_devices(app_state: &AppState) -> Result<Vec<Device>, String> {
    app_state
        .lamp
        .discovered_devices()
        .await
        .map_err(|e| e.to_string())
}

/// Starts connecting to a lamp; progress arrives as notifications
///
/// # Arguments
/// * `device_id` - The lamp's address as listed by a scan
pub async fn connect_to_device(
    app_state: &AppState,
    device_id: &str,
) -> Result<ConnectionState, String> {
    app_state
        .lamp
        .connect(device_id)
        .await
        .map_err(|e| e.to_string())
}

/// Connects and waits until the lamp is ready, retrying failed attempts
pub async fn connect_and_wait(app_state: &AppState, device_id: &str) -> Result<(), String> {
    connect_with_retry(
        &app_state.lamp,
        device_id,
        MAX_CONNECT_RETRIES,
        Duration::from_millis(CONNECT_RETRY_DELAY_MS),
    )
    .await
    .map_err(|e| e.to_string())
}

/// Disconnects from the current lamp and waits for the teardown to settle
pub async fn disconnect(app_state: &AppState) -> Result<(), String> {
    let mut state = app_state.lamp.watch_state();
    app_state.lamp.disconnect().await;

    let settled = state.wait_for(|s| *s == ConnectionState::Disconnected);
    if tokio::time::timeout(app_state.config.lamp.disconnect_timeout(), settled)
        .await
        .is_err()
    {
        warn!("Lamp did not report Disconnected in time.");
    }
    Ok(())
}

pub fn get_connection_state(app_state: &AppState) -> ConnectionState {
    app_state.lamp.current_state()
}

pub async fn get_connection_info(app_state: &AppState) -> Result<Option<ConnectionInfo>, String> {
    app_state.lamp.connection().await.map_err(|e| e.to_string())
}

pub async fn send_color(app_state: &AppState, r: i32, g: i32, b: i32) -> Result<(), String> {
    app_state
        .lamp
        .send_color(r, g, b)
        .await
        .map_err(|e| e.to_string())
}

/// Sends a colour given as a packed `0xAARRGGBB` integer
pub async fn send_packed_color(app_state: &AppState, color: u32) -> Result<(), String> {
    let Rgb { r, g, b } = Rgb::from_packed(color);
    send_color(app_state, r.into(), g.into(), b.into()).await
}

pub async fn send_brightness(app_state: &AppState, level: i32) -> Result<(), String> {
    app_state
        .lamp
        .send_brightness(level)
        .await
        .map_err(|e| e.to_string())
}

/// Applies a configured preset: colour first, then brightness
pub async fn apply_preset(app_state: &AppState, name: &str) -> Result<(), String> {
    let preset = find_preset(&app_state.config.presets, name)
        .ok_or_else(|| format!("Unknown preset: {}", name))?;

    info!("Applying preset '{}'", preset.name);
    let Rgb { r, g, b } = preset.color;
    send_color(app_state, r.into(), g.into(), b.into()).await?;
    send_brightness(app_state, preset.brightness.into()).await
}

enum AttemptOutcome {
    Ready,
    Failed(LampError),
    Aborted(DisconnectReason),
}

/// Connects to `address`, re-issuing the connect after a failed attempt.
///
/// Succeeds once the lamp is ready. Fails with the last attempt's error
/// after `max_attempts`, or right away if the attempt is ended by a
/// disconnect or another connect.
pub async fn connect_with_retry(
    lamp: &LampHandle,
    address: &str,
    max_attempts: usize,
    delay: Duration,
) -> Result<(), LampError> {
    let address = parse_address(address)?;
    let max_attempts = max_attempts.max(1);
    let mut notifications = lamp.subscribe();
    let mut last_error = LampError::ConnectFailed(format!("no attempt made for {}", address));

    for attempt in 1..=max_attempts {
        info!("Connecting to {} (attempt {}/{})", address, attempt, max_attempts);
        if lamp.connect(&address).await? == ConnectionState::Ready {
            return Ok(());
        }

        match wait_for_attempt(&mut notifications, &address).await? {
            AttemptOutcome::Ready => return Ok(()),
            AttemptOutcome::Failed(e) => {
                warn!("Attempt {} to {} failed: {}", attempt, address, e);
                last_error = e;
            }
            AttemptOutcome::Aborted(reason) => {
                return Err(LampError::ConnectFailed(format!(
                    "attempt ended: {:?}",
                    reason
                )));
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(delay).await;
        }
    }

    Err(last_error)
}

async fn wait_for_attempt(
    notifications: &mut broadcast::Receiver<LampNotification>,
    address: &str,
) -> Result<AttemptOutcome, LampError> {
    loop {
        match notifications.recv().await {
            Ok(LampNotification::Ready { address: ready }) if ready == address => {
                return Ok(AttemptOutcome::Ready);
            }
            Ok(LampNotification::Disconnected {
                address: lost,
                reason,
            }) if lost == address => {
                return Ok(match reason.as_error() {
                    Some(error) => AttemptOutcome::Failed(error),
                    None if reason == DisconnectReason::LinkLost => {
                        AttemptOutcome::Failed(LampError::ConnectFailed("link lost".into()))
                    }
                    None => AttemptOutcome::Aborted(reason),
                });
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {} notifications while connecting.", skipped);
            }
            Err(RecvError::Closed) => return Err(LampError::ControllerStopped),
        }
    }
}
