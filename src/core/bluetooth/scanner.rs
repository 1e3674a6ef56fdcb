//! Time-bounded discovery of nearby lamps
//! The scan task only forwards what it sees; the controller owns the
//! registry and decides what a sighting means.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::transport::LampTransport;
use crate::core::bluetooth::types::{Advertisement, ScanOutcome};

/// What a scan task reports back, tagged with its scan id
#[derive(Debug)]
pub enum ScanEvent {
    Advertisement(Advertisement),
    Finished(ScanOutcome),
}

pub type ScanEventSender = mpsc::UnboundedSender<(u64, ScanEvent)>;

pub struct BluetoothScanner {
    transport: Arc<dyn LampTransport>,
    cancel_token: CancellationToken,
    scan_task_handle: Option<JoinHandle<()>>,
    scan_id: u64,
    active: bool,
}

impl BluetoothScanner {
    pub fn new(transport: Arc<dyn LampTransport>) -> Self {
        Self {
            transport,
            cancel_token: CancellationToken::new(),
            scan_task_handle: None,
            scan_id: 0,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// True for events of the running session
    pub fn accepts(&self, scan_id: u64) -> bool {
        self.active && scan_id == self.scan_id
    }

    /// Spawns a scan task for `duration` and returns its id
    pub fn start(&mut self, duration: Duration, events: ScanEventSender) -> u64 {
        self.scan_id += 1;
        self.active = true;
        self.cancel_token = CancellationToken::new();

        let scan_id = self.scan_id;
        let transport = self.transport.clone();
        let cancel_token = self.cancel_token.clone();

        let handle = tokio::spawn(async move {
            Self::internal_scan_task(transport, scan_id, duration, cancel_token, events).await;
        });
        self.scan_task_handle = Some(handle);

        info!("Device scan {} started for {:?}.", scan_id, duration);
        scan_id
    }

    /// Stops the running session immediately. Returns false when no session
    /// was active.
    pub fn cancel(&mut self) -> bool {
        if !self.active {
            return false;
        }
        info!("Stopping Bluetooth scan {}.", self.scan_id);
        self.active = false;
        self.cancel_token.cancel();
        self.scan_task_handle = None;
        true
    }

    /// Marks the session finished after its task reported an outcome
    pub fn finish(&mut self) {
        self.active = false;
        self.scan_task_handle = None;
    }

    async fn internal_scan_task(
        transport: Arc<dyn LampTransport>,
        scan_id: u64,
        duration: Duration,
        cancel_token: CancellationToken,
        events: ScanEventSender,
    ) {
        let outcome = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => ScanOutcome::Cancelled,
            _ = tokio::time::sleep(duration) => ScanOutcome::Completed,
            result = Self::forward_advertisements(transport.as_ref(), scan_id, &events) => match result {
                Ok(()) => ScanOutcome::Completed,
                Err(e) => {
                    error!("Scan {} failed: {}", scan_id, e);
                    ScanOutcome::Failed(e.to_string())
                }
            },
        };

        debug!("Scan {} finished: {:?}", scan_id, outcome);
        let _ = events.send((scan_id, ScanEvent::Finished(outcome)));
    }

    async fn forward_advertisements(
        transport: &dyn LampTransport,
        scan_id: u64,
        events: &ScanEventSender,
    ) -> Result<()> {
        info!("Starting bluetooth scan");
        let mut advertisements = transport.scan().await?;

        while let Some(advertisement) = advertisements.next().await {
            if events
                .send((scan_id, ScanEvent::Advertisement(advertisement?)))
                .is_err()
            {
                break;
            }
        }

        info!("Bluetooth scan stream has ended.");
        Ok(())
    }
}

impl Drop for BluetoothScanner {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
