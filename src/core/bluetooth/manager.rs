//! Lamp manager for the LED lamp controller
//! This module provides the main interface for lamp operations.
//!
//! All state (connection record, dispatcher queues, scan registry) lives in
//! one task. Callers talk to it through [`LampHandle`]; transport work runs
//! in spawned tasks that report back through channels tagged with the
//! connection generation or scan id they belong to, so late events from a
//! superseded attempt are recognised and dropped.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use log::{debug, info, warn};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::config::lamp_config::LampConfig;
use crate::core::bluetooth::commands::{encode_brightness, encode_color, Channel, Frame, LampCommand};
use crate::core::bluetooth::connection::{Connection, ConnectionEvent, ConnectionState};
use crate::core::bluetooth::constants::NOTIFICATION_CHANNEL_CAPACITY;
use crate::core::bluetooth::device::{parse_address, Device};
use crate::core::bluetooth::dispatcher::{CommandDispatcher, PendingWrite};
use crate::core::bluetooth::registry::DeviceRegistry;
use crate::core::bluetooth::scanner::{BluetoothScanner, ScanEvent};
use crate::core::bluetooth::transport::{LampLink, LampTransport};
use crate::core::bluetooth::types::{
    Advertisement, ConnectionInfo, DisconnectReason, LampNotification, ScanOutcome,
};
use crate::core::error::LampError;

enum Request {
    StartScan {
        duration: Duration,
        reply: oneshot::Sender<Result<ScanChannels, LampError>>,
    },
    CancelScan {
        scan_id: Option<u64>,
    },
    Connect {
        address: String,
        reply: oneshot::Sender<ConnectionState>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Submit {
        channel: Channel,
        frame: Frame,
        reply: oneshot::Sender<Result<(), LampError>>,
    },
    DiscoveredDevices {
        reply: oneshot::Sender<Vec<Device>>,
    },
    ConnectionInfo {
        reply: oneshot::Sender<Option<ConnectionInfo>>,
    },
    WaitIdle {
        reply: oneshot::Sender<()>,
    },
}

/// Transport outcomes, tagged with the connection generation
enum LinkEvent {
    Linked(Arc<dyn LampLink>),
    LinkFailed(String),
    ServicesDiscovered,
    DiscoveryFailed(String),
    LinkLost,
    WriteComplete {
        channel: Channel,
        result: Result<(), String>,
    },
    TeardownComplete,
}

impl LinkEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Linked(_) => "Linked",
            Self::LinkFailed(_) => "LinkFailed",
            Self::ServicesDiscovered => "ServicesDiscovered",
            Self::DiscoveryFailed(_) => "DiscoveryFailed",
            Self::LinkLost => "LinkLost",
            Self::WriteComplete { .. } => "WriteComplete",
            Self::TeardownComplete => "TeardownComplete",
        }
    }
}

struct ScanChannels {
    scan_id: u64,
    devices: mpsc::UnboundedReceiver<Device>,
    outcome: oneshot::Receiver<ScanOutcome>,
}

/// Caller-side ends of the running scan
struct ScanSession {
    devices_tx: mpsc::UnboundedSender<Device>,
    outcome_tx: oneshot::Sender<ScanOutcome>,
}

/// Owns the lamp session; runs as a single task
pub struct LampManager {
    transport: Arc<dyn LampTransport>,
    config: LampConfig,
    /// The single connection record, if any
    connection: Option<Connection>,
    /// Link of the current connection once the transport reported it up
    link: Option<Arc<dyn LampLink>>,
    /// Cancels every task working for the current link
    link_token: CancellationToken,
    next_generation: u64,
    /// Completion flags of link teardowns still running
    teardowns: Vec<watch::Receiver<bool>>,
    dispatcher: CommandDispatcher,
    /// Callers waiting for the dispatcher to drain
    idle_waiters: Vec<oneshot::Sender<()>>,
    scanner: BluetoothScanner,
    registry: DeviceRegistry,
    scan_session: Option<ScanSession>,
    notifications: broadcast::Sender<LampNotification>,
    state_tx: watch::Sender<ConnectionState>,
    link_events_tx: mpsc::UnboundedSender<(u64, LinkEvent)>,
    scan_events_tx: mpsc::UnboundedSender<(u64, ScanEvent)>,
}

impl LampManager {
    /// Spawns the manager task on the current tokio runtime
    pub fn spawn(transport: Arc<dyn LampTransport>, config: LampConfig) -> LampHandle {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (link_events_tx, link_events_rx) = mpsc::unbounded_channel();
        let (scan_events_tx, scan_events_rx) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let manager = LampManager {
            scanner: BluetoothScanner::new(transport.clone()),
            transport,
            config,
            connection: None,
            link: None,
            link_token: CancellationToken::new(),
            next_generation: 0,
            teardowns: Vec::new(),
            dispatcher: CommandDispatcher::new(),
            idle_waiters: Vec::new(),
            registry: DeviceRegistry::new(),
            scan_session: None,
            notifications: notifications.clone(),
            state_tx,
            link_events_tx,
            scan_events_tx,
        };
        tokio::spawn(manager.run(requests_rx, link_events_rx, scan_events_rx));

        LampHandle {
            requests: requests_tx,
            notifications,
            state: state_rx,
        }
    }

    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut link_events: mpsc::UnboundedReceiver<(u64, LinkEvent)>,
        mut scan_events: mpsc::UnboundedReceiver<(u64, ScanEvent)>,
    ) {
        info!("Lamp manager started.");
        loop {
            tokio::select! {
                biased;
                Some((generation, event)) = link_events.recv() => {
                    self.handle_link_event(generation, event);
                }
                Some((scan_id, event)) = scan_events.recv() => {
                    self.handle_scan_event(scan_id, event);
                }
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },
            }
        }
        self.shutdown();
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::StartScan { duration, reply } => {
                let _ = reply.send(self.start_scan(duration));
            }
            Request::CancelScan { scan_id } => self.cancel_scan(scan_id),
            Request::Connect { address, reply } => {
                let _ = reply.send(self.connect(address));
            }
            Request::Disconnect { reply } => {
                self.disconnect();
                let _ = reply.send(());
            }
            Request::Submit {
                channel,
                frame,
                reply,
            } => {
                let _ = reply.send(self.submit(channel, frame));
            }
            Request::DiscoveredDevices { reply } => {
                let _ = reply.send(self.registry.to_vec());
            }
            Request::ConnectionInfo { reply } => {
                let info = self.connection.as_ref().map(|conn| ConnectionInfo {
                    address: conn.address().to_string(),
                    state: conn.state(),
                    retry_count: conn.retry_count(),
                    last_error: conn.last_error().cloned(),
                });
                let _ = reply.send(info);
            }
            Request::WaitIdle { reply } => {
                if self.dispatcher.is_idle() {
                    let _ = reply.send(());
                } else {
                    self.idle_waiters.push(reply);
                }
            }
        }
    }

    fn state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map(|conn| conn.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.state());
    }

    fn notify(&self, notification: LampNotification) {
        // No subscribers is fine
        let _ = self.notifications.send(notification);
    }

    // --- Scanning ---

    fn start_scan(&mut self, duration: Duration) -> Result<ScanChannels, LampError> {
        if self.scanner.is_active() {
            warn!("Scan requested while another scan is running.");
            return Err(LampError::AlreadyScanning);
        }

        self.registry.clear();
        let (devices_tx, devices) = mpsc::unbounded_channel();
        let (outcome_tx, outcome) = oneshot::channel();
        let scan_id = self.scanner.start(duration, self.scan_events_tx.clone());
        self.scan_session = Some(ScanSession {
            devices_tx,
            outcome_tx,
        });

        Ok(ScanChannels {
            scan_id,
            devices,
            outcome,
        })
    }

    fn cancel_scan(&mut self, scan_id: Option<u64>) {
        if let Some(scan_id) = scan_id {
            if !self.scanner.accepts(scan_id) {
                debug!("Cancel for inactive scan {} ignored.", scan_id);
                return;
            }
        }
        if self.scanner.cancel() {
            self.finish_scan(ScanOutcome::Cancelled);
        }
    }

    fn handle_scan_event(&mut self, scan_id: u64, event: ScanEvent) {
        if !self.scanner.accepts(scan_id) {
            debug!("Ignoring event from finished scan {}: {:?}", scan_id, event);
            return;
        }
        match event {
            ScanEvent::Advertisement(advertisement) => self.on_advertisement(advertisement),
            ScanEvent::Finished(outcome) => {
                self.scanner.finish();
                self.finish_scan(outcome);
            }
        }
    }

    fn on_advertisement(&mut self, advertisement: Advertisement) {
        if !self.config.accepts_name(advertisement.name.as_deref()) {
            return;
        }
        let address = match parse_address(&advertisement.address) {
            Ok(address) => address,
            Err(e) => {
                debug!("Skipping advertisement: {}", e);
                return;
            }
        };
        if self.registry.contains(&address) {
            return;
        }

        let device = Device::new(
            address,
            advertisement.name,
            advertisement.handle,
            &self.config.unknown_device_name,
        );
        info!("Found lamp device: Address: {}, Name: {:?}", device.address, device.name);
        self.registry.insert(device.clone());

        if let Some(session) = &self.scan_session {
            let _ = session.devices_tx.send(device);
        }
    }

    fn finish_scan(&mut self, outcome: ScanOutcome) {
        match &outcome {
            ScanOutcome::Failed(reason) => warn!("Scan failed: {}", reason),
            _ => info!(
                "Scan finished ({:?}), {} device(s) found.",
                outcome,
                self.registry.len()
            ),
        }
        if let Some(session) = self.scan_session.take() {
            let _ = session.outcome_tx.send(outcome);
        }
    }

    // --- Connection lifecycle ---

    fn connect(&mut self, address: String) -> ConnectionState {
        if let Some(conn) = &self.connection {
            if conn.address() == address && conn.state().is_active() {
                debug!("Already {:?} for {}, connect ignored.", conn.state(), address);
                return conn.state();
            }
        }

        self.next_generation += 1;
        let generation = self.next_generation;

        let mut conn = match self.release_connection(DisconnectReason::Superseded) {
            Some(mut previous) if previous.address() == address => {
                previous.restart(generation);
                previous
            }
            _ => Connection::new(address.clone(), generation),
        };
        conn.apply(ConnectionEvent::Connect);
        info!(
            "Initiating connection to {} (attempt {}).",
            address,
            conn.retry_count() + 1
        );
        self.connection = Some(conn);
        self.publish_state();
        self.spawn_connect(address, generation);

        ConnectionState::Connecting
    }

    /// Drops the current record, tearing down its link. Returns the record
    /// unless it was being explicitly disconnected.
    fn release_connection(&mut self, reason: DisconnectReason) -> Option<Connection> {
        let mut conn = self.connection.take()?;
        self.reset_link_tasks();
        self.discard_pending_writes();
        if let Some(link) = self.link.take() {
            self.spawn_teardown(link, None);
        }

        let previous = conn.state();
        if previous == ConnectionState::Disconnected {
            return Some(conn);
        }

        if previous.is_active() {
            conn.apply(ConnectionEvent::Disconnect);
        }
        conn.apply(ConnectionEvent::TeardownComplete);
        self.publish_state();

        let reason = if previous == ConnectionState::Disconnecting {
            DisconnectReason::Requested
        } else {
            reason
        };
        info!("Released connection to {} ({:?}).", conn.address(), reason);
        self.notify(LampNotification::Disconnected {
            address: conn.address().to_string(),
            reason: reason.clone(),
        });

        match reason {
            DisconnectReason::Requested => None,
            _ => Some(conn),
        }
    }

    fn disconnect(&mut self) {
        let Some(conn) = self.connection.as_mut() else {
            debug!("Disconnect requested with no connection.");
            return;
        };

        if conn.apply(ConnectionEvent::Disconnect).is_none() {
            if conn.state() == ConnectionState::Disconnected {
                debug!("Dropping idle connection record for {}.", conn.address());
                self.connection = None;
            }
            return;
        }

        let generation = conn.generation();
        info!("Disconnecting from {}.", conn.address());
        self.reset_link_tasks();
        self.discard_pending_writes();
        self.publish_state();

        match self.link.take() {
            Some(link) => self.spawn_teardown(link, Some(generation)),
            None => self.on_teardown_complete(),
        }
    }

    fn handle_link_event(&mut self, generation: u64, event: LinkEvent) {
        let current = matches!(&self.connection, Some(conn) if conn.generation() == generation);
        if !current {
            debug!(
                "Ignoring {} from superseded connection {}.",
                event.name(),
                generation
            );
            if let LinkEvent::Linked(link) = event {
                self.spawn_teardown(link, None);
            }
            return;
        }

        match event {
            LinkEvent::Linked(link) => self.on_linked(link),
            LinkEvent::LinkFailed(reason) => self.on_failure(
                ConnectionEvent::LinkFailed,
                DisconnectReason::ConnectFailed(reason),
            ),
            LinkEvent::ServicesDiscovered => self.on_services_discovered(),
            LinkEvent::DiscoveryFailed(reason) => self.on_failure(
                ConnectionEvent::DiscoveryFailed,
                DisconnectReason::ServiceDiscoveryFailed(reason),
            ),
            LinkEvent::LinkLost => self.on_link_lost(),
            LinkEvent::WriteComplete { channel, result } => self.on_write_complete(channel, result),
            LinkEvent::TeardownComplete => self.on_teardown_complete(),
        }
    }

    fn on_linked(&mut self, link: Arc<dyn LampLink>) {
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        if conn.apply(ConnectionEvent::Linked).is_none() {
            debug!("Link arrived in state {:?}, releasing it.", conn.state());
            self.spawn_teardown(link, None);
            return;
        }
        let address = conn.address().to_string();
        let generation = conn.generation();

        self.link = Some(link.clone());
        self.publish_state();
        info!("Connected to {}, discovering services...", address);
        self.notify(LampNotification::Connected { address });

        self.spawn_link_watch(link.clone(), generation);
        if let Some(conn) = self.connection.as_mut() {
            conn.apply(ConnectionEvent::DiscoveryStarted);
        }
        self.publish_state();
        self.spawn_discovery(link, generation);
    }

    fn on_services_discovered(&mut self) {
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        if conn.apply(ConnectionEvent::DiscoverySucceeded).is_none() {
            return;
        }
        let address = conn.address().to_string();
        self.publish_state();
        info!("Lamp {} is ready.", address);
        self.notify(LampNotification::Ready { address });
    }

    fn on_failure(&mut self, event: ConnectionEvent, reason: DisconnectReason) {
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        if conn.apply(event).is_none() {
            return;
        }
        if let Some(error) = reason.as_error() {
            warn!("{} ({})", error, conn.address());
            conn.set_error(error);
        }
        self.enter_disconnected(reason, true);
    }

    fn on_link_lost(&mut self) {
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        let previous = conn.state();
        if conn.apply(ConnectionEvent::LinkLost).is_none() {
            return;
        }

        if previous == ConnectionState::Disconnecting {
            self.enter_disconnected(DisconnectReason::Requested, false);
            self.connection = None;
        } else {
            warn!("Link to {} lost.", conn.address());
            self.enter_disconnected(DisconnectReason::LinkLost, false);
        }
    }

    fn on_teardown_complete(&mut self) {
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        if conn.apply(ConnectionEvent::TeardownComplete).is_none() {
            return;
        }
        self.enter_disconnected(DisconnectReason::Requested, false);
        self.connection = None;
    }

    /// Bookkeeping once the record has reached `Disconnected`
    fn enter_disconnected(&mut self, reason: DisconnectReason, teardown: bool) {
        self.reset_link_tasks();
        self.discard_pending_writes();
        if let Some(link) = self.link.take() {
            if teardown {
                self.spawn_teardown(link, None);
            }
        }
        self.publish_state();

        let address = self
            .connection
            .as_ref()
            .map(|conn| conn.address().to_string())
            .unwrap_or_default();
        info!("Disconnected from {} ({:?}).", address, reason);
        self.notify(LampNotification::Disconnected { address, reason });
    }

    fn reset_link_tasks(&mut self) {
        self.link_token.cancel();
        self.link_token = CancellationToken::new();
    }

    // --- Command dispatch ---

    fn submit(&mut self, channel: Channel, frame: Frame) -> Result<(), LampError> {
        let state = self.state();
        if state != ConnectionState::Ready {
            debug!("Dropping {:?} frame, lamp is {:?}.", channel, state);
            return Err(LampError::NotReady(state));
        }
        if let Some(write) = self.dispatcher.submit(channel, frame) {
            self.start_write(write);
        }
        Ok(())
    }

    fn on_write_complete(&mut self, channel: Channel, result: Result<(), String>) {
        if self.state() != ConnectionState::Ready {
            return;
        }
        match result {
            Ok(()) => debug!("{:?} frame written.", channel),
            Err(reason) => {
                let error = LampError::WriteFailed(reason);
                warn!("{} ({:?} channel)", error, channel);
                self.notify(LampNotification::WriteFailed { channel, error });
            }
        }
        match self.dispatcher.complete() {
            Some(next) => self.start_write(next),
            None => self.wake_idle_waiters(),
        }
    }

    fn discard_pending_writes(&mut self) {
        let discarded = self.dispatcher.clear();
        if discarded > 0 {
            info!("Discarded {} pending frame(s).", discarded);
        }
        self.wake_idle_waiters();
    }

    fn wake_idle_waiters(&mut self) {
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn start_write(&mut self, write: PendingWrite) {
        let generation = self.connection.as_ref().map(|conn| conn.generation());
        let (Some(link), Some(generation)) = (self.link.clone(), generation) else {
            warn!("No link for pending write, discarding queue.");
            self.discard_pending_writes();
            return;
        };
        let token = self.link_token.clone();
        let events = self.link_events_tx.clone();
        let timeout = self.config.write_timeout();
        debug!("Transmitting {:?} frame {:?}", write.channel, write.frame);

        tokio::spawn(async move {
            let attempt = tokio::time::timeout(timeout, link.write(write.frame.as_bytes()));
            let result = tokio::select! {
                _ = token.cancelled() => return,
                result = attempt => match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {:?}", timeout)),
                },
            };
            let _ = events.send((
                generation,
                LinkEvent::WriteComplete {
                    channel: write.channel,
                    result,
                },
            ));
        });
    }

    // --- Transport tasks ---

    /// Starts the transport connect once every earlier link teardown has
    /// finished or the disconnect timeout has passed.
    fn spawn_connect(&mut self, address: String, generation: u64) {
        let transport = self.transport.clone();
        let handle = self.registry.get(&address).map(|device| device.handle.clone());
        let token = self.link_token.clone();
        let events = self.link_events_tx.clone();
        let timeout = self.config.connect_timeout();
        let teardown_timeout = self.config.disconnect_timeout();
        let teardowns = self.pending_teardowns();

        tokio::spawn(async move {
            let attempt = async {
                if !teardowns.is_empty() {
                    debug!("Waiting for {} link teardown(s) before connecting.", teardowns.len());
                    let settled = join_all(teardowns.into_iter().map(|mut done| async move {
                        let _ = done.wait_for(|done| *done).await;
                    }));
                    if tokio::time::timeout(teardown_timeout, settled).await.is_err() {
                        warn!("Previous link teardown still pending, connecting anyway.");
                    }
                }
                tokio::time::timeout(timeout, transport.connect(&address, handle.as_ref())).await
            };
            let event = tokio::select! {
                _ = token.cancelled() => return,
                result = attempt => match result {
                    Ok(Ok(link)) => LinkEvent::Linked(link),
                    Ok(Err(e)) => LinkEvent::LinkFailed(e.to_string()),
                    Err(_) => LinkEvent::LinkFailed(format!("timed out after {:?}", timeout)),
                },
            };
            let _ = events.send((generation, event));
        });
    }

    fn spawn_discovery(&self, link: Arc<dyn LampLink>, generation: u64) {
        let token = self.link_token.clone();
        let events = self.link_events_tx.clone();
        let timeout = self.config.discovery_timeout();

        tokio::spawn(async move {
            let attempt = tokio::time::timeout(timeout, link.discover_services());
            let event = tokio::select! {
                _ = token.cancelled() => return,
                result = attempt => match result {
                    Ok(Ok(())) => LinkEvent::ServicesDiscovered,
                    Ok(Err(e)) => LinkEvent::DiscoveryFailed(e.to_string()),
                    Err(_) => LinkEvent::DiscoveryFailed(format!("timed out after {:?}", timeout)),
                },
            };
            let _ = events.send((generation, event));
        });
    }

    fn spawn_link_watch(&self, link: Arc<dyn LampLink>, generation: u64) {
        let token = self.link_token.clone();
        let events = self.link_events_tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = link.closed() => {
                    let _ = events.send((generation, LinkEvent::LinkLost));
                }
            }
        });
    }

    /// Best-effort teardown. Reports completion only when `generation` is given.
    fn spawn_teardown(&mut self, link: Arc<dyn LampLink>, generation: Option<u64>) {
        let events = self.link_events_tx.clone();
        let timeout = self.config.disconnect_timeout();
        let (done_tx, done_rx) = watch::channel(false);
        self.teardowns.retain(|done| !*done.borrow());
        self.teardowns.push(done_rx);

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, link.disconnect()).await {
                Ok(Ok(())) => debug!("Link teardown complete."),
                Ok(Err(e)) => warn!("Link teardown reported an error: {}", e),
                Err(_) => warn!("Link teardown timed out after {:?}.", timeout),
            }
            done_tx.send_replace(true);
            if let Some(generation) = generation {
                let _ = events.send((generation, LinkEvent::TeardownComplete));
            }
        });
    }

    fn pending_teardowns(&mut self) -> Vec<watch::Receiver<bool>> {
        self.teardowns.retain(|done| !*done.borrow());
        self.teardowns.clone()
    }

    fn shutdown(&mut self) {
        info!("Lamp manager shutting down.");
        if self.scanner.cancel() {
            self.finish_scan(ScanOutcome::Cancelled);
        }
        self.reset_link_tasks();
        self.discard_pending_writes();
        if let Some(link) = self.link.take() {
            self.spawn_teardown(link, None);
        }
    }
}

/// Cloneable handle to a running [`LampManager`]
#[derive(Clone)]
pub struct LampHandle {
    requests: mpsc::UnboundedSender<Request>,
    notifications: broadcast::Sender<LampNotification>,
    state: watch::Receiver<ConnectionState>,
}

impl LampHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, LampError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(make(reply))
            .map_err(|_| LampError::ControllerStopped)?;
        response.await.map_err(|_| LampError::ControllerStopped)
    }

    /// Starts a scan that completes on its own after `duration`
    pub async fn start_scan(&self, duration: Duration) -> Result<ScanHandle, LampError> {
        let channels = self
            .request(|reply| Request::StartScan { duration, reply })
            .await??;
        Ok(ScanHandle {
            scan_id: channels.scan_id,
            devices: channels.devices,
            outcome: channels.outcome,
            requests: self.requests.clone(),
        })
    }

    /// Cancels the running scan, if any
    pub fn cancel_scan(&self) {
        let _ = self.requests.send(Request::CancelScan { scan_id: None });
    }

    /// Starts connecting to `address`. Returns the resulting state: usually
    /// `Connecting`, or the current state when already connecting to or
    /// connected with the same address.
    pub async fn connect(&self, address: &str) -> Result<ConnectionState, LampError> {
        let address = parse_address(address)?;
        self.request(|reply| Request::Connect { address, reply }).await
    }

    /// Tears the connection down. Never fails.
    pub async fn disconnect(&self) {
        let _ = self.request(|reply| Request::Disconnect { reply }).await;
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LampNotification> {
        self.notifications.subscribe()
    }

    pub async fn send_color(&self, r: i32, g: i32, b: i32) -> Result<(), LampError> {
        let frame = encode_color(r, g, b)?;
        self.submit(Channel::Color, frame).await
    }

    pub async fn send_brightness(&self, level: i32) -> Result<(), LampError> {
        let frame = encode_brightness(level)?;
        self.submit(Channel::Brightness, frame).await
    }

    pub async fn send_command(&self, command: LampCommand) -> Result<(), LampError> {
        let frame = command.to_frame()?;
        self.submit(command.channel(), frame).await
    }

    /// Queues an encoded frame; fails with `NotReady` outside `Ready`
    pub async fn submit(&self, channel: Channel, frame: Frame) -> Result<(), LampError> {
        self.request(|reply| Request::Submit {
            channel,
            frame,
            reply,
        })
        .await?
    }

    /// Devices of the most recent scan, in discovery order
    pub async fn discovered_devices(&self) -> Result<Vec<Device>, LampError> {
        self.request(|reply| Request::DiscoveredDevices { reply }).await
    }

    pub async fn connection(&self) -> Result<Option<ConnectionInfo>, LampError> {
        self.request(|reply| Request::ConnectionInfo { reply }).await
    }

    /// Resolves once no frame is queued or in flight, either because all
    /// were written or because they were discarded.
    pub async fn wait_idle(&self) -> Result<(), LampError> {
        self.request(|reply| Request::WaitIdle { reply }).await
    }
}

/// A running scan: a stream of newly found devices plus its outcome
pub struct ScanHandle {
    scan_id: u64,
    devices: mpsc::UnboundedReceiver<Device>,
    outcome: oneshot::Receiver<ScanOutcome>,
    requests: mpsc::UnboundedSender<Request>,
}

impl ScanHandle {
    pub fn id(&self) -> u64 {
        self.scan_id
    }

    /// Next newly discovered device; `None` once the scan has ended
    pub async fn next_device(&mut self) -> Option<Device> {
        self.devices.recv().await
    }

    /// Stops this scan. A no-op once it has ended.
    pub fn cancel(&self) {
        let _ = self.requests.send(Request::CancelScan {
            scan_id: Some(self.scan_id),
        });
    }

    /// Waits for the scan to end
    pub async fn finished(self) -> ScanOutcome {
        self.outcome.await.unwrap_or(ScanOutcome::Cancelled)
    }
}
