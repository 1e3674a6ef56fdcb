//! Scripted in-memory transport for driving the lamp manager in tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::{broadcast, mpsc, watch, Semaphore};

use ledlamp_controller_lib::config::lamp_config::LampConfig;
use ledlamp_controller_lib::core::bluetooth::{
    Advertisement, AdvertisementStream, ConnectionState, DeviceHandle, LampHandle, LampLink,
    LampManager, LampNotification, LampTransport,
};

pub const LAMP_A: &str = "AA:BB:CC:DD:EE:FF";
pub const LAMP_B: &str = "11:22:33:44:55:66";

const WAIT: Duration = Duration::from_secs(5);

/// How one step of a connect attempt behaves
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(&'static str),
    /// Succeeds after a real-time delay
    Delay(Duration),
    /// Never completes
    Hang,
}

async fn run_step(step: &Step) -> Result<()> {
    match step {
        Step::Succeed => Ok(()),
        Step::Fail(reason) => Err(anyhow!(*reason)),
        Step::Delay(delay) => {
            tokio::time::sleep(*delay).await;
            Ok(())
        }
        Step::Hang => std::future::pending().await,
    }
}

/// Script for one `connect` call
#[derive(Debug, Clone)]
pub struct LinkPlan {
    pub connect: Step,
    pub discovery: Step,
    pub disconnect: Step,
    /// Writes block until released by the test
    pub gated_writes: bool,
}

impl LinkPlan {
    pub fn ready() -> Self {
        Self {
            connect: Step::Succeed,
            discovery: Step::Succeed,
            disconnect: Step::Succeed,
            gated_writes: false,
        }
    }

    pub fn gated() -> Self {
        Self {
            gated_writes: true,
            ..Self::ready()
        }
    }

    pub fn connect(step: Step) -> Self {
        Self {
            connect: step,
            ..Self::ready()
        }
    }

    pub fn discovery(step: Step) -> Self {
        Self {
            discovery: step,
            ..Self::ready()
        }
    }

    pub fn teardown(step: Step) -> Self {
        Self {
            disconnect: step,
            ..Self::ready()
        }
    }
}

/// Transport calls in the order they happened
type Journal = Arc<Mutex<Vec<String>>>;

fn record(journal: &Journal, entry: String) {
    journal.lock().unwrap().push(entry);
}

pub struct MockLink {
    pub address: String,
    discovery: Step,
    teardown: Step,
    journal: Journal,
    write_gate: Semaphore,
    writes: Mutex<Vec<Vec<u8>>>,
    started: watch::Sender<usize>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_writes: AtomicBool,
    lost: watch::Sender<bool>,
    disconnects: AtomicUsize,
}

impl MockLink {
    fn new(address: &str, plan: &LinkPlan, journal: Journal) -> Self {
        let permits = if plan.gated_writes { 0 } else { Semaphore::MAX_PERMITS };
        Self {
            address: address.to_string(),
            discovery: plan.discovery.clone(),
            teardown: plan.disconnect.clone(),
            journal,
            write_gate: Semaphore::new(permits),
            writes: Mutex::new(Vec::new()),
            started: watch::channel(0).0,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            lost: watch::channel(false).0,
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Frames that reached the link, in the order their writes began
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Lets `n` blocked writes complete
    pub fn release_writes(&self, n: usize) {
        self.write_gate.add_permits(n);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn wait_for_writes(&self, n: usize) {
        let mut started = self.started.subscribe();
        tokio::time::timeout(WAIT, started.wait_for(|count| *count >= n))
            .await
            .expect("timed out waiting for writes")
            .expect("write counter closed");
    }

    /// Simulates the lamp going out of range
    pub fn drop_link(&self) {
        self.lost.send_replace(true);
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LampLink for MockLink {
    async fn discover_services(&self) -> Result<()> {
        run_step(&self.discovery).await
    }

    async fn write(&self, frame: &[u8]) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.writes.lock().unwrap().push(frame.to_vec());
        self.started.send_modify(|count| *count += 1);

        if let Ok(permit) = self.write_gate.acquire().await {
            permit.forget();
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("write rejected"));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        record(&self.journal, format!("teardown-start {}", self.address));
        run_step(&self.teardown).await?;
        record(&self.journal, format!("teardown-end {}", self.address));
        Ok(())
    }

    async fn closed(&self) {
        let mut lost = self.lost.subscribe();
        let _ = lost.wait_for(|lost| *lost).await;
    }
}

pub struct MockTransport {
    plans: Mutex<VecDeque<LinkPlan>>,
    connects: Mutex<Vec<String>>,
    links: Mutex<Vec<Arc<MockLink>>>,
    scan_tx: Mutex<Option<mpsc::UnboundedSender<Result<Advertisement>>>>,
    scan_error: Mutex<Option<&'static str>>,
    scans: watch::Sender<usize>,
    journal: Journal,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(VecDeque::new()),
            connects: Mutex::new(Vec::new()),
            links: Mutex::new(Vec::new()),
            scan_tx: Mutex::new(None),
            scan_error: Mutex::new(None),
            scans: watch::channel(0).0,
            journal: Journal::default(),
        })
    }

    /// Queues scripts for upcoming `connect` calls; unscripted calls succeed
    pub fn plan(&self, plan: LinkPlan) {
        self.plans.lock().unwrap().push_back(plan);
    }

    pub fn connect_calls(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub fn links_opened(&self) -> Vec<Arc<MockLink>> {
        self.links.lock().unwrap().clone()
    }

    pub fn link(&self, index: usize) -> Arc<MockLink> {
        self.links.lock().unwrap()[index].clone()
    }

    pub fn last_link(&self) -> Arc<MockLink> {
        self.links
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no link was opened")
    }

    pub fn fail_next_scan(&self, reason: &'static str) {
        *self.scan_error.lock().unwrap() = Some(reason);
    }

    /// Waits until `n` scans have opened their advertisement stream
    pub async fn wait_for_scans(&self, n: usize) {
        let mut scans = self.scans.subscribe();
        let _ = scans.wait_for(|count| *count >= n).await;
    }

    /// Delivers an advertisement to the running scan
    pub fn advertise(&self, address: &str, name: Option<&str>) -> bool {
        let advertisement = Advertisement {
            address: address.to_string(),
            name: name.map(str::to_string),
            handle: DeviceHandle::new(format!("mock/{}", address)),
        };
        match self.scan_tx.lock().unwrap().as_ref() {
            Some(tx) => tx.send(Ok(advertisement)).is_ok(),
            None => false,
        }
    }

    /// Makes the running scan stream report an error
    pub fn break_scan(&self, reason: &'static str) {
        if let Some(tx) = self.scan_tx.lock().unwrap().take() {
            let _ = tx.send(Err(anyhow!(reason)));
        }
    }
}

#[async_trait]
impl LampTransport for MockTransport {
    async fn scan(&self) -> Result<AdvertisementStream> {
        if let Some(reason) = self.scan_error.lock().unwrap().take() {
            return Err(anyhow!(reason));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.scan_tx.lock().unwrap() = Some(tx);
        self.scans.send_modify(|count| *count += 1);

        let advertisements = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(advertisements.boxed())
    }

    async fn connect(&self, address: &str, _handle: Option<&DeviceHandle>) -> Result<Arc<dyn LampLink>> {
        self.connects.lock().unwrap().push(address.to_string());
        record(&self.journal, format!("connect {}", address));
        let plan = self
            .plans
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(LinkPlan::ready);

        run_step(&plan.connect).await?;

        let link = Arc::new(MockLink::new(address, &plan, self.journal.clone()));
        self.links.lock().unwrap().push(link.clone());
        Ok(link)
    }
}

pub fn spawn_manager(transport: &Arc<MockTransport>) -> LampHandle {
    spawn_manager_with(transport, LampConfig::default())
}

pub fn spawn_manager_with(transport: &Arc<MockTransport>, config: LampConfig) -> LampHandle {
    LampManager::spawn(transport.clone(), config)
}

/// Short timeouts for exercising expiry on paused time
pub fn quick_timeouts() -> LampConfig {
    LampConfig {
        connect_timeout_ms: 1_000,
        discovery_timeout_ms: 1_000,
        write_timeout_ms: 500,
        disconnect_timeout_ms: 500,
        ..LampConfig::default()
    }
}

pub async fn wait_for_state(lamp: &LampHandle, state: ConnectionState) {
    let mut states = lamp.watch_state();
    tokio::time::timeout(WAIT, states.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", state))
        .expect("manager stopped");
}

pub async fn next_notification(rx: &mut broadcast::Receiver<LampNotification>) -> LampNotification {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a notification")
        .expect("notification channel closed")
}

/// Polls `condition` until it holds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition never held");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Connects to `address` and waits for `Ready`
pub async fn connect_ready(lamp: &LampHandle, address: &str) {
    lamp.connect(address).await.expect("connect rejected");
    wait_for_state(lamp, ConnectionState::Ready).await;
}
