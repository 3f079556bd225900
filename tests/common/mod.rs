#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use hc_smarthq::*;

// --- appliances ---

#[derive(Debug)]
pub struct MockAppliance {
    id: ApplianceId,
    kind: Option<ApplianceKind>,
    initialized: AtomicBool,
    properties: Mutex<BTreeMap<PropertyCode, PropertyValue>>,
}

impl MockAppliance {
    pub fn new(id: &str, kind: Option<ApplianceKind>) -> Arc<Self> {
        Arc::new(Self {
            id: ApplianceId::from(id),
            kind,
            initialized: AtomicBool::new(true),
            properties: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn dishwasher(id: &str) -> Arc<Self> {
        Self::new(id, Some(ApplianceKind::Dishwasher))
    }

    pub fn set(&self, code: PropertyCode, value: PropertyValue) {
        self.properties.lock().unwrap().insert(code, value);
    }
}

impl ApplianceState for MockAppliance {
    fn id(&self) -> &ApplianceId {
        &self.id
    }

    fn kind(&self) -> Option<ApplianceKind> {
        self.kind
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn known_properties(&self) -> Vec<PropertyCode> {
        self.properties.lock().unwrap().keys().copied().collect()
    }

    fn property(&self, code: &PropertyCode) -> Option<PropertyValue> {
        self.properties.lock().unwrap().get(code).cloned()
    }
}

pub fn appliance_ref(appliance: &Arc<MockAppliance>) -> ApplianceRef {
    appliance.clone()
}

// --- gateway ---

#[derive(Debug)]
pub struct SessionControl {
    pub sink: EventSink,
    pub connected: AtomicBool,
    pub available: AtomicBool,
    pub handlers_cleared: AtomicBool,
    pub disconnects: AtomicUsize,
    pub refreshes: Mutex<Vec<ApplianceId>>,
    pub failing: Mutex<HashSet<ApplianceId>>,
}

impl SessionControl {
    /// Emits through the session's subscription unless handlers were cleared.
    pub fn emit(&self, event: SessionEvent) -> bool {
        if self.handlers_cleared.load(Ordering::SeqCst) {
            return false;
        }
        self.sink.emit(event)
    }

    pub fn roster(&self, appliances: &[&Arc<MockAppliance>]) {
        self.emit(SessionEvent::RosterReceived(
            appliances.iter().map(|a| appliance_ref(a)).collect(),
        ));
    }

    pub fn initial(&self, appliance: &Arc<MockAppliance>) {
        self.emit(SessionEvent::ApplianceInitialUpdate(appliance_ref(appliance)));
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.lock().unwrap().len()
    }

    pub fn refreshed(&self, id: &str) -> usize {
        self.refreshes
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.as_str() == id)
            .count()
    }
}

pub struct MockSession {
    control: Arc<SessionControl>,
}

impl GatewaySession for MockSession {
    fn is_connected(&self) -> bool {
        self.control.connected.load(Ordering::SeqCst)
    }

    fn is_available(&self) -> bool {
        self.control.available.load(Ordering::SeqCst)
    }

    async fn request_state_refresh(&self, appliance: &ApplianceId) -> Result<(), GatewayError> {
        self.control.refreshes.lock().unwrap().push(appliance.clone());
        if self.control.failing.lock().unwrap().contains(appliance) {
            return Err(GatewayError::Server("refresh rejected".into()));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        self.control.connected.store(false, Ordering::SeqCst);
        self.control.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear_event_handlers(&self) {
        self.control.handlers_cleared.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct GatewayControl {
    pub connects: AtomicUsize,
    pub script: Mutex<VecDeque<Result<(), GatewayError>>>,
    pub sessions: Mutex<Vec<Arc<SessionControl>>>,
    pub connect_delay: Mutex<Option<Duration>>,
    pub no_auto_connected: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MockGateway {
    pub control: Arc<GatewayControl>,
}

impl MockGateway {
    pub fn connects(&self) -> usize {
        self.control.connects.load(Ordering::SeqCst)
    }

    /// Queues results for the next connect calls; an empty queue connects.
    pub fn script(&self, results: impl IntoIterator<Item = Result<(), GatewayError>>) {
        self.control.script.lock().unwrap().extend(results);
    }

    pub fn session(&self, index: usize) -> Arc<SessionControl> {
        self.control.sessions.lock().unwrap()[index].clone()
    }

    pub fn latest(&self) -> Arc<SessionControl> {
        self.control
            .sessions
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no session connected yet")
    }

    pub fn session_count(&self) -> usize {
        self.control.sessions.lock().unwrap().len()
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.control.connect_delay.lock().unwrap() = Some(delay);
    }
}

impl GatewayClient for MockGateway {
    type Session = MockSession;

    async fn connect(
        &self,
        _credentials: &Credentials,
        _region: Region,
        events: EventSink,
    ) -> Result<MockSession, GatewayError> {
        self.control.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.control.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.control.script.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(()))?;

        let control = Arc::new(SessionControl {
            sink: events,
            connected: AtomicBool::new(true),
            available: AtomicBool::new(true),
            handlers_cleared: AtomicBool::new(false),
            disconnects: AtomicUsize::new(0),
            refreshes: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        });
        self.control.sessions.lock().unwrap().push(control.clone());
        if !self.control.no_auto_connected.load(Ordering::SeqCst) {
            control.emit(SessionEvent::Connected);
        }
        Ok(MockSession { control })
    }
}

// --- host ---

pub struct MockEntity {
    pub unique_id: String,
    pub attached: AtomicBool,
    pub enabled: AtomicBool,
    pub failing: AtomicBool,
    pub publishes: AtomicUsize,
}

impl MockEntity {
    pub fn new(unique_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            unique_id: unique_id.into(),
            attached: AtomicBool::new(true),
            enabled: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            publishes: AtomicUsize::new(0),
        })
    }

    pub fn publishes(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }
}

impl Entity for MockEntity {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn publish_state(&self) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError {
                entity: self.unique_id.clone(),
                reason: "host rejected state".into(),
            });
        }
        self.publishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct HostControl {
    pub built: Mutex<Vec<ApplianceId>>,
    pub removed: Mutex<Vec<ApplianceId>>,
    pub entities: Mutex<HashMap<ApplianceId, Arc<MockEntity>>>,
    pub fail_setup: AtomicBool,
    pub setups: AtomicUsize,
    pub unloaded: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MockHost {
    pub control: Arc<HostControl>,
}

impl MockHost {
    pub fn built(&self) -> Vec<ApplianceId> {
        self.control.built.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<ApplianceId> {
        self.control.removed.lock().unwrap().clone()
    }

    pub fn entity(&self, id: &str) -> Arc<MockEntity> {
        self.control.entities.lock().unwrap()[&ApplianceId::from(id)].clone()
    }
}

impl HostPlatform for MockHost {
    async fn setup_platforms(&self) -> Result<(), HostError> {
        self.control.setups.fetch_add(1, Ordering::SeqCst);
        if self.control.fail_setup.load(Ordering::SeqCst) {
            return Err(HostError::Setup("platform missing".into()));
        }
        Ok(())
    }

    async fn unload_platforms(&self) -> bool {
        self.control.unloaded.store(true, Ordering::SeqCst);
        true
    }

    fn build_entities(&self, appliance: &ApplianceRef) -> Vec<Arc<dyn Entity>> {
        let entity = MockEntity::new(format!("{}_state", appliance.id()));
        self.control.built.lock().unwrap().push(appliance.id().clone());
        self.control
            .entities
            .lock()
            .unwrap()
            .insert(appliance.id().clone(), entity.clone());
        vec![entity]
    }

    fn remove_appliances(&self, appliances: &[ApplianceId]) {
        self.control
            .removed
            .lock()
            .unwrap()
            .extend(appliances.iter().cloned());
    }
}

// --- notifications ---

#[derive(Default)]
pub struct RecordingNotifications {
    pub created: Mutex<Vec<(String, String, String)>>,
    pub dismissed: Mutex<Vec<String>>,
}

impl RecordingNotifications {
    pub fn created_ids(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _, _)| id.clone())
            .collect()
    }

    pub fn dismissed_ids(&self) -> Vec<String> {
        self.dismissed.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingNotifications {
    fn create(&self, id: &str, title: &str, message: &str) {
        self.created
            .lock()
            .unwrap()
            .push((id.to_owned(), title.to_owned(), message.to_owned()));
    }

    fn dismiss(&self, id: &str) {
        self.dismissed.lock().unwrap().push(id.to_owned());
    }
}

// --- harness ---

pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig::new(Credentials::new("user@example.com", "secret"))
        .name("test")
        .poll_interval(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .retry_delays(Duration::from_secs(1), Duration::from_secs(8))
        .retry_jitter(0.0)
        .notify_after_retries(2)
        .notification_interval(Duration::from_secs(300))
        .roster_timeout(Duration::from_secs(30))
        .offline_after_retries(2)
        .outage_refresh_interval(Duration::from_secs(60))
}

pub struct Harness {
    pub coordinator: Coordinator<MockGateway, MockHost>,
    pub gateway: MockGateway,
    pub host: MockHost,
    pub notifications: Arc<RecordingNotifications>,
}

pub fn harness_with(config: CoordinatorConfig) -> Harness {
    let gateway = MockGateway::default();
    let host = MockHost::default();
    let notifications = Arc::new(RecordingNotifications::default());
    let coordinator = Coordinator::new(
        config,
        gateway.clone(),
        host.clone(),
        notifications.clone(),
    )
    .expect("valid test config");
    Harness {
        coordinator,
        gateway,
        host,
        notifications,
    }
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

/// Lets spawned tasks run without advancing the paused clock.
pub async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}

/// Advances the paused clock by `duration` and lets tasks settle.
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}

/// Starts the coordinator and completes the roster handshake for `appliances`.
pub async fn start_ready(harness: &Harness, appliances: &[&Arc<MockAppliance>]) {
    harness.coordinator.start().await.expect("start");
    settle().await;
    let session = harness.gateway.latest();
    session.roster(appliances);
    for appliance in appliances {
        session.initial(appliance);
    }
    settle().await;
}

pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<CoordinatorEvent>) -> Vec<CoordinatorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn ready_count(events: &[CoordinatorEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, CoordinatorEvent::Ready { .. }))
        .count()
}
