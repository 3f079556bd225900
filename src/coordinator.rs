//! Session lifecycle management.
//!
//! The [`Coordinator`] owns the single gateway session of an account. Session
//! events are delivered through one unbounded channel and handled in order by
//! a long lived event pump. Every session is built with a new generation
//! number; events carrying an older generation are dropped, so two sessions
//! never feed the coordinator at the same time.
//!
//! Session creation and teardown are serialized by the lifecycle lock. The
//! reconnection supervisor takes that lock for its rebuild attempts; the
//! event pump never does, which keeps the pump free to stop other tasks.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, watch},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    gateway::{Envelope, Inbound},
    poller, propagate, supervisor, ApplianceId, ApplianceRef, ApplianceRegistry, ApplianceWrapper,
    BackgroundTask, ConfigError, ConnectionFailure, CoordinatorConfig, EventSink, GateDecision,
    GatewayClient, GatewayError, GatewaySession, HostError, HostPlatform, NotificationSink, Notifier, PropertyCode, PropertyValue, PublishSummary, ReadinessGate,
    RegistryUpdate, RetryPolicy, RetryState, SessionEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Absent,
    Connecting,
    Connected,
    Disconnected,
    Reconnecting { attempt: u32 },
}

#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// The readiness gate of the current session opened.
    Ready {
        appliances: Vec<Arc<ApplianceWrapper>>,
    },
    /// An appliance delivered its first snapshot after the gate had opened.
    ApplianceAdded(Arc<ApplianceWrapper>),
    AppliancesRemoved(Vec<ApplianceId>),
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Authentication failure, re-authentication required: {0}")]
    NeedsReauth(GatewayError),
    #[error("Cannot connect to the gateway: {0}")]
    NotReady(GatewayError),
    #[error(transparent)]
    Host(#[from] HostError),
}

impl From<GatewayError> for SetupError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Authentication(_) => SetupError::NeedsReauth(err),
            other => SetupError::NotReady(other),
        }
    }
}

pub(crate) enum ReconnectOutcome {
    Started,
    AlreadyHealthy,
    Cancelled,
    Failed(GatewayError),
}

struct SessionState<S> {
    session: Option<Arc<S>>,
    generation: u64,
    gate: ReadinessGate,
    registry: ApplianceRegistry,
    retry: RetryState,
    last_update_success: bool,
    last_outage_refresh: Option<Instant>,
}

struct Inner<G: GatewayClient, H: HostPlatform> {
    config: CoordinatorConfig,
    retry_policy: RetryPolicy,
    gateway: G,
    host: H,
    notifier: Notifier,
    state: Mutex<SessionState<G::Session>>,
    lifecycle: tokio::sync::Mutex<()>,
    inbound_tx: mpsc::UnboundedSender<Envelope>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    pump: BackgroundTask,
    supervisor: BackgroundTask,
    poller: BackgroundTask,
    roster_timer: BackgroundTask,
    events: broadcast::Sender<CoordinatorEvent>,
    connection: watch::Sender<ConnectionState>,
}

/// Coordinates the gateway session of one account.
///
/// Cheaply cloneable. Call [`stop`](Self::stop) or
/// [`shutdown`](Self::shutdown) before dropping the last handle, background
/// tasks keep the coordinator alive until then.
pub struct Coordinator<G: GatewayClient, H: HostPlatform> {
    inner: Arc<Inner<G, H>>,
}

impl<G: GatewayClient, H: HostPlatform> Clone for Coordinator<G, H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<G: GatewayClient, H: HostPlatform> Coordinator<G, H> {
    pub fn new(
        config: CoordinatorConfig,
        gateway: G,
        host: H,
        notifications: Arc<dyn NotificationSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_channel_size);
        let (connection, _) = watch::channel(ConnectionState::Absent);
        Ok(Self {
            inner: Arc::new(Inner {
                retry_policy: RetryPolicy::from(&config),
                config,
                gateway,
                host,
                notifier: Notifier::new(notifications),
                state: Mutex::new(SessionState {
                    session: None,
                    generation: 0,
                    gate: ReadinessGate::new(),
                    registry: ApplianceRegistry::new(),
                    retry: RetryState::new(),
                    last_update_success: false,
                    last_outage_refresh: None,
                }),
                lifecycle: tokio::sync::Mutex::new(()),
                inbound_tx,
                inbound_rx: Mutex::new(Some(inbound_rx)),
                pump: BackgroundTask::new("event-pump"),
                supervisor: BackgroundTask::new("reconnect-supervisor"),
                poller: BackgroundTask::new("periodic-poller"),
                roster_timer: BackgroundTask::new("roster-timer"),
                events,
                connection,
            }),
        })
    }

    // --- accessors ---

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn host(&self) -> &H {
        &self.inner.host
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.inner.events.subscribe()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.connection.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state()
            .session
            .as_ref()
            .map(|s| s.is_connected())
            .unwrap_or(false)
    }

    pub fn is_available(&self) -> bool {
        self.state()
            .session
            .as_ref()
            .map(|s| s.is_available())
            .unwrap_or(false)
    }

    /// Connected, or not yet retried often enough to be considered offline.
    pub fn is_online(&self) -> bool {
        self.is_connected() || self.retry_attempts() <= self.inner.config.offline_after_retries
    }

    pub fn is_ready(&self) -> bool {
        self.state().gate.is_ready()
    }

    pub fn last_update_success(&self) -> bool {
        self.state().last_update_success
    }

    pub fn retry_attempts(&self) -> u32 {
        self.state().retry.attempts()
    }

    pub fn appliances(&self) -> Vec<Arc<ApplianceWrapper>> {
        self.state().registry.wrappers()
    }

    pub fn appliance(&self, id: &ApplianceId) -> Option<Arc<ApplianceWrapper>> {
        self.state().registry.get(id).cloned()
    }

    pub fn is_supervisor_running(&self) -> bool {
        self.inner.supervisor.is_running()
    }

    pub fn is_poller_running(&self) -> bool {
        self.inner.poller.is_running()
    }

    /// Number of active background tasks, the event pump included.
    pub fn active_tasks(&self) -> usize {
        [
            &self.inner.pump,
            &self.inner.supervisor,
            &self.inner.poller,
            &self.inner.roster_timer,
        ]
        .iter()
        .filter(|t| t.is_running())
        .count()
    }

    // --- integration lifecycle ---

    /// Sets up the host platforms and starts the first session.
    pub async fn setup(&self) -> Result<(), SetupError> {
        log::debug!("Setting up the coordinator");
        self.inner.host.setup_platforms().await?;
        self.start().await.map_err(SetupError::from)
    }

    /// Stops everything, forgets all appliances, dismisses notifications and
    /// unloads the host platforms.
    pub async fn shutdown(&self) -> bool {
        log::debug!("Resetting the coordinator");
        self.stop().await;
        {
            let mut state = self.state();
            state.registry.clear();
            state.last_outage_refresh = None;
        }
        self.inner.notifier.dismiss_all();
        self.inner.host.unload_platforms().await
    }

    /// Tears down any existing session and starts a new one.
    pub async fn start(&self) -> Result<(), GatewayError> {
        for task in [
            &self.inner.pump,
            &self.inner.supervisor,
            &self.inner.poller,
            &self.inner.roster_timer,
        ] {
            task.open();
        }
        self.ensure_pump().await;
        let _guard = self.inner.lifecycle.lock().await;
        self.start_locked().await
    }

    /// Stops all background tasks and tears down the session. Idempotent.
    pub async fn stop(&self) {
        let _guard = self.inner.lifecycle.lock().await;
        self.inner.supervisor.close().await;
        self.inner.poller.close().await;
        self.inner.roster_timer.close().await;
        self.teardown_session().await;
        self.state().retry.reset();
        self.set_connection(ConnectionState::Absent);
        self.inner.pump.close().await;
        log::debug!("Coordinator stopped");
    }

    /// Marks the session connected and ends any reconnection attempts.
    pub async fn handle_connected(&self) {
        {
            let mut state = self.state();
            state.last_update_success = true;
            state.retry.reset();
        }
        self.set_connection(ConnectionState::Connected);
        self.inner.supervisor.stop().await;
        self.inner
            .notifier
            .dismiss(&self.inner.config.connection_notification_id());
        self.inner
            .notifier
            .dismiss(&self.inner.config.auth_notification_id());
        log::info!("Gateway session connected");
    }

    /// Marks the session disconnected and starts the reconnection supervisor
    /// unless it is already running.
    pub async fn handle_disconnected(&self) {
        self.state().last_update_success = false;
        self.set_connection(ConnectionState::Disconnected);
        log::debug!("Gateway session has been disconnected, starting reconnection attempts.");
        let coordinator = self.clone();
        self.inner
            .supervisor
            .ensure_running(move |cancel| supervisor::supervise(coordinator, cancel))
            .await;
    }

    /// Opens the readiness gate of the current session regardless of missing
    /// initial updates. Returns false if it was already open or there is no
    /// session.
    pub async fn force_ready(&self) -> bool {
        let generation = self.generation();
        let decision = self.with_current(generation, |state| {
            state.session.as_ref()?;
            Some(state.gate.force_open())
        });
        match decision.flatten() {
            Some(GateDecision::Fired) => {
                self.on_ready(generation).await;
                true
            }
            _ => false,
        }
    }

    /// Starts the periodic poller for the current session. No-op while it runs.
    pub async fn start_polling(&self) -> bool {
        self.spawn_poller(self.generation()).await
    }

    /// Publishes the state of every attached entity of every appliance.
    pub fn refresh_all(&self) -> PublishSummary {
        propagate::publish_all(&self.appliances())
    }

    // --- session construction ---

    async fn start_locked(&self) -> Result<(), GatewayError> {
        self.teardown_session().await;

        let generation = self.generation();
        self.set_connection(ConnectionState::Connecting);
        let config = &self.inner.config;
        let sink = EventSink::new(generation, self.inner.inbound_tx.clone());
        let connect = self
            .inner
            .gateway
            .connect(&config.credentials, config.region, sink);
        let result = match tokio::time::timeout(config.connect_timeout, connect).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Connection(ConnectionFailure::Timeout)),
        };

        match result {
            Ok(session) => {
                self.state().session = Some(Arc::new(session));
                log::debug!("Started gateway session (generation {})", generation);
                Ok(())
            }
            Err(err) => {
                log::error!("Could not start the gateway session: {}", err);
                self.set_connection(ConnectionState::Disconnected);
                Err(err)
            }
        }
    }

    /// Detaches and disconnects the current session and resets per-session state.
    async fn teardown_session(&self) {
        let session = {
            let mut state = self.state();
            state.generation += 1;
            state.gate = ReadinessGate::new();
            state.registry.mark_all_uninitialized();
            state.session.take()
        };
        self.inner.roster_timer.stop().await;
        self.inner.poller.stop().await;

        if let Some(session) = session {
            log::debug!("Tearing down gateway session");
            session.clear_event_handlers();
            if let Err(err) = session.disconnect().await {
                log::warn!("Error disconnecting gateway session: {}", err);
            }
        }
    }

    // --- event pump ---

    async fn ensure_pump(&self) {
        let coordinator = self.clone();
        self.inner
            .pump
            .ensure_running(move |cancel| coordinator.run_pump(cancel))
            .await;
    }

    async fn run_pump(self, cancel: CancellationToken) {
        let Some(mut rx) = self
            .inner
            .inbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            log::error!("Event receiver already taken, event pump not started");
            return;
        };

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                envelope = rx.recv() => match envelope {
                    Some(envelope) => self.dispatch(envelope).await,
                    None => break,
                }
            }
        }

        *self
            .inner
            .inbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(rx);
    }

    async fn dispatch(&self, envelope: Envelope) {
        let Envelope {
            generation,
            inbound,
        } = envelope;
        if generation != self.generation() {
            log::debug!(
                "Dropping event from stale session generation {}: {:?}",
                generation,
                inbound
            );
            return;
        }

        match inbound {
            Inbound::Session(SessionEvent::Connected) => self.handle_connected().await,
            Inbound::Session(SessionEvent::Disconnected) => self.handle_disconnected().await,
            Inbound::Session(SessionEvent::RosterReceived(appliances)) => {
                self.on_roster(generation, appliances).await
            }
            Inbound::Session(SessionEvent::ApplianceInitialUpdate(appliance)) => {
                self.on_initial_update(generation, appliance).await
            }
            Inbound::Session(SessionEvent::ApplianceUpdate { appliance, changed }) => {
                self.on_update(generation, appliance, changed)
            }
            Inbound::RosterTimeout => self.on_roster_timeout(generation).await,
        }
    }

    async fn on_roster(&self, generation: u64, appliances: Vec<ApplianceRef>) {
        log::debug!("Got roster update ({} appliances)", appliances.len());
        let roster: BTreeSet<ApplianceId> = appliances.iter().map(|a| a.id().clone()).collect();
        let Some(decision) = self.with_current(generation, |state| {
            state.last_update_success = true;
            state.gate.roster_received(roster)
        }) else {
            return;
        };

        match decision {
            GateDecision::Fired => self.on_ready(generation).await,
            GateDecision::Pending => {
                let sink = EventSink::new(generation, self.inner.inbound_tx.clone());
                let timeout = self.inner.config.roster_timeout;
                self.inner
                    .roster_timer
                    .restart(move |cancel| wait_for_roster(sink, timeout, cancel))
                    .await;
            }
            GateDecision::AlreadyFired => self.remove_stale(generation),
        }
    }

    async fn on_roster_timeout(&self, generation: u64) {
        let Some((decision, missing)) = self.with_current(generation, |state| {
            let missing = state.gate.missing();
            (state.gate.force_open(), missing)
        }) else {
            return;
        };
        if decision == GateDecision::Fired {
            log::warn!(
                "Timeout waiting for initial appliance updates, still missing: {:?}",
                missing
            );
            self.on_ready(generation).await;
        }
    }

    async fn on_initial_update(&self, generation: u64, appliance: ApplianceRef) {
        dump_appliance(&appliance);
        let id = appliance.id().clone();
        let valid = appliance.kind().is_some();
        if !valid {
            log::debug!("on_initial_update: skipping invalid appliance {}", id);
        }

        let Some(known) = self.with_current(generation, |state| state.registry.contains(&id))
        else {
            return;
        };
        let entities = if valid && !known {
            self.inner.host.build_entities(&appliance)
        } else {
            Vec::new()
        };

        let Some((update, decision)) = self.with_current(generation, |state| {
            state.last_update_success = true;
            let update = valid.then(|| {
                let update = state.registry.get_or_create(appliance, |_| entities);
                update.wrapper().set_initialized(true);
                update
            });
            (update, state.gate.appliance_ready(id.clone()))
        }) else {
            return;
        };
        log::debug!("Got initial update for {}", id);

        match (update, decision) {
            (Some(RegistryUpdate::Added(wrapper)), GateDecision::AlreadyFired) => {
                let _ = self.inner.events.send(CoordinatorEvent::ApplianceAdded(wrapper));
            }
            (_, GateDecision::Fired) => self.on_ready(generation).await,
            _ => {}
        }
    }

    fn on_update(
        &self,
        generation: u64,
        appliance: ApplianceRef,
        changed: Vec<(PropertyCode, PropertyValue)>,
    ) {
        let id = appliance.id();
        let Some(wrapper) = self.with_current(generation, |state| {
            state.last_update_success = true;
            state.registry.get(id).cloned()
        }) else {
            return;
        };
        if appliance.kind().is_none() {
            log::debug!("on_update: skipping invalid appliance {}", id);
            return;
        }
        let Some(wrapper) = wrapper else {
            log::info!("Could not find appliance {} in known appliance list.", id);
            return;
        };

        let changed_codes = wrapper.record_changes(changed);
        log::debug!("Update for {}, changed: {:?}", id, changed_codes);
        propagate::publish_entities(wrapper.entities());
    }

    /// Runs once per session when the readiness gate opens.
    async fn on_ready(&self, generation: u64) {
        self.inner.roster_timer.stop().await;
        self.remove_stale(generation);

        let Some(appliances) = self.with_current(generation, |state| state.registry.wrappers())
        else {
            return;
        };
        log::debug!(
            "Ready to go, sending ready signal! ({} appliances)",
            appliances.len()
        );
        let _ = self.inner.events.send(CoordinatorEvent::Ready { appliances });
        self.spawn_poller(generation).await;
    }

    /// Starts the poller for `generation` unless that session is gone. A poller
    /// left over from an older session is replaced.
    async fn spawn_poller(&self, generation: u64) -> bool {
        if self.with_current(generation, |_| ()).is_none() {
            return false;
        }
        let coordinator = self.clone();
        self.inner
            .poller
            .ensure_running_for(generation, move |cancel| {
                poller::poll_appliances(coordinator, generation, cancel)
            })
            .await
    }

    /// Drops wrappers of appliances that are not part of the current roster.
    fn remove_stale(&self, generation: u64) {
        let Some(removed) = self.with_current(generation, |state| match state.gate.roster() {
            Some(roster) => {
                let roster = roster.clone();
                state.registry.retain_only(&roster)
            }
            None => Vec::new(),
        }) else {
            return;
        };
        if removed.is_empty() {
            return;
        }

        let ids: Vec<ApplianceId> = removed.iter().map(|w| w.id().clone()).collect();
        for wrapper in &removed {
            log::info!("Removing stale appliance {} ({})", wrapper.name(), wrapper.id());
        }
        self.inner.host.remove_appliances(&ids);
        let _ = self.inner.events.send(CoordinatorEvent::AppliancesRemoved(ids));
    }

    // --- helpers used by the supervisor and the poller ---

    fn state(&self) -> MutexGuard<'_, SessionState<G::Session>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the session state if `generation` is still current.
    fn with_current<R>(
        &self,
        generation: u64,
        f: impl FnOnce(&mut SessionState<G::Session>) -> R,
    ) -> Option<R> {
        let mut state = self.state();
        if state.generation != generation {
            log::debug!("Session generation {} is gone, ignoring", generation);
            return None;
        }
        Some(f(&mut *state))
    }

    fn set_connection(&self, connection: ConnectionState) {
        self.inner.connection.send_replace(connection);
    }

    pub(crate) fn generation(&self) -> u64 {
        self.state().generation
    }

    /// A session exists and is connecting or connected.
    pub(crate) fn is_healthy(&self) -> bool {
        self.state().session.is_some()
            && matches!(
                self.connection_state(),
                ConnectionState::Connecting | ConnectionState::Connected
            )
    }

    /// The current session if it can serve refresh requests.
    pub(crate) fn polling_session(&self) -> Option<Arc<G::Session>> {
        let session = self.state().session.clone();
        match session {
            Some(session) if session.is_connected() && session.is_available() => Some(session),
            Some(session) => {
                log::debug!(
                    "Connection issue, cannot get update (connected: {}, available: {})",
                    session.is_connected(),
                    session.is_available()
                );
                None
            }
            None => {
                log::debug!("No gateway session, cannot get update");
                None
            }
        }
    }

    /// Counts a reconnect attempt and returns it with the delay to wait before it.
    pub(crate) fn begin_retry(&self) -> (u32, Duration) {
        let attempt = self.state().retry.next_attempt();
        self.set_connection(ConnectionState::Reconnecting { attempt });
        (attempt, self.inner.retry_policy.random_delay(attempt))
    }

    pub(crate) async fn reconnect(&self, cancel: &CancellationToken) -> ReconnectOutcome {
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ReconnectOutcome::Cancelled,
            guard = self.inner.lifecycle.lock() => guard,
        };
        if cancel.is_cancelled() {
            return ReconnectOutcome::Cancelled;
        }
        if self.is_healthy() {
            return ReconnectOutcome::AlreadyHealthy;
        }
        match self.start_locked().await {
            Ok(()) => ReconnectOutcome::Started,
            Err(err) => ReconnectOutcome::Failed(err),
        }
    }

    pub(crate) fn notify_auth_failure(&self) {
        self.inner.notifier.show(
            &self.inner.config.auth_notification_id(),
            "Appliance Gateway Connection",
            "Authentication failure: please re-authenticate the appliance integration.",
        );
    }

    pub(crate) fn maybe_notify_outage(&self, attempt: u32) {
        let config = &self.inner.config;
        let notify = self.state().retry.should_notify(
            Instant::now(),
            config.notify_after_retries,
            config.notification_interval,
        );
        if notify {
            self.inner.notifier.show(
                &config.connection_notification_id(),
                "Appliance Gateway: connection issues",
                &format!(
                    "Unable to connect after {} attempts. Will continue retrying automatically.",
                    attempt
                ),
            );
        }
    }

    /// Republishes all entities during an outage, at most once per interval.
    pub(crate) fn throttled_outage_refresh(&self) {
        let now = Instant::now();
        let due = {
            let mut state = self.state();
            let due = state
                .last_outage_refresh
                .map(|last| {
                    now.saturating_duration_since(last) > self.inner.config.outage_refresh_interval
                })
                .unwrap_or(true);
            if due {
                state.last_outage_refresh = Some(now);
            }
            due
        };
        if due {
            self.refresh_all();
        }
    }
}

async fn wait_for_roster(sink: EventSink, timeout: Duration, cancel: CancellationToken) {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(timeout) => {
            sink.roster_timeout();
        }
    }
}

fn dump_appliance(appliance: &ApplianceRef) {
    if log::log_enabled!(log::Level::Debug) {
        log::debug!("--- APPLIANCE DUMP: {} ---", appliance.id());
        log::debug!("{:#?}", appliance);
        let properties: Vec<(PropertyCode, Option<PropertyValue>)> = appliance
            .known_properties()
            .into_iter()
            .map(|code| (code, appliance.property(&code)))
            .collect();
        log::debug!("{:#?}", properties);
    }
}
