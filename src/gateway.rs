//! Boundary to the gateway session client.
//!
//! The coordinator talks to exactly one adapter implementing [`GatewayClient`];
//! wire protocol, authentication handshake and property encoding live behind it.

use std::{fmt, future::Future, sync::Arc};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::{ApplianceId, ApplianceKind, Credentials, PropertyCode, PropertyValue, Region};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionFailure {
    Timeout,
    Network(String),
    Closed,
    Other(String),
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionFailure::Timeout => f.write_str("timed out"),
            ConnectionFailure::Network(msg) => write!(f, "network failure: {}", msg),
            ConnectionFailure::Closed => f.write_str("connection closed"),
            ConnectionFailure::Other(msg) => f.write_str(msg),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Gateway reported a server error: {0}")]
    Server(String),
    #[error("Connection error: {0}")]
    Connection(ConnectionFailure),
}

impl GatewayError {
    /// Authentication failures need user action and are never retried.
    pub fn is_transient(&self) -> bool {
        !matches!(self, GatewayError::Authentication(_))
    }
}

/// Session scoped view of one appliance, owned by the gateway client.
pub trait ApplianceState: Send + Sync + fmt::Debug {
    fn id(&self) -> &ApplianceId;

    /// `None` when the gateway could not determine what this appliance is.
    fn kind(&self) -> Option<ApplianceKind>;

    /// True once the first full property snapshot has been received.
    fn is_initialized(&self) -> bool;

    fn known_properties(&self) -> Vec<PropertyCode>;

    fn property(&self, code: &PropertyCode) -> Option<PropertyValue>;
}

pub type ApplianceRef = Arc<dyn ApplianceState>;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    RosterReceived(Vec<ApplianceRef>),
    ApplianceInitialUpdate(ApplianceRef),
    ApplianceUpdate {
        appliance: ApplianceRef,
        changed: Vec<(PropertyCode, PropertyValue)>,
    },
}

#[derive(Debug)]
pub(crate) enum Inbound {
    Session(SessionEvent),
    RosterTimeout,
}

#[derive(Debug)]
pub(crate) struct Envelope {
    pub generation: u64,
    pub inbound: Inbound,
}

/// Event subscription handed to a session when it is built.
///
/// Every sink is bound to one session generation; the coordinator drops
/// anything arriving from an older generation.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Delivers an event. Returns false once the coordinator is gone.
    pub fn emit(&self, event: SessionEvent) -> bool {
        self.tx
            .send(Envelope {
                generation: self.generation,
                inbound: Inbound::Session(event),
            })
            .is_ok()
    }

    pub(crate) fn roster_timeout(&self) -> bool {
        self.tx
            .send(Envelope {
                generation: self.generation,
                inbound: Inbound::RosterTimeout,
            })
            .is_ok()
    }
}

pub trait GatewayClient: Send + Sync + 'static {
    type Session: GatewaySession;

    /// Exchanges credentials and starts a new session that reports through `events`.
    ///
    /// Returns once the credentials were accepted; `Connected` follows
    /// asynchronously on the sink.
    fn connect(
        &self,
        credentials: &Credentials,
        region: Region,
        events: EventSink,
    ) -> impl Future<Output = Result<Self::Session, GatewayError>> + Send;
}

pub trait GatewaySession: Send + Sync + 'static {
    fn is_connected(&self) -> bool;

    fn is_available(&self) -> bool;

    fn request_state_refresh(
        &self,
        appliance: &ApplianceId,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn disconnect(&self) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Drops every event subscription. Must be safe to call more than once.
    fn clear_event_handlers(&self);
}
