//! Gateway adapter for local bridges that publish appliance state over MQTT.
//!
//! Topic layout below the configured prefix:
//! - `<prefix>/roster`: JSON array of `{"mac": .., "kind": ..}`
//! - `<prefix>/<mac>/state`: JSON object mapping property codes to hex bytes
//! - `<prefix>/<mac>/refresh`: published with an empty payload to request a full state

use std::{
    collections::{BTreeMap, HashMap},
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Outgoing, Packet, Publish,
};
use serde::Deserialize;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    ApplianceId, ApplianceKind, ApplianceRef, ApplianceState, CodecTable, ConnectionFailure,
    Credentials, EventSink, GatewayClient, GatewayError, GatewaySession, MqttGatewayConfig,
    PropertyCode, PropertyValue, Region, SessionEvent, SmartHqMqttClient,
};

#[derive(Debug)]
pub struct MqttAppliance {
    id: ApplianceId,
    kind: Option<ApplianceKind>,
    initialized: AtomicBool,
    properties: Mutex<BTreeMap<PropertyCode, PropertyValue>>,
}

impl MqttAppliance {
    pub fn new(id: ApplianceId, kind: Option<ApplianceKind>) -> Self {
        Self {
            id,
            kind: kind.filter(|k| *k != ApplianceKind::Unknown),
            initialized: AtomicBool::new(false),
            properties: Mutex::new(BTreeMap::new()),
        }
    }

    /// Stores decoded values and returns those that differ from the stored ones.
    pub fn apply(
        &self,
        values: impl IntoIterator<Item = (PropertyCode, PropertyValue)>,
    ) -> Vec<(PropertyCode, PropertyValue)> {
        let mut properties = self
            .properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut changed = Vec::new();
        for (code, value) in values {
            if properties.get(&code) != Some(&value) {
                properties.insert(code, value.clone());
                changed.push((code, value));
            }
        }
        changed
    }

    /// Marks the appliance initialized. Returns true on the first call.
    fn mark_initialized(&self) -> bool {
        !self.initialized.swap(true, Ordering::SeqCst)
    }
}

impl ApplianceState for MqttAppliance {
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
        self.properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    fn property(&self, code: &PropertyCode) -> Option<PropertyValue> {
        self.properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(code)
            .cloned()
    }
}

#[derive(Debug, Deserialize)]
struct RosterEntry {
    mac: ApplianceId,
    #[serde(default)]
    kind: Option<ApplianceKind>,
}

#[derive(Debug, PartialEq, Eq)]
enum GatewayTopic<'a> {
    Roster,
    State(&'a str),
}

fn parse_topic<'a>(prefix: &str, topic: &'a str) -> Option<GatewayTopic<'a>> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    if rest == "roster" {
        return Some(GatewayTopic::Roster);
    }
    match rest.split_once('/') {
        Some((mac, "state")) if !mac.is_empty() => Some(GatewayTopic::State(mac)),
        _ => None,
    }
}

fn map_return_code(code: ConnectReturnCode) -> GatewayError {
    match code {
        ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized => {
            GatewayError::Authentication(format!("broker refused credentials ({:?})", code))
        }
        ConnectReturnCode::ServiceUnavailable => {
            GatewayError::Server("broker unavailable".to_owned())
        }
        other => GatewayError::Connection(ConnectionFailure::Other(format!(
            "connection refused ({:?})",
            other
        ))),
    }
}

fn map_connection_error(err: ConnectionError) -> GatewayError {
    match err {
        ConnectionError::ConnectionRefused(code) => map_return_code(code),
        other => GatewayError::Connection(ConnectionFailure::Network(other.to_string())),
    }
}

/// State shared between a session handle and its event loop task.
#[derive(Debug)]
struct SessionShared {
    config: MqttGatewayConfig,
    codecs: CodecTable,
    sink: Mutex<Option<EventSink>>,
    connected: AtomicBool,
    available: AtomicBool,
    appliances: Mutex<HashMap<ApplianceId, Arc<MqttAppliance>>>,
}

impl SessionShared {
    fn emit(&self, event: SessionEvent) {
        let sink = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match sink {
            Some(sink) => {
                sink.emit(event);
            }
            None => log::trace!("Event handlers cleared, dropping {:?}", event),
        }
    }

    fn handle_publish(&self, publish: &Publish) {
        match parse_topic(&self.config.topic_prefix, &publish.topic) {
            Some(GatewayTopic::Roster) => self.handle_roster(publish),
            Some(GatewayTopic::State(mac)) => self.handle_state(ApplianceId::from(mac), publish),
            None => log::trace!("Ignoring message on [{}]", publish.topic),
        }
    }

    fn handle_roster(&self, publish: &Publish) {
        let entries: Vec<RosterEntry> = match serde_json::from_slice(&publish.payload) {
            Ok(entries) => entries,
            Err(err) => {
                log::error!(
                    "Error parsing roster message.\n  Topic: [{}]\n  Payload: [{:?}]\n  Error: {}",
                    publish.topic,
                    publish.payload,
                    err
                );
                return;
            }
        };

        let roster: Vec<ApplianceRef> = {
            let mut appliances = self
                .appliances
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            entries
                .into_iter()
                .map(|entry| {
                    let appliance = appliances
                        .entry(entry.mac.clone())
                        .or_insert_with(|| Arc::new(MqttAppliance::new(entry.mac, entry.kind)))
                        .clone();
                    appliance as ApplianceRef
                })
                .collect()
        };
        self.available.store(true, Ordering::SeqCst);
        self.emit(SessionEvent::RosterReceived(roster));
    }

    fn handle_state(&self, id: ApplianceId, publish: &Publish) {
        let Some(appliance) = self
            .appliances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
        else {
            log::debug!("State for appliance {} which is not in the roster, ignoring", id);
            return;
        };

        let raw: HashMap<String, String> = match serde_json::from_slice(&publish.payload) {
            Ok(raw) => raw,
            Err(err) => {
                log::error!(
                    "Error parsing state message.\n  Topic: [{}]\n  Payload: [{:?}]\n  Error: {}",
                    publish.topic,
                    publish.payload,
                    err
                );
                return;
            }
        };
        let values = raw.iter().filter_map(|(code, hex)| {
            let code = PropertyCode::from_str(code)
                .inspect_err(|err| log::warn!("{} on appliance {}", err, id))
                .ok()?;
            self.codecs
                .decode_hex(&code, hex)
                .inspect_err(|err| log::warn!("Cannot decode {} of {}: {}", code, id, err))
                .ok()
                .map(|value| (code, value))
        });
        let changed = appliance.apply(values);

        if appliance.mark_initialized() {
            self.emit(SessionEvent::ApplianceInitialUpdate(appliance));
        } else if !changed.is_empty() {
            self.emit(SessionEvent::ApplianceUpdate {
                appliance,
                changed,
            });
        }
    }
}

async fn run_event_loop(
    shared: Arc<SessionShared>,
    mut eventloop: EventLoop,
    mut stop_receiver: watch::Receiver<bool>,
) {
    shared.emit(SessionEvent::Connected);
    loop {
        let poll_res = tokio::select! {
            changed = stop_receiver.changed() => {
                if changed.is_err() || *stop_receiver.borrow() {
                    log::trace!("Received stop signal. Exiting...");
                    break;
                }
                continue;
            }
            poll_res = eventloop.poll() => poll_res,
        };

        match poll_res {
            Ok(Event::Incoming(Packet::Publish(p))) => shared.handle_publish(&p),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                log::trace!("SMARTHQ: Connection closed from our side.");
                shared.connected.store(false, Ordering::SeqCst);
                shared.emit(SessionEvent::Disconnected);
                break;
            }
            Ok(_) => {}
            Err(err) => {
                log::warn!("SMARTHQ: Mqtt connection lost: {}", err);
                shared.connected.store(false, Ordering::SeqCst);
                shared.available.store(false, Ordering::SeqCst);
                shared.emit(SessionEvent::Disconnected);
                break;
            }
        }
    }
    log::trace!("Exiting smarthq mqtt eventloop...");
}

#[derive(Debug, Clone)]
pub struct MqttGateway {
    config: MqttGatewayConfig,
}

impl MqttGateway {
    pub fn new(config: MqttGatewayConfig) -> Self {
        Self { config }
    }
}

impl GatewayClient for MqttGateway {
    type Session = MqttSession;

    async fn connect(
        &self,
        credentials: &Credentials,
        region: Region,
        events: EventSink,
    ) -> Result<MqttSession, GatewayError> {
        let mqttoptions = self.config.to_mqtt_options(credentials, region);
        log::trace!("Connecting to mqtt: {}", mqttoptions.client_id());
        let (mqtt_client, mut eventloop) =
            AsyncClient::new(mqttoptions, self.config.mqtt_channel_size);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        break;
                    }
                    return Err(map_return_code(ack.code));
                }
                Ok(_) => {}
                Err(err) => return Err(map_connection_error(err)),
            }
        }

        let client = SmartHqMqttClient::new(mqtt_client);
        client.subscribe_gateway(&self.config).await?;

        let shared = Arc::new(SessionShared {
            codecs: self.config.vendor.codec_table(),
            config: self.config.clone(),
            sink: Mutex::new(Some(events)),
            connected: AtomicBool::new(true),
            available: AtomicBool::new(false),
            appliances: Mutex::new(HashMap::new()),
        });
        let (stop_sender, stop_receiver) = watch::channel(false);
        let handle = tokio::task::spawn(run_event_loop(shared.clone(), eventloop, stop_receiver));

        Ok(MqttSession {
            client,
            shared,
            stop_sender,
            handle: Mutex::new(Some(handle)),
        })
    }
}

pub struct MqttSession {
    client: SmartHqMqttClient,
    shared: Arc<SessionShared>,
    stop_sender: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl GatewaySession for MqttSession {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn is_available(&self) -> bool {
        self.shared.available.load(Ordering::SeqCst)
    }

    async fn request_state_refresh(&self, appliance: &ApplianceId) -> Result<(), GatewayError> {
        self.client
            .request_refresh(&self.shared.config, appliance)
            .await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        if let Err(err) = self.client.disconnect().await {
            log::debug!("Mqtt disconnect request failed: {}", err);
        }
        let _ = self.stop_sender.send(true);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.await.map_err(|err| {
                GatewayError::Connection(ConnectionFailure::Other(format!(
                    "Error waiting for mqtt event loop to complete: {}",
                    err
                )))
            })?;
        }
        Ok(())
    }

    fn clear_event_handlers(&self) {
        self.shared
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_parsed_below_the_prefix() {
        assert_eq!(
            parse_topic("smarthq", "smarthq/roster"),
            Some(GatewayTopic::Roster)
        );
        assert_eq!(
            parse_topic("smarthq", "smarthq/D828C9000001/state"),
            Some(GatewayTopic::State("D828C9000001"))
        );
        assert_eq!(parse_topic("smarthq", "smarthq/D828C9000001/refresh"), None);
        assert_eq!(parse_topic("smarthq", "other/roster"), None);
        assert_eq!(parse_topic("smarthq", "smarthq//state"), None);
    }

    #[test]
    fn refused_credentials_are_authentication_errors() {
        assert!(matches!(
            map_return_code(ConnectReturnCode::BadUserNamePassword),
            GatewayError::Authentication(_)
        ));
        assert!(matches!(
            map_return_code(ConnectReturnCode::NotAuthorized),
            GatewayError::Authentication(_)
        ));
        assert!(matches!(
            map_return_code(ConnectReturnCode::ServiceUnavailable),
            GatewayError::Server(_)
        ));
        assert!(matches!(
            map_return_code(ConnectReturnCode::BadClientId),
            GatewayError::Connection(_)
        ));
    }

    #[test]
    fn apply_reports_only_changed_values() {
        let appliance = MqttAppliance::new(ApplianceId::from("aa"), Some(ApplianceKind::Hood));
        let first = appliance.apply([
            (PropertyCode::SABBATH_MODE, PropertyValue::Bool(false)),
            (PropertyCode::MODEL_NUMBER, PropertyValue::Text("PVX7300".into())),
        ]);
        assert_eq!(first.len(), 2);

        let second = appliance.apply([
            (PropertyCode::SABBATH_MODE, PropertyValue::Bool(true)),
            (PropertyCode::MODEL_NUMBER, PropertyValue::Text("PVX7300".into())),
        ]);
        assert_eq!(
            second,
            vec![(PropertyCode::SABBATH_MODE, PropertyValue::Bool(true))]
        );
        assert_eq!(
            appliance.property(&PropertyCode::SABBATH_MODE),
            Some(PropertyValue::Bool(true))
        );
    }

    #[test]
    fn unknown_kind_is_invalid() {
        let appliance = MqttAppliance::new(ApplianceId::from("bb"), Some(ApplianceKind::Unknown));
        assert_eq!(appliance.kind(), None);
    }
}
