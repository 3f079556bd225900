use std::{
    ops::{Deref, DerefMut},
    time::Duration,
};

use rand::{distr::Alphanumeric, rng, RngExt};
use rumqttc::{AsyncClient, ClientError, MqttOptions, QoS};

use crate::{ApplianceId, ConnectionFailure, Credentials, GatewayError, Region, VendorProfile};

impl From<ClientError> for GatewayError {
    fn from(err: ClientError) -> Self {
        log::debug!("Mqtt request failed: {}", err);
        GatewayError::Connection(ConnectionFailure::Closed)
    }
}

#[derive(Debug, Clone)]
pub struct MqttGatewayConfig {
    pub hostname: String,
    pub port: u16,
    pub topic_prefix: String,
    pub client_id: Option<String>,
    pub vendor: VendorProfile,
    pub mqtt_channel_size: usize,
    pub keep_alive: u64,
    pub max_packet_size_incoming: usize,
    pub max_packet_size_outgoing: usize,
}

impl MqttGatewayConfig {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: 1883,
            topic_prefix: "smarthq".to_owned(),
            client_id: None,
            vendor: VendorProfile::Standard,
            mqtt_channel_size: 1024,
            keep_alive: 5,
            max_packet_size_incoming: 512 * 1024,
            max_packet_size_outgoing: 512 * 1024,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        let id = client_id.into();
        if id.len() > 23 {
            log::warn!(
                "Warning, client id [{}] exceeds 23 (<{}) character length limit of mqtt spec!",
                id,
                id.len()
            );
        }
        self.client_id = Some(id);
        self
    }

    pub fn vendor(mut self, vendor: VendorProfile) -> Self {
        self.vendor = vendor;
        self
    }

    pub fn mqtt_channel_size(mut self, mqtt_channel_size: usize) -> Self {
        self.mqtt_channel_size = mqtt_channel_size;
        self
    }

    pub fn keep_alive(mut self, keep_alive: u64) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn max_packet_size(mut self, incoming: usize, outgoing: usize) -> Self {
        self.max_packet_size_incoming = incoming;
        self.max_packet_size_outgoing = outgoing;
        self
    }

    pub fn roster_topic(&self) -> String {
        format!("{}/roster", self.topic_prefix)
    }

    pub fn state_filter(&self) -> String {
        format!("{}/+/state", self.topic_prefix)
    }

    pub fn refresh_topic(&self, appliance: &ApplianceId) -> String {
        format!("{}/{}/refresh", self.topic_prefix, appliance)
    }

    pub fn to_mqtt_options(&self, credentials: &Credentials, region: Region) -> MqttOptions {
        let client_id = match &self.client_id {
            Some(id) => id.clone(),
            None => format!(
                "smarthq-{}-{}",
                match region {
                    Region::US => "us",
                    Region::EU => "eu",
                },
                rng()
                    .sample_iter(&Alphanumeric)
                    .take(12)
                    .map(char::from)
                    .collect::<String>()
            ),
        };
        let mut mqttoptions = MqttOptions::new(client_id, self.hostname.to_owned(), self.port);
        if !credentials.username.is_empty() && !credentials.password.is_empty() {
            mqttoptions.set_credentials(
                credentials.username.to_owned(),
                credentials.password.to_owned(),
            );
        }
        mqttoptions.set_keep_alive(Duration::from_secs(self.keep_alive));
        mqttoptions.set_clean_session(true);
        mqttoptions
            .set_max_packet_size(self.max_packet_size_incoming, self.max_packet_size_outgoing);
        mqttoptions
    }
}

#[derive(Debug, Clone)]
pub struct SmartHqMqttClient(AsyncClient);

impl Deref for SmartHqMqttClient {
    type Target = AsyncClient;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SmartHqMqttClient {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl SmartHqMqttClient {
    pub fn new(mqtt_client: AsyncClient) -> Self {
        Self(mqtt_client)
    }

    pub async fn subscribe_gateway(&self, config: &MqttGatewayConfig) -> Result<(), ClientError> {
        self.0
            .subscribe(config.roster_topic(), QoS::AtLeastOnce)
            .await?;
        self.0
            .subscribe(config.state_filter(), QoS::AtLeastOnce)
            .await?;
        Ok(())
    }

    pub async fn request_refresh(
        &self,
        config: &MqttGatewayConfig,
        appliance: &ApplianceId,
    ) -> Result<(), ClientError> {
        self.0
            .publish(
                config.refresh_topic(appliance),
                QoS::AtLeastOnce,
                false,
                Vec::<u8>::new(),
            )
            .await
    }
}
