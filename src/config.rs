use std::{fmt, time::Duration};

use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
    #[error("min_retry_delay ({min:?}) must not exceed max_retry_delay ({max:?})")]
    RetryDelayRange { min: Duration, max: Duration },
    #[error("retry_jitter must be within [0, 1], got {0}")]
    JitterOutOfRange(f64),
}

#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Region {
    #[default]
    US,
    EU,
}

/// Settings of one coordinator instance (one configured account).
///
/// Durations are given in seconds (fractions allowed) when deserialized.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Used to namespace notification ids.
    pub name: String,
    pub credentials: Credentials,
    pub region: Region,
    #[serde(deserialize_with = "secs")]
    pub poll_interval: Duration,
    #[serde(deserialize_with = "secs")]
    pub connect_timeout: Duration,
    #[serde(deserialize_with = "secs")]
    pub min_retry_delay: Duration,
    #[serde(deserialize_with = "secs")]
    pub max_retry_delay: Duration,
    /// Fraction of the nominal retry delay used as symmetric random jitter.
    pub retry_jitter: f64,
    /// Failed attempts before the user is told about the outage.
    pub notify_after_retries: u32,
    #[serde(deserialize_with = "secs")]
    pub notification_interval: Duration,
    #[serde(deserialize_with = "secs")]
    pub roster_timeout: Duration,
    pub offline_after_retries: u32,
    #[serde(deserialize_with = "secs")]
    pub outage_refresh_interval: Duration,
    pub event_channel_size: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            name: "smarthq".to_owned(),
            credentials: Credentials::default(),
            region: Region::US,
            poll_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            min_retry_delay: Duration::from_secs(15),
            max_retry_delay: Duration::from_secs(1800),
            retry_jitter: 0.2,
            notify_after_retries: 5,
            notification_interval: Duration::from_secs(300),
            roster_timeout: Duration::from_secs(60),
            offline_after_retries: 5,
            outage_refresh_interval: Duration::from_secs(60),
            event_channel_size: 64,
        }
    }
}

impl CoordinatorConfig {
    // Builder methods

    /// Create a new instance with the given credentials and default optional fields
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn retry_delays(mut self, min: Duration, max: Duration) -> Self {
        self.min_retry_delay = min;
        self.max_retry_delay = max;
        self
    }

    pub fn retry_jitter(mut self, retry_jitter: f64) -> Self {
        self.retry_jitter = retry_jitter;
        self
    }

    pub fn notify_after_retries(mut self, retries: u32) -> Self {
        self.notify_after_retries = retries;
        self
    }

    pub fn notification_interval(mut self, interval: Duration) -> Self {
        self.notification_interval = interval;
        self
    }

    pub fn roster_timeout(mut self, roster_timeout: Duration) -> Self {
        self.roster_timeout = roster_timeout;
        self
    }

    pub fn offline_after_retries(mut self, retries: u32) -> Self {
        self.offline_after_retries = retries;
        self
    }

    pub fn outage_refresh_interval(mut self, interval: Duration) -> Self {
        self.outage_refresh_interval = interval;
        self
    }

    pub fn event_channel_size(mut self, size: usize) -> Self {
        self.event_channel_size = size;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("poll_interval", self.poll_interval),
            ("connect_timeout", self.connect_timeout),
            ("min_retry_delay", self.min_retry_delay),
            ("roster_timeout", self.roster_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroInterval(name));
            }
        }
        if self.event_channel_size == 0 {
            return Err(ConfigError::ZeroInterval("event_channel_size"));
        }
        if self.min_retry_delay > self.max_retry_delay {
            return Err(ConfigError::RetryDelayRange {
                min: self.min_retry_delay,
                max: self.max_retry_delay,
            });
        }
        if !(0.0..=1.0).contains(&self.retry_jitter) {
            return Err(ConfigError::JitterOutOfRange(self.retry_jitter));
        }
        Ok(())
    }

    pub fn connection_notification_id(&self) -> String {
        format!("{}_connection", self.name)
    }

    pub fn auth_notification_id(&self) -> String {
        format!("{}_authentication", self.name)
    }
}

fn secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
