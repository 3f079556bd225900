use std::{future::Future, sync::Arc};

use thiserror::Error;

use crate::{ApplianceId, ApplianceRef};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Platform setup failed: {0}")]
    Setup(String),
}

#[derive(Debug, Error)]
#[error("Could not publish state for [{entity}]: {reason}")]
pub struct PublishError {
    pub entity: String,
    pub reason: String,
}

/// A presentation layer object fed from one appliance.
pub trait Entity: Send + Sync {
    fn unique_id(&self) -> &str;

    /// False until the host has finished adding the entity.
    fn is_attached(&self) -> bool;

    fn is_enabled(&self) -> bool {
        true
    }

    fn publish_state(&self) -> Result<(), PublishError>;
}

pub trait HostPlatform: Send + Sync + 'static {
    fn setup_platforms(&self) -> impl Future<Output = Result<(), HostError>> + Send;

    /// Returns false when the host could not unload every platform.
    fn unload_platforms(&self) -> impl Future<Output = bool> + Send;

    /// Builds the entities exposed for a newly discovered appliance.
    fn build_entities(&self, appliance: &ApplianceRef) -> Vec<Arc<dyn Entity>>;

    /// Removes devices and entities of appliances that left the roster.
    fn remove_appliances(&self, appliances: &[ApplianceId]);
}

/// User facing persistent notifications, keyed by a stable id.
pub trait NotificationSink: Send + Sync {
    fn create(&self, id: &str, title: &str, message: &str);

    fn dismiss(&self, id: &str);
}
