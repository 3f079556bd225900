mod appliance;
mod backoff;
mod codec;
mod config;
mod coordinator;
mod gateway;
mod host;
mod model;
#[cfg(feature = "mqtt")]
mod mqtt_client;
#[cfg(feature = "mqtt")]
mod mqtt_gateway;
mod notify;
mod poller;
mod propagate;
mod property_value_store;
mod readiness;
mod registry;
mod supervisor;
mod task;

pub use appliance::*;
pub use backoff::*;
pub use codec::*;
pub use config::*;
pub use coordinator::{ConnectionState, Coordinator, CoordinatorEvent, SetupError};
pub use gateway::*;
pub use host::*;
pub use model::*;
#[cfg(feature = "mqtt")]
pub use mqtt_client::*;
#[cfg(feature = "mqtt")]
pub use mqtt_gateway::*;
pub use notify::*;
pub use propagate::*;
pub use property_value_store::*;
pub use readiness::*;
pub use registry::*;
pub use task::*;
