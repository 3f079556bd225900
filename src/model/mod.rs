mod appliance;
mod property;
mod property_value_store;

pub use appliance::*;
pub use property::*;
pub use property_value_store::*;
