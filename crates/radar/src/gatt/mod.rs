//! GATT (Generic Attribute Profile) server
//!
//! This module groups attributes into services and characteristics on top of the
//! ATT attribute database and tracks client subscriptions.

pub mod server;
pub mod types;


pub use server::{GattServer, GattServerConfig, WriteOutcome};
pub use types::{Characteristic, CharacteristicProperty, Service, Subscription};
