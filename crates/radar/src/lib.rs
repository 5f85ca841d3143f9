//! Radar - a BLE sonar radar controller
//!
//! This library sweeps a servo-mounted ultrasonic rangefinder and exposes the scan
//! angle, measured distance, run/stop flag and alert threshold as one-byte GATT
//! characteristics. Hardware is reached through `embedded-hal` traits and the radio
//! stack through the [`att`] and [`gatt`] attribute model.

pub mod att;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod gatt;
pub mod hal;
pub mod scan;
pub mod servo;
pub mod service;
pub mod sonar;
pub mod uuid;

// Re-export common types for convenience
pub use att::{AttError, AttErrorCode, HandleValueUpdate, PendingWrite};
pub use config::{PublishPolicy, RadarConfig, ServoConfig};
pub use controller::ScanController;
pub use dispatch::{Dispatch, EventQueue, Scheduler, TaskId};
pub use error::RadarError;
pub use gatt::{GattServer, GattServerConfig};
pub use scan::{Direction, ScanState};
pub use servo::{pulse_width_us, Servo, ServoError};
pub use service::{authorize_write, Cell, RadarService, WriteRejection};
pub use sonar::{Distance, RangeSensor, Sonar, SonarError};
pub use uuid::Uuid;
