//! Attribute Protocol (ATT) attribute model
//!
//! This module provides the attribute layer the GATT server is built on: a
//! handle-addressed attribute database, permission flags, write authorization
//! hooks and the ATT error codes reported back to the peer. PDU encoding and
//! transport belong to the radio stack and are not handled here.

pub mod constants;
pub mod database;
pub mod error;
pub mod types;

// Re-export the public API
pub use self::constants::*;
pub use self::database::{Attribute, AttributeDatabase, WriteAuthorizer};
pub use self::error::{AttError, AttErrorCode, AttResult};
pub use self::types::*;
