//! Error types for the radar library

use crate::att::AttError;
use thiserror::Error;

/// Errors that stop the controller from being built
#[derive(Error, Debug)]
pub enum RadarError {
    /// The radar service could not be added to the GATT server; the scan loop is
    /// never scheduled
    #[error("Failed to register radar service: {0}")]
    ServiceRegistration(#[source] AttError),

    #[error("Attribute error: {0}")]
    Att(#[from] AttError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RadarError>;
