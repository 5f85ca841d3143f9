//! ATT error codes and the attribute layer's error type
use thiserror::Error;

/// Error code carried in an ATT Error Response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttErrorCode {
    InvalidHandle,
    ReadNotPermitted,
    WriteNotPermitted,
    InvalidOffset,
    InsufficientAuthorization,
    AttributeNotFound,
    InvalidAttributeValueLength,
    Unlikely,
    InsufficientResources,
    /// Common profile error: a CCCD write asked for an unsupported mode
    CccdImproperlyConfigured,
    /// Application (0x80..=0x9F) or unassigned code
    Other(u8),
}

/// Wire value of every named code
const WIRE_CODES: [(AttErrorCode, u8); 10] = [
    (AttErrorCode::InvalidHandle, 0x01),
    (AttErrorCode::ReadNotPermitted, 0x02),
    (AttErrorCode::WriteNotPermitted, 0x03),
    (AttErrorCode::InvalidOffset, 0x07),
    (AttErrorCode::InsufficientAuthorization, 0x08),
    (AttErrorCode::AttributeNotFound, 0x0A),
    (AttErrorCode::InvalidAttributeValueLength, 0x0D),
    (AttErrorCode::Unlikely, 0x0E),
    (AttErrorCode::InsufficientResources, 0x11),
    (AttErrorCode::CccdImproperlyConfigured, 0xFD),
];

impl From<u8> for AttErrorCode {
    fn from(wire: u8) -> Self {
        WIRE_CODES
            .iter()
            .find(|(_, value)| *value == wire)
            .map_or(AttErrorCode::Other(wire), |(code, _)| *code)
    }
}

impl From<AttErrorCode> for u8 {
    fn from(code: AttErrorCode) -> u8 {
        if let AttErrorCode::Other(wire) = code {
            return wire;
        }
        WIRE_CODES
            .iter()
            .find(|(named, _)| *named == code)
            .map_or(0x0E, |(_, wire)| *wire)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttError {
    /// A code raised by a write authorizer or a profile check, tied to a handle
    #[error("request on handle {1} refused with {0:?}")]
    Protocol(AttErrorCode, u16),

    #[error("no such attribute")]
    AttributeNotFound,

    #[error("attribute is not readable")]
    ReadNotPermitted,

    #[error("attribute is not writable")]
    WriteNotPermitted,

    #[error("handle {0} is not in the database")]
    InvalidHandle(u16),

    #[error("offset {0} is past the end of the value")]
    InvalidOffset(u16),

    #[error("value has the wrong length for this attribute")]
    InvalidAttributeValueLength,

    #[error("write was not authorized")]
    InsufficientAuthorization,

    #[error("attribute handles exhausted")]
    InsufficientResources,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl AttError {
    /// Code to put in the Error Response
    pub fn to_error_code(&self) -> AttErrorCode {
        match self {
            AttError::Protocol(code, _) => *code,
            AttError::AttributeNotFound => AttErrorCode::AttributeNotFound,
            AttError::ReadNotPermitted => AttErrorCode::ReadNotPermitted,
            AttError::WriteNotPermitted => AttErrorCode::WriteNotPermitted,
            AttError::InvalidHandle(_) => AttErrorCode::InvalidHandle,
            AttError::InvalidOffset(_) => AttErrorCode::InvalidOffset,
            AttError::InvalidAttributeValueLength => AttErrorCode::InvalidAttributeValueLength,
            AttError::InsufficientAuthorization => AttErrorCode::InsufficientAuthorization,
            AttError::InsufficientResources => AttErrorCode::InsufficientResources,
            AttError::InvalidParameter(_) => AttErrorCode::Unlikely,
        }
    }

    pub fn handle(&self) -> Option<u16> {
        match self {
            AttError::Protocol(_, handle) | AttError::InvalidHandle(handle) => Some(*handle),
            _ => None,
        }
    }
}

pub type AttResult<T> = Result<T, AttError>;
