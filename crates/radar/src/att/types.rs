//! Type definitions for the ATT layer
use bitflags::bitflags;

bitflags! {
    /// ATT permission flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AttPermissions: u16 {
        const READ = 0x0001;
        const WRITE = 0x0002;
        const WRITE_AUTHORIZED = 0x0080;
    }
}

impl AttPermissions {
    /// Create read-only permissions
    pub fn read_only() -> Self {
        Self::READ
    }

    /// Create read-write permissions
    pub fn read_write() -> Self {
        Self::READ | Self::WRITE
    }

    /// Read-write permissions where every write goes through an authorization hook
    pub fn read_write_authorized() -> Self {
        Self::READ | Self::WRITE | Self::WRITE_AUTHORIZED
    }

    /// Check if read is permitted
    pub fn can_read(&self) -> bool {
        self.contains(Self::READ)
    }

    /// Check if write is permitted
    pub fn can_write(&self) -> bool {
        self.contains(Self::WRITE)
    }

    /// Check if write requires authorization
    pub fn write_requires_authorization(&self) -> bool {
        self.contains(Self::WRITE_AUTHORIZED)
    }
}

/// An inbound write, as surfaced by the radio stack, before it is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    /// Target attribute handle
    pub handle: u16,
    /// Byte offset into the attribute value
    pub offset: u16,
    /// Raw payload
    pub data: Vec<u8>,
}

impl PendingWrite {
    pub fn new(handle: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            handle,
            offset: 0,
            data: data.into(),
        }
    }

    pub fn with_offset(mut self, offset: u16) -> Self {
        self.offset = offset;
        self
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// How an outbound value update reaches the subscribed peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Notification,
    Indication,
}

/// A value update queued for the radio stack to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleValueUpdate {
    /// Handle of the characteristic value
    pub handle: u16,
    /// New value
    pub value: Vec<u8>,
    pub kind: UpdateKind,
}
