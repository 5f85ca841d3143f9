//! Radar GATT service
//!
//! One primary service with four one-byte cells: scan angle, measured distance,
//! run/stop flag and alert threshold. Every cell is readable, writable, notifiable and
//! indicatable. Peer writes pass through [`authorize_write`] before they are committed.

use crate::att::{AttError, AttErrorCode, AttPermissions, AttResult, HandleValueUpdate, PendingWrite};
use crate::gatt::{CharacteristicProperty, GattServer, WriteOutcome};
use crate::scan::ANGLE_MAX;
use crate::uuid::Uuid;
use log::{debug, info};
use thiserror::Error;

pub const RADAR_SERVICE_UUID: Uuid = Uuid::from_u128(0x51311102_030e_485f_b122_f8f381aa84ed);
pub const ANGLE_UUID: Uuid = Uuid::from_u128(0x485f4145_52b9_4644_af1f_7a6b9322490f);
pub const DISTANCE_UUID: Uuid = Uuid::from_u128(0x0a924ca7_87cd_4699_a3bd_abdcd9cf126a);
pub const RUNNING_UUID: Uuid = Uuid::from_u128(0x8dd6a1b7_bc75_4741_8a26_264af75807de);
pub const THRESHOLD_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

/// One of the four exposed values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    Angle,
    Distance,
    Running,
    Threshold,
}

impl Cell {
    pub const ALL: [Cell; 4] = [Cell::Angle, Cell::Distance, Cell::Running, Cell::Threshold];

    pub fn uuid(self) -> Uuid {
        match self {
            Cell::Angle => ANGLE_UUID,
            Cell::Distance => DISTANCE_UUID,
            Cell::Running => RUNNING_UUID,
            Cell::Threshold => THRESHOLD_UUID,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Cell::Angle => "angle",
            Cell::Distance => "distance",
            Cell::Running => "running",
            Cell::Threshold => "threshold",
        }
    }

    fn index(self) -> usize {
        match self {
            Cell::Angle => 0,
            Cell::Distance => 1,
            Cell::Running => 2,
            Cell::Threshold => 3,
        }
    }

    /// Whether `value` is in the cell's domain
    pub fn accepts(self, value: u8) -> bool {
        match self {
            Cell::Angle => value <= ANGLE_MAX,
            Cell::Distance | Cell::Running | Cell::Threshold => true,
        }
    }
}

impl std::str::FromStr for Cell {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cell::ALL
            .into_iter()
            .find(|cell| cell.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown cell '{}'", s))
    }
}

/// Why a peer write was refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteRejection {
    #[error("Write at offset {0}, only offset 0 is allowed")]
    InvalidOffset(u16),

    #[error("Write of {0} bytes, cells hold exactly one byte")]
    InvalidLength(usize),

    #[error("Value {value} is out of range for the {} cell", .cell.name())]
    OutOfRange { cell: Cell, value: u8 },
}

impl WriteRejection {
    /// ATT error code reported to the peer
    pub fn error_code(&self) -> AttErrorCode {
        match self {
            WriteRejection::InvalidOffset(_) => AttErrorCode::InvalidOffset,
            WriteRejection::InvalidLength(_) => AttErrorCode::InvalidAttributeValueLength,
            WriteRejection::OutOfRange { .. } => AttErrorCode::WriteNotPermitted,
        }
    }
}

/// Decide whether a peer write to `cell` may be committed.
///
/// Checks run in order and the first failure wins: offset, then length, then range.
pub fn authorize_write(cell: Cell, offset: u16, payload: &[u8]) -> Result<(), WriteRejection> {
    if offset != 0 {
        return Err(WriteRejection::InvalidOffset(offset));
    }
    let value = match payload {
        [value] => *value,
        _ => return Err(WriteRejection::InvalidLength(payload.len())),
    };
    if !cell.accepts(value) {
        return Err(WriteRejection::OutOfRange { cell, value });
    }
    Ok(())
}

/// The registered radar service and the GATT server that hosts it
#[derive(Debug)]
pub struct RadarService {
    server: GattServer,
    service_handle: u16,
    /// Value handles indexed by [`Cell::index`]
    handles: [u16; 4],
}

impl RadarService {
    /// Register the service and its four cells. Every cell starts at 0 except the
    /// threshold, which starts at `initial_threshold`.
    pub fn register(mut server: GattServer, initial_threshold: u8) -> AttResult<Self> {
        let service_handle = server.add_service(RADAR_SERVICE_UUID, true)?;
        let properties = CharacteristicProperty::READ
            | CharacteristicProperty::WRITE
            | CharacteristicProperty::NOTIFY
            | CharacteristicProperty::INDICATE;

        let mut handles = [0u16; 4];
        for cell in Cell::ALL {
            let initial = match cell {
                Cell::Threshold => initial_threshold,
                _ => 0,
            };
            let handle = server.add_characteristic(
                service_handle,
                cell.uuid(),
                properties,
                AttPermissions::read_write_authorized(),
                vec![initial],
            )?;
            server.add_cccd(handle)?;
            server.set_write_authorizer(
                handle,
                Box::new(move |write: &PendingWrite| {
                    authorize_write(cell, write.offset, &write.data)
                        .map_err(|rejection| AttError::Protocol(rejection.error_code(), write.handle))
                }),
            )?;
            debug!("Cell {} registered at handle {}", cell.name(), handle);
            handles[cell.index()] = handle;
        }

        info!("Radar service {} registered at handle {}", RADAR_SERVICE_UUID, service_handle);
        Ok(Self {
            server,
            service_handle,
            handles,
        })
    }

    pub fn service_handle(&self) -> u16 {
        self.service_handle
    }

    /// Value handle of a cell
    pub fn handle(&self, cell: Cell) -> u16 {
        self.handles[cell.index()]
    }

    pub fn cell_for_handle(&self, handle: u16) -> Option<Cell> {
        Cell::ALL.into_iter().find(|cell| self.handle(*cell) == handle)
    }

    /// Current value of a cell
    pub fn read(&self, cell: Cell) -> u8 {
        self.server
            .get_characteristic_value(self.handle(cell))
            .ok()
            .and_then(|value| value.first().copied())
            .unwrap_or_default()
    }

    /// Store a value locally and notify/indicate a subscribed peer
    pub fn publish(&mut self, cell: Cell, value: u8) -> AttResult<()> {
        self.server.update_characteristic(self.handle(cell), &[value])
    }

    /// Apply a peer write. Returns the cell and value when a cell was committed, `None`
    /// for descriptor writes.
    pub fn handle_write(&mut self, write: &PendingWrite) -> AttResult<Option<(Cell, u8)>> {
        match self.server.handle_write(write)? {
            WriteOutcome::Value { handle, value } => Ok(self
                .cell_for_handle(handle)
                .zip(value.first().copied())),
            WriteOutcome::Subscription { .. } => Ok(None),
        }
    }

    /// Serve a peer read of any attribute in the service
    pub fn handle_read(&self, handle: u16) -> AttResult<Vec<u8>> {
        self.server.handle_read(handle)
    }

    /// Take queued notifications and indications
    pub fn drain_updates(&mut self) -> Vec<HandleValueUpdate> {
        self.server.drain_updates()
    }

    pub fn server(&self) -> &GattServer {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut GattServer {
        &mut self.server
    }
}
