//! 128-bit Bluetooth UUIDs

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Bluetooth base UUID `00000000-0000-1000-8000-00805f9b34fb`; SIG-assigned 16-bit
/// values sit in bits 96..112.
const BASE: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;
const SHORT_SHIFT: u32 = 96;
const SHORT_MASK: u128 = 0xFFFF_FFFF << SHORT_SHIFT;

/// A UUID held as its numeric value, most significant byte first as written.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uuid(u128);

impl Uuid {
    /// `Uuid::from_u128(0x51311102_030e_485f_b122_f8f381aa84ed)` is
    /// `51311102-030e-485f-b122-f8f381aa84ed`.
    pub const fn from_u128(value: u128) -> Self {
        Uuid(value)
    }

    /// Expand a SIG-assigned 16-bit value onto the base UUID
    pub const fn from_u16(short: u16) -> Self {
        Uuid(BASE | ((short as u128) << SHORT_SHIFT))
    }

    /// The 16-bit short form, if this is a SIG-assigned UUID
    pub fn as_u16(&self) -> Option<u16> {
        let short = (self.0 & SHORT_MASK) >> SHORT_SHIFT;
        if self.0 & !SHORT_MASK != BASE {
            return None;
        }
        u16::try_from(short).ok()
    }

    /// Little-endian bytes, the order used on the air
    pub fn to_bytes_le(&self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    /// Shortest air encoding: 2 bytes for SIG-assigned UUIDs, 16 otherwise
    pub fn to_att_bytes(&self) -> Vec<u8> {
        match self.as_u16() {
            Some(short) => short.to_le_bytes().to_vec(),
            None => self.to_bytes_le().to_vec(),
        }
    }
}

impl From<u16> for Uuid {
    fn from(short: u16) -> Self {
        Uuid::from_u16(short)
    }
}

impl PartialEq<u16> for Uuid {
    fn eq(&self, other: &u16) -> bool {
        self.as_u16() == Some(*other)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            v >> 96,
            (v >> 80) & 0xFFFF,
            (v >> 64) & 0xFFFF,
            (v >> 48) & 0xFFFF,
            v & 0xFFFF_FFFF_FFFF
        )
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_u16() {
            Some(short) => write!(f, "Uuid(0x{:04X})", short),
            None => write!(f, "Uuid({})", self),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum UuidParseError {
    #[error("UUID must have 4 or 32 hex digits, got {0}")]
    InvalidLength(usize),
    #[error("UUID contains a character that is not a hex digit or hyphen")]
    InvalidCharacter,
    #[error("UUID hex decoding failed: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl FromStr for Uuid {
    type Err = UuidParseError;

    /// Accepts the hyphenated 128-bit form or a bare 4-digit short form
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
            return Err(UuidParseError::InvalidCharacter);
        }
        let digits: String = s.chars().filter(|c| *c != '-').collect();

        match digits.len() {
            4 => {
                let mut short = [0u8; 2];
                hex::decode_to_slice(&digits, &mut short)?;
                Ok(Uuid::from_u16(u16::from_be_bytes(short)))
            }
            32 => {
                let mut bytes = [0u8; 16];
                hex::decode_to_slice(&digits, &mut bytes)?;
                Ok(Uuid(u128::from_be_bytes(bytes)))
            }
            n => Err(UuidParseError::InvalidLength(n)),
        }
    }
}
