//! FOTA wire protocol - status reports, fragment framing and sequencing

pub mod ble;
mod sequencer;

pub use sequencer::{FragmentSequencer, chunk};

/// Number of payload bytes in a single binary stream write, excluding the fragment id
pub const FRAGMENT_SIZE: usize = 128;

/// Largest fragment id before it wraps back to zero
pub const MAXIMUM_FRAGMENT_ID: u8 = 255;

/// Status codes notified on the status characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    UpdateSuccessful = 0x01,
    Xoff = 0x02,
    Xon = 0x03,
    SyncLost = 0x04,
    UnspecifiedError = 0x05,
    ValidationFailure = 0x06,
    InstallationFailure = 0x07,
    OutOfMemory = 0x08,
    MemoryError = 0x09,
    HardwareError = 0x0a,
    NoFotaSession = 0x0b,
}

impl Status {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::Ok,
            0x01 => Self::UpdateSuccessful,
            0x02 => Self::Xoff,
            0x03 => Self::Xon,
            0x04 => Self::SyncLost,
            0x05 => Self::UnspecifiedError,
            0x06 => Self::ValidationFailure,
            0x07 => Self::InstallationFailure,
            0x08 => Self::OutOfMemory,
            0x09 => Self::MemoryError,
            0x0a => Self::HardwareError,
            0x0b => Self::NoFotaSession,
            _ => return None,
        })
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether the device reports that something went wrong on its side
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::UnspecifiedError
                | Self::ValidationFailure
                | Self::InstallationFailure
                | Self::OutOfMemory
                | Self::MemoryError
                | Self::HardwareError
                | Self::NoFotaSession
        )
    }

    /// Flow control reports carry the device's current fragment id as a second byte
    pub fn carries_fragment_id(self) -> bool {
        matches!(self, Self::Xoff | Self::Xon | Self::SyncLost)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::UpdateSuccessful => "UPDATE_SUCCESSFUL",
            Self::Xoff => "XOFF",
            Self::Xon => "XON",
            Self::SyncLost => "SYNC_LOST",
            Self::UnspecifiedError => "UNSPECIFIED_ERROR",
            Self::ValidationFailure => "VALIDATION_FAILURE",
            Self::InstallationFailure => "INSTALLATION_FAILURE",
            Self::OutOfMemory => "OUT_OF_MEMORY",
            Self::MemoryError => "MEMORY_ERROR",
            Self::HardwareError => "HARDWARE_ERROR",
            Self::NoFotaSession => "NO_FOTA_SESSION",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty status notification")]
    Empty,
    #[error("unknown status code 0x{0:02x}")]
    UnknownStatus(u8),
    #[error("{0} report is missing its fragment id")]
    MissingFragmentId(Status),
}

/// A single notification from the status characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub status: Status,
    /// Present for XOFF, XON and SYNC_LOST
    pub fragment_id: Option<u8>,
}

impl StatusReport {
    pub fn new(status: Status, fragment_id: Option<u8>) -> Self {
        Self { status, fragment_id }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2);
        buf.push(self.status.as_byte());
        if let Some(id) = self.fragment_id {
            buf.push(id);
        }
        buf
    }

    /// Parse a raw notification. Only the bytes the status defines are read;
    /// anything after them is ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        let (&code, rest) = data.split_first().ok_or(ParseError::Empty)?;
        let status = Status::from_byte(code).ok_or(ParseError::UnknownStatus(code))?;

        if !status.carries_fragment_id() {
            return Ok(Self { status, fragment_id: None });
        }

        let fragment_id = *rest.first().ok_or(ParseError::MissingFragmentId(status))?;
        Ok(Self { status, fragment_id: Some(fragment_id) })
    }
}

/// One binary stream write: the wrapping fragment id followed by its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    pub fragment_id: u8,
    pub payload: &'a [u8],
}

impl<'a> Fragment<'a> {
    pub fn new(fragment_id: u8, payload: &'a [u8]) -> Self {
        Self { fragment_id, payload }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.payload.len());
        buf.push(self.fragment_id);
        buf.extend_from_slice(self.payload);
        buf
    }

    pub fn from_bytes(data: &'a [u8]) -> Option<Self> {
        let (&fragment_id, payload) = data.split_first()?;
        Some(Self { fragment_id, payload })
    }
}
