use std::path::PathBuf;

use fota_proto::Status;
use uuid::Uuid;

use crate::session::SessionState;

/// Failures of the underlying GATT link
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Ble(#[from] btleplug::Error),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error("device is not connected")]
    NotConnected,
}

#[derive(Debug, thiserror::Error)]
pub enum FotaError {
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error("no device named {0:?} found")]
    TransportNotFound(String),
    #[error("failed to connect to {address} after {attempts} attempts")]
    ConnectionFailed { address: String, attempts: u32 },
    #[error("FOTA session failed to start: no XON after {attempts} timeouts")]
    HandshakeTimeout { attempts: u32 },
    /// A single fragment write stalled. The streaming loop recovers from this
    /// by sending the same fragment again, so a session never returns it.
    #[error("binary stream write timed out")]
    WriteTimeout,
    #[error("firmware revision characteristic not found")]
    RevisionNotFound,
    #[error("could not read firmware image {path}: {source}")]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("device reported {0}")]
    DeviceStatus(Status),
    #[error("session is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<btleplug::Error> for FotaError {
    fn from(e: btleplug::Error) -> Self {
        Self::Transport(e.into())
    }
}
