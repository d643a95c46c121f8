//! The GATT operations a FOTA session needs from a connected device

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::TransportError;
use crate::status::StatusNotificationHandler;

// FOTA characteristics share the vendor base 5388xxxx-65fd-4651-ba8e-91527f06c887
pub const FOTA_SERVICE_UUID: Uuid = Uuid::from_u128(0x53880000_65fd_4651_ba8e_91527f06c887);
/// Write without response, one fragment per write: `[fragment id][payload]`
pub const BINARY_STREAM_UUID: Uuid = Uuid::from_u128(0x53880001_65fd_4651_ba8e_91527f06c887);
/// Write with response, one op code per write
pub const CONTROL_UUID: Uuid = Uuid::from_u128(0x53880002_65fd_4651_ba8e_91527f06c887);
/// Notify
pub const STATUS_UUID: Uuid = Uuid::from_u128(0x53880003_65fd_4651_ba8e_91527f06c887);
pub const VERSION_UUID: Uuid = Uuid::from_u128(0x53880004_65fd_4651_ba8e_91527f06c887);

// Bluetooth SIG assigned numbers 0x2A26, 0x180A and 0x2901
pub const FIRMWARE_REVISION_STRING_UUID: Uuid =
    Uuid::from_u128(0x00002a26_0000_1000_8000_00805f9b34fb);
pub const DEVICE_INFORMATION_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
pub const USER_DESCRIPTION_UUID: Uuid = Uuid::from_u128(0x00002901_0000_1000_8000_00805f9b34fb);

/// A connected device with its services discovered
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether `service` exposes `characteristic`
    fn has_characteristic(&self, service: Uuid, characteristic: Uuid) -> bool;

    async fn read(&self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, TransportError>;

    /// Read a descriptor of a characteristic; `None` if the characteristic has no such descriptor
    async fn read_descriptor(
        &self,
        service: Uuid,
        characteristic: Uuid,
        descriptor: Uuid,
    ) -> Result<Option<Vec<u8>>, TransportError>;

    async fn write(
        &self,
        characteristic: Uuid,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError>;

    /// Enable notifications on `characteristic` and deliver each one to `handler`
    async fn subscribe(
        &self,
        characteristic: Uuid,
        handler: Arc<StatusNotificationHandler>,
    ) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}
