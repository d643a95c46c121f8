//! Firmware revision probe
//!
//! The revision is read from the Firmware Revision String characteristic of
//! the FOTA service when it has one, else from the Device Information service.
//! A device with several FOTA services tells them apart through the optional
//! user description of the scoped characteristic.

use log::*;

use crate::error::FotaError;
use crate::transport::{
    DEVICE_INFORMATION_SERVICE_UUID, FIRMWARE_REVISION_STRING_UUID, FOTA_SERVICE_UUID,
    Transport, USER_DESCRIPTION_UUID,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareRevision {
    pub revision: String,
    /// Which embedded device runs this firmware, if the device says
    pub description: Option<String>,
}

impl std::fmt::Display for FirmwareRevision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{} for device \"{description}\"", self.revision),
            None => f.write_str(&self.revision),
        }
    }
}

fn decode(value: &[u8]) -> String {
    String::from_utf8_lossy(value).trim_end_matches('\0').to_string()
}

pub async fn read_firmware_revision<T: Transport + ?Sized>(
    transport: &T,
) -> Result<FirmwareRevision, FotaError> {
    let scoped = transport.has_characteristic(FOTA_SERVICE_UUID, FIRMWARE_REVISION_STRING_UUID);
    let in_device_information = transport
        .has_characteristic(DEVICE_INFORMATION_SERVICE_UUID, FIRMWARE_REVISION_STRING_UUID);

    let revision = if scoped {
        let revision = transport
            .read(FOTA_SERVICE_UUID, FIRMWARE_REVISION_STRING_UUID)
            .await?;
        let description = transport
            .read_descriptor(
                FOTA_SERVICE_UUID,
                FIRMWARE_REVISION_STRING_UUID,
                USER_DESCRIPTION_UUID,
            )
            .await?;
        FirmwareRevision {
            revision: decode(&revision),
            description: description.as_deref().map(decode),
        }
    } else if in_device_information {
        let revision = transport
            .read(DEVICE_INFORMATION_SERVICE_UUID, FIRMWARE_REVISION_STRING_UUID)
            .await?;
        FirmwareRevision { revision: decode(&revision), description: None }
    } else {
        return Err(FotaError::RevisionNotFound);
    };

    info!("DFU Service found with firmware rev {revision}");
    Ok(revision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    #[tokio::test]
    async fn scoped_revision_with_description() {
        let transport = MockTransport::new().with_characteristic(
            FOTA_SERVICE_UUID,
            FIRMWARE_REVISION_STRING_UUID,
            b"1.2.0",
            &[(USER_DESCRIPTION_UUID, b"nRF52840 radio".as_slice())],
        );
        let revision = read_firmware_revision(&transport).await.unwrap();
        assert_eq!(revision.revision, "1.2.0");
        assert_eq!(revision.description.as_deref(), Some("nRF52840 radio"));
        assert_eq!(revision.to_string(), "1.2.0 for device \"nRF52840 radio\"");
    }

    #[tokio::test]
    async fn scoped_revision_is_preferred() {
        let transport = MockTransport::new()
            .with_characteristic(
                DEVICE_INFORMATION_SERVICE_UUID,
                FIRMWARE_REVISION_STRING_UUID,
                b"0.9.0",
                &[],
            )
            .with_characteristic(FOTA_SERVICE_UUID, FIRMWARE_REVISION_STRING_UUID, b"1.0.0", &[]);
        let revision = read_firmware_revision(&transport).await.unwrap();
        assert_eq!(revision.revision, "1.0.0");
        assert_eq!(revision.description, None);
    }

    #[tokio::test]
    async fn falls_back_to_device_information() {
        let transport = MockTransport::new().with_characteristic(
            DEVICE_INFORMATION_SERVICE_UUID,
            FIRMWARE_REVISION_STRING_UUID,
            b"0.9.0\0",
            &[],
        );
        let revision = read_firmware_revision(&transport).await.unwrap();
        assert_eq!(revision, FirmwareRevision { revision: "0.9.0".into(), description: None });
        assert_eq!(revision.to_string(), "0.9.0");
    }

    #[tokio::test]
    async fn missing_revision() {
        let transport = MockTransport::new();
        assert!(matches!(
            read_firmware_revision(&transport).await,
            Err(FotaError::RevisionNotFound)
        ));
    }
}
