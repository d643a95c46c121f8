//! The complete update procedure
//!
//! 1. Find and connect to the device, read its firmware revision
//! 2. Run a FOTA session (START, stream, COMMIT)
//! 3. Wait for the device to drop the link and install the image
//! 4. Reconnect and read the revision again
//!
//! The update counts as successful when the two revisions differ; the
//! protocol has no explicit confirmation.

use btleplug::platform::Adapter;
use log::*;

use crate::ble::{self, BleTransport};
use crate::config::UpdateConfig;
use crate::error::FotaError;
use crate::firmware::FirmwareImage;
use crate::revision::{FirmwareRevision, read_firmware_revision};
use crate::session::{FotaSession, TransferReport};
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub before: FirmwareRevision,
    /// `None` when verification was skipped
    pub after: Option<FirmwareRevision>,
    pub report: TransferReport,
}

impl UpdateOutcome {
    /// `Some(true)` if the revision changed, `None` if it was not checked
    pub fn succeeded(&self) -> Option<bool> {
        self.after
            .as_ref()
            .map(|after| after.revision != self.before.revision)
    }
}

pub async fn connect_device(
    adapter: &Adapter,
    config: &UpdateConfig,
) -> Result<BleTransport, FotaError> {
    let peripheral = ble::find_device(adapter, &config.device_name, config.scan_duration()).await?;
    ble::connect(adapter, peripheral, config.connect_attempts).await
}

/// Connect, read the revision and disconnect
pub async fn probe(
    adapter: &Adapter,
    config: &UpdateConfig,
) -> Result<FirmwareRevision, FotaError> {
    let transport = connect_device(adapter, config).await?;
    let revision = read_firmware_revision(&transport).await;
    disconnect(&transport).await;
    revision
}

async fn disconnect<T: Transport + ?Sized>(transport: &T) {
    if let Err(e) = transport.disconnect().await {
        warn!("Failed to disconnect: {e}");
    }
}

pub async fn run(
    adapter: &Adapter,
    image: &FirmwareImage,
    config: &UpdateConfig,
    verify: bool,
) -> Result<UpdateOutcome, FotaError> {
    let transport = connect_device(adapter, config).await?;

    let (before, report) = match transfer(&transport, image, config).await {
        Ok(transferred) => transferred,
        Err(e) => {
            disconnect(&transport).await;
            return Err(e);
        }
    };

    if !verify {
        disconnect(&transport).await;
        return Ok(UpdateOutcome { before, after: None, report });
    }
    drop(transport);

    info!("FOTA session complete, waiting for device to apply update");
    tokio::time::sleep(config.reboot_wait()).await;

    let after = probe(adapter, config).await?;
    let outcome = UpdateOutcome { before, after: Some(after), report };
    match outcome.succeeded() {
        Some(true) => info!("Update successful!"),
        _ => warn!("Update unsuccessful: firmware revision unchanged"),
    }
    Ok(outcome)
}

/// Read the baseline revision, run the session and wait for the device to
/// drop the link after COMMIT.
async fn transfer(
    transport: &BleTransport,
    image: &FirmwareImage,
    config: &UpdateConfig,
) -> Result<(FirmwareRevision, TransferReport), FotaError> {
    let before = read_firmware_revision(transport).await?;

    if image.is_empty() {
        warn!("Firmware image is empty, only START and COMMIT will be sent");
    }
    info!(
        "Transferring binary of size {} bytes in {} fragments, hash: {}",
        image.len(),
        image.fragment_count(config.session.fragment_size()),
        image.sha256_hex()
    );

    let disconnected = transport.disconnect_signal().await?;
    let mut session = FotaSession::new(transport, image.as_bytes(), config.session.clone());
    let report = session.run().await?;

    info!("Waiting for {} to disconnect", transport.address());
    disconnected.wait().await;
    Ok((before, report))
}
