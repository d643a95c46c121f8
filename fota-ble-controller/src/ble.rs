//! btleplug backed transport
//!
//! Scans for FOTA devices, connects with a bounded number of attempts and
//! exposes the connected peripheral as a [`Transport`].

use std::collections::BTreeSet;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Manager, PeripheralId};
use futures::{Stream, StreamExt};
use log::*;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub use btleplug::platform::{Adapter, Peripheral};

use crate::error::{FotaError, TransportError};
use crate::status::StatusNotificationHandler;
use crate::transport::{
    BINARY_STREAM_UUID, CONTROL_UUID, FOTA_SERVICE_UUID, STATUS_UUID, Transport, VERSION_UUID,
};

/// A device seen while scanning
#[derive(Debug, Clone)]
pub struct FotaDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    /// Advertises the FOTA service
    pub is_fota: bool,
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, FotaError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(FotaError::NoAdapter)
}

/// Scan for BLE devices for `duration`
pub async fn scan(adapter: &Adapter, duration: Duration) -> Result<Vec<FotaDevice>, FotaError> {
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;

    let peripherals = adapter.peripherals().await?;
    let mut devices = Vec::new();

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            devices.push(FotaDevice {
                name: props.local_name.unwrap_or_else(|| "Unknown".to_string()),
                address: peripheral.address().to_string(),
                rssi: props.rssi,
                is_fota: props.services.contains(&FOTA_SERVICE_UUID),
            });
        }
    }

    adapter.stop_scan().await?;
    Ok(devices)
}

/// Find the device whose local name (or address) is exactly `target`
pub async fn find_device(
    adapter: &Adapter,
    target: &str,
    duration: Duration,
) -> Result<Peripheral, FotaError> {
    info!("Scanning for device '{target}'");
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;

    let peripherals = adapter.peripherals().await?;

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let address = peripheral.address().to_string();
            let matches = props.local_name.as_deref() == Some(target)
                || address.eq_ignore_ascii_case(target);

            if matches {
                adapter.stop_scan().await?;
                info!("Found it. Address = {address}");
                return Ok(peripheral);
            }
        }
    }

    adapter.stop_scan().await?;
    error!("Failed to find device named {target}");
    Err(FotaError::TransportNotFound(target.to_string()))
}

/// Connect to `peripheral`, trying up to `attempts` times, and discover its services
pub async fn connect(
    adapter: &Adapter,
    peripheral: Peripheral,
    attempts: u32,
) -> Result<BleTransport, FotaError> {
    let address = peripheral.address().to_string();

    for attempt in 1..=attempts {
        info!("Connecting to BLE device @ {address}");
        match peripheral.connect().await {
            Ok(()) => {
                peripheral.discover_services().await?;
                let transport = BleTransport {
                    adapter: adapter.clone(),
                    peripheral,
                    forwarders: Mutex::new(Vec::new()),
                };
                transport.check_fota_service();
                return Ok(transport);
            }
            Err(e) => info!("Waiting to connect: ({attempt}/{attempts}): {e}"),
        }
    }

    error!("Failed to connect to BLE device @ {address}");
    Err(FotaError::ConnectionFailed { address, attempts })
}

/// A connected peripheral
pub struct BleTransport {
    adapter: Adapter,
    peripheral: Peripheral,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
}

type CentralEvents = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// Resolves once the peripheral drops the connection
pub struct DisconnectSignal {
    id: PeripheralId,
    events: CentralEvents,
}

impl DisconnectSignal {
    pub async fn wait(mut self) {
        while let Some(event) = self.events.next().await {
            if matches!(event, CentralEvent::DeviceDisconnected(ref id) if *id == self.id) {
                return;
            }
        }
    }
}

impl BleTransport {
    pub fn address(&self) -> String {
        self.peripheral.address().to_string()
    }

    /// Subscribe to disconnect events. Call this before the action that makes
    /// the device drop the link so the event cannot be missed.
    pub async fn disconnect_signal(&self) -> Result<DisconnectSignal, TransportError> {
        Ok(DisconnectSignal {
            id: self.peripheral.id(),
            events: self.adapter.events().await?,
        })
    }

    fn check_fota_service(&self) {
        for (uuid, name) in [
            (BINARY_STREAM_UUID, "binary stream"),
            (CONTROL_UUID, "control"),
            (STATUS_UUID, "status"),
            (VERSION_UUID, "version"),
        ] {
            if !self.has_characteristic(FOTA_SERVICE_UUID, uuid) {
                warn!("FOTA service has no {name} characteristic ({uuid})");
            }
        }
    }

    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, TransportError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TransportError::CharacteristicNotFound(uuid))
    }

    fn service_characteristics(&self, service: Uuid) -> BTreeSet<Characteristic> {
        self.peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == service)
            .map(|s| s.characteristics)
            .unwrap_or_default()
    }

    fn service_characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Characteristic, TransportError> {
        self.service_characteristics(service)
            .into_iter()
            .find(|c| c.uuid == characteristic)
            .ok_or(TransportError::CharacteristicNotFound(characteristic))
    }

    fn stop_forwarders(&self) {
        let mut forwarders = self.forwarders.lock().unwrap_or_else(PoisonError::into_inner);
        for task in forwarders.drain(..) {
            task.abort();
        }
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        self.stop_forwarders();
    }
}

#[async_trait]
impl Transport for BleTransport {
    fn has_characteristic(&self, service: Uuid, characteristic: Uuid) -> bool {
        self.service_characteristics(service)
            .iter()
            .any(|c| c.uuid == characteristic)
    }

    async fn read(&self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, TransportError> {
        let characteristic = self.service_characteristic(service, characteristic)?;
        Ok(self.peripheral.read(&characteristic).await?)
    }

    async fn read_descriptor(
        &self,
        service: Uuid,
        characteristic: Uuid,
        descriptor: Uuid,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let characteristic = self.service_characteristic(service, characteristic)?;
        let Some(descriptor) = characteristic.descriptors.iter().find(|d| d.uuid == descriptor)
        else {
            return Ok(None);
        };
        Ok(Some(self.peripheral.read_descriptor(descriptor).await?))
    }

    async fn write(
        &self,
        characteristic: Uuid,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError> {
        let characteristic = self.characteristic(characteristic)?;
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        Ok(self.peripheral.write(&characteristic, data, write_type).await?)
    }

    async fn subscribe(
        &self,
        characteristic: Uuid,
        handler: Arc<StatusNotificationHandler>,
    ) -> Result<(), TransportError> {
        let characteristic = self.characteristic(characteristic)?;
        let mut notifications = self.peripheral.notifications().await?;
        self.peripheral.subscribe(&characteristic).await?;

        let uuid = characteristic.uuid;
        let task = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == uuid {
                    handler.on_notify(notification.value);
                }
            }
            debug!("Notification stream for {uuid} ended");
        });
        self.forwarders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.stop_forwarders();
        Ok(self.peripheral.disconnect().await?)
    }
}
