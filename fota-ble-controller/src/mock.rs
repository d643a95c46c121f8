//! Scripted in-memory transport for session tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fota_proto::{Fragment, Status, StatusReport};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::TransportError;
use crate::status::StatusNotificationHandler;
use crate::transport::{BINARY_STREAM_UUID, CONTROL_UUID, Transport};

/// A write the transport completed
#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub characteristic: Uuid,
    pub data: Vec<u8>,
    pub with_response: bool,
    pub at: Instant,
}

impl RecordedWrite {
    pub fn fragment(&self) -> Option<Fragment<'_>> {
        if self.characteristic == BINARY_STREAM_UUID {
            Fragment::from_bytes(&self.data)
        } else {
            None
        }
    }

    pub fn is_command(&self, op_code: u8) -> bool {
        self.characteristic == CONTROL_UUID && self.data == [op_code]
    }
}

/// Pushes status notifications into whatever handler subscribed
#[derive(Clone, Default)]
pub struct Notifier {
    handler: Arc<Mutex<Option<Arc<StatusNotificationHandler>>>>,
}

impl Notifier {
    pub fn notify(&self, status: Status, fragment_id: Option<u8>) {
        self.notify_bytes(StatusReport::new(status, fragment_id).to_bytes());
    }

    /// Deliver `value` as is, well formed or not
    pub fn notify_bytes(&self, value: Vec<u8>) {
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler.on_notify(value);
        }
    }

    pub fn notify_after(&self, delay: Duration, status: Status, fragment_id: Option<u8>) {
        self.notify_bytes_after(delay, StatusReport::new(status, fragment_id).to_bytes());
    }

    pub fn notify_bytes_after(&self, delay: Duration, value: Vec<u8>) {
        let notifier = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            notifier.notify_bytes(value);
        });
    }
}

type Responder = Box<dyn FnMut(&RecordedWrite, &Notifier) + Send>;

struct Readable {
    service: Uuid,
    characteristic: Uuid,
    value: Vec<u8>,
    descriptors: HashMap<Uuid, Vec<u8>>,
}

#[derive(Default)]
pub struct MockTransport {
    writes: Mutex<Vec<RecordedWrite>>,
    notifier: Notifier,
    responder: Mutex<Option<Responder>>,
    stalls: Mutex<HashMap<u8, usize>>,
    failing_fragment: Option<u8>,
    failing_disconnect: bool,
    readables: Vec<Readable>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device that answers START with XON and then just accepts fragments
    pub fn device() -> Self {
        Self::new().on_write(|_, _| {})
    }

    /// Run `respond` after every completed write. START is always answered
    /// with XON first, as a real device does.
    pub fn on_write(
        self,
        mut respond: impl FnMut(&RecordedWrite, &Notifier) + Send + 'static,
    ) -> Self {
        self.on_any_write(move |write, notifier| {
            if write.is_command(fota_proto::ble::commands::START) {
                notifier.notify(Status::Xon, Some(0));
            }
            respond(write, notifier);
        })
    }

    /// Like [`Self::on_write`] but without the automatic XON
    pub fn on_any_write(
        self,
        respond: impl FnMut(&RecordedWrite, &Notifier) + Send + 'static,
    ) -> Self {
        *self.responder.lock().unwrap() = Some(Box::new(respond));
        self
    }

    /// The next `times` writes of `fragment_id` hang until cancelled
    pub fn stall_fragment(self, fragment_id: u8, times: usize) -> Self {
        self.stalls.lock().unwrap().insert(fragment_id, times);
        self
    }

    /// Writes of `fragment_id` fail as if the link dropped
    pub fn fail_fragment(mut self, fragment_id: u8) -> Self {
        self.failing_fragment = Some(fragment_id);
        self
    }

    /// Disconnecting fails as if the link was already gone
    pub fn fail_disconnect(mut self) -> Self {
        self.failing_disconnect = true;
        self
    }

    pub fn with_characteristic(
        mut self,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
        descriptors: &[(Uuid, &[u8])],
    ) -> Self {
        self.readables.push(Readable {
            service,
            characteristic,
            value: value.to_vec(),
            descriptors: descriptors.iter().map(|(uuid, v)| (*uuid, v.to_vec())).collect(),
        });
        self
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }

    /// Binary stream writes as (fragment id, payload, time)
    pub fn fragments(&self) -> Vec<(u8, Vec<u8>, Instant)> {
        self.writes()
            .iter()
            .filter_map(|w| w.fragment().map(|f| (f.fragment_id, f.payload.to_vec(), w.at)))
            .collect()
    }

    fn readable(&self, service: Uuid, characteristic: Uuid) -> Option<&Readable> {
        self.readables
            .iter()
            .find(|r| r.service == service && r.characteristic == characteristic)
    }

    fn should_stall(&self, characteristic: Uuid, data: &[u8]) -> bool {
        if characteristic != BINARY_STREAM_UUID {
            return false;
        }
        let Some(&fragment_id) = data.first() else {
            return false;
        };
        let mut stalls = self.stalls.lock().unwrap();
        match stalls.get_mut(&fragment_id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn has_characteristic(&self, service: Uuid, characteristic: Uuid) -> bool {
        self.readable(service, characteristic).is_some()
    }

    async fn read(&self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, TransportError> {
        self.readable(service, characteristic)
            .map(|r| r.value.clone())
            .ok_or(TransportError::CharacteristicNotFound(characteristic))
    }

    async fn read_descriptor(
        &self,
        service: Uuid,
        characteristic: Uuid,
        descriptor: Uuid,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let readable = self
            .readable(service, characteristic)
            .ok_or(TransportError::CharacteristicNotFound(characteristic))?;
        Ok(readable.descriptors.get(&descriptor).cloned())
    }

    async fn write(
        &self,
        characteristic: Uuid,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError> {
        if self.should_stall(characteristic, data) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if characteristic == BINARY_STREAM_UUID && data.first() == self.failing_fragment.as_ref() {
            return Err(TransportError::NotConnected);
        }

        let write = RecordedWrite {
            characteristic,
            data: data.to_vec(),
            with_response,
            at: Instant::now(),
        };
        if let Some(respond) = self.responder.lock().unwrap().as_mut() {
            respond(&write, &self.notifier);
        }
        self.writes.lock().unwrap().push(write);
        Ok(())
    }

    async fn subscribe(
        &self,
        _characteristic: Uuid,
        handler: Arc<StatusNotificationHandler>,
    ) -> Result<(), TransportError> {
        *self.notifier.handler.lock().unwrap() = Some(handler);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        *self.notifier.handler.lock().unwrap() = None;
        if self.failing_disconnect {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }
}
