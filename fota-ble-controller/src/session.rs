//! FOTA session: START handshake, flow controlled binary stream, COMMIT
//!
//! ```text
//! Idle -> Starting -> Streaming -> Committing -> Closed
//!            |            |
//!            +--> Failed <+
//! ```
//!
//! While streaming, every loop iteration first looks at the latest status
//! notification. XOFF pauses sending, XON resumes it, and XOFF, XON and
//! SYNC_LOST all move the fragment sequencer to the id the device reported.
//! Fragments whose write stalls are sent again with the same id.

use std::sync::Arc;
use std::time::Duration;

use fota_proto::ble::commands;
use fota_proto::{Fragment, FragmentSequencer, Status, StatusReport};
use log::*;
use tokio::time::{Instant, sleep, timeout};

use crate::config::SessionConfig;
use crate::error::FotaError;
use crate::status::StatusNotificationHandler;
use crate::transport::{BINARY_STREAM_UUID, CONTROL_UUID, STATUS_UUID, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Streaming,
    Committing,
    Closed,
    /// Terminal. The full error was returned by the failing call.
    Failed(Failure),
}

/// What moved a session to [`SessionState::Failed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// START was never answered with XON
    HandshakeTimeout,
    /// The device reported a failure status while streaming
    DeviceStatus(Status),
    /// A GATT read, write or subscription failed
    Transport,
}

impl From<&FotaError> for Failure {
    fn from(e: &FotaError) -> Self {
        match e {
            FotaError::HandshakeTimeout { .. } => Self::HandshakeTimeout,
            FotaError::DeviceStatus(status) => Self::DeviceStatus(*status),
            _ => Self::Transport,
        }
    }
}

/// What the streaming loop did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Binary stream writes that completed, retransmissions included
    pub fragments_sent: usize,
    pub bytes_sent: usize,
    /// Stalled writes that were retried
    pub write_timeouts: usize,
    /// Times the device paused the stream with XOFF
    pub pauses: usize,
    pub elapsed: Duration,
}

pub struct FotaSession<'a, T: Transport + ?Sized> {
    transport: &'a T,
    image: &'a [u8],
    config: SessionConfig,
    sequencer: FragmentSequencer,
    handler: Arc<StatusNotificationHandler>,
    flow_paused: bool,
    state: SessionState,
}

impl<'a, T: Transport + ?Sized> FotaSession<'a, T> {
    pub fn new(transport: &'a T, image: &'a [u8], config: SessionConfig) -> Self {
        Self {
            transport,
            image,
            config,
            sequencer: FragmentSequencer::new(),
            handler: Arc::new(StatusNotificationHandler::new()),
            flow_paused: false,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn sequencer(&self) -> &FragmentSequencer {
        &self.sequencer
    }

    pub fn is_flow_paused(&self) -> bool {
        self.flow_paused
    }

    /// Start, stream the whole image and commit it
    pub async fn run(&mut self) -> Result<TransferReport, FotaError> {
        self.start().await?;
        let report = self.transfer_binary().await?;
        self.commit().await?;
        Ok(report)
    }

    /// Subscribe to status notifications, send START and wait for XON
    pub async fn start(&mut self) -> Result<(), FotaError> {
        self.expect_state(SessionState::Idle)?;
        self.state = SessionState::Starting;

        let result = self.handshake().await;
        self.settle(result)?;
        self.state = SessionState::Streaming;
        info!("FOTA session started");
        Ok(())
    }

    async fn handshake(&mut self) -> Result<(), FotaError> {
        self.transport
            .subscribe(STATUS_UUID, self.handler.clone())
            .await?;
        self.transport
            .write(CONTROL_UUID, &[commands::START], true)
            .await?;

        let attempts = self.config.start_attempts;
        let mut timeouts = 0;
        loop {
            match timeout(self.config.start_timeout(), self.handler.wait()).await {
                Ok(value) => match value.first().copied().and_then(Status::from_byte) {
                    Some(Status::Xon) => {
                        info!("Received status XON");
                        return Ok(());
                    }
                    Some(Status::Xoff) => info!("Received status XOFF"),
                    Some(status) => warn!("Received unexpected status: {status}"),
                    None => warn!(
                        "Received unknown status: {}",
                        data_encoding::HEXLOWER.encode(&value)
                    ),
                },
                Err(_) => {
                    timeouts += 1;
                    info!("Waiting for status notification: ({timeouts}/{attempts})");
                    if timeouts >= attempts {
                        error!("FOTA session failed to start within timeout period");
                        return Err(FotaError::HandshakeTimeout { attempts });
                    }
                }
            }
        }
    }

    /// Stream every fragment of the image
    pub async fn transfer_binary(&mut self) -> Result<TransferReport, FotaError> {
        self.expect_state(SessionState::Streaming)?;

        let result = self.stream().await;
        let report = self.settle(result)?;
        self.state = SessionState::Committing;
        info!(
            "Binary sent. Transferred {} bytes in {:.3} seconds",
            report.bytes_sent,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    async fn stream(&mut self) -> Result<TransferReport, FotaError> {
        let fragment_size = self.config.fragment_size();
        let started = Instant::now();
        let mut report = TransferReport::default();

        loop {
            if let Some(value) = self.handler.take() {
                self.handle_status(&value, &mut report)?;
            }

            if self.flow_paused {
                sleep(self.config.pause_poll()).await;
                continue;
            }

            let payload = self.sequencer.next_chunk(self.image, fragment_size);
            if payload.is_empty() {
                break;
            }
            let last = payload.len() < fragment_size;

            debug!(
                "Sending packet {}: bytes sent = {}/{}, elapsed time = {} ms",
                self.sequencer.absolute_index(),
                report.bytes_sent + payload.len(),
                self.image.len(),
                started.elapsed().as_millis()
            );

            match self.send_fragment(payload).await {
                Ok(()) => {
                    report.fragments_sent += 1;
                    report.bytes_sent += payload.len();
                    sleep(self.config.pacing()).await;
                    self.sequencer.advance();
                    if last {
                        break;
                    }
                }
                Err(FotaError::WriteTimeout) => {
                    error!("Timeout error occurred while writing BSC");
                    report.write_timeouts += 1;
                    sleep(self.config.write_backoff()).await;
                }
                Err(e) => return Err(e),
            }
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    async fn send_fragment(&self, payload: &[u8]) -> Result<(), FotaError> {
        let fragment = Fragment::new(self.sequencer.fragment_id(), payload).to_bytes();
        let write = self.transport.write(BINARY_STREAM_UUID, &fragment, false);
        match timeout(self.config.write_timeout(), write).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(FotaError::WriteTimeout),
        }
    }

    fn handle_status(
        &mut self,
        value: &[u8],
        report: &mut TransferReport,
    ) -> Result<(), FotaError> {
        let status = match StatusReport::from_bytes(value) {
            Ok(status) => status,
            Err(e) => {
                warn!("Ignoring status notification: {e}");
                return Ok(());
            }
        };

        match (status.status, status.fragment_id) {
            (Status::Ok, _) => info!("Received status OK"),
            (Status::Xoff, Some(fragment_id)) => {
                info!("Received status XOFF. Fragment ID = {fragment_id}");
                if !self.flow_paused {
                    report.pauses += 1;
                }
                self.flow_paused = true;
                self.sequencer.resync(fragment_id);
            }
            (Status::Xon, Some(fragment_id)) => {
                info!("Received status XON. Fragment ID = {fragment_id}");
                self.flow_paused = false;
                self.sequencer.resync(fragment_id);
            }
            (Status::SyncLost, Some(fragment_id)) => {
                info!("Received status SYNC_LOST. Fragment ID = {fragment_id}");
                self.sequencer.resync(fragment_id);
            }
            (status, _) if status.is_failure() => {
                warn!("Device reported {status}");
                if self.config.fail_on_device_error {
                    return Err(FotaError::DeviceStatus(status));
                }
            }
            (status, _) => info!("Received status {status}"),
        }
        Ok(())
    }

    /// Send COMMIT so the device installs the image
    pub async fn commit(&mut self) -> Result<(), FotaError> {
        self.expect_state(SessionState::Committing)?;

        let result = self
            .transport
            .write(CONTROL_UUID, &[commands::COMMIT], true)
            .await
            .map_err(FotaError::from);
        self.settle(result)?;
        self.state = SessionState::Closed;
        info!("FOTA update committed");
        Ok(())
    }

    fn expect_state(&self, expected: SessionState) -> Result<(), FotaError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(FotaError::InvalidState { expected, actual: self.state })
        }
    }

    fn settle<R>(&mut self, result: Result<R, FotaError>) -> Result<R, FotaError> {
        if let Err(e) = &result {
            self.state = SessionState::Failed(Failure::from(e));
        }
        result
    }
}
