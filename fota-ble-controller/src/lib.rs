//! FOTA BLE Controller
//!
//! Pushes firmware images to embedded devices over the FOTA GATT service.
//!
//! # Example
//!
//! ```ignore
//! use fota_ble_controller::{FirmwareImage, UpdateConfig, ble, update};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = ble::get_adapter().await?;
//!     let image = FirmwareImage::load("app.bin")?;
//!
//!     let outcome = update::run(&adapter, &image, &UpdateConfig::default(), true).await?;
//!     println!("{} -> {:?}", outcome.before, outcome.after);
//!
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod config;
mod error;
mod firmware;
#[cfg(test)]
mod mock;
mod revision;
pub mod session;
mod status;
pub mod transport;
pub mod update;

pub use config::{ConfigError, SessionConfig, UpdateConfig};
pub use error::{FotaError, TransportError};
pub use firmware::FirmwareImage;
pub use revision::{FirmwareRevision, read_firmware_revision};
pub use session::{Failure, FotaSession, SessionState, TransferReport};
pub use status::StatusNotificationHandler;
pub use transport::Transport;
