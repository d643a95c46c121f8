//! Session timing and update procedure settings
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! { "device_name": "FOTA-2", "session": { "pacing_ms": 50 } }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Protocol timing of a single FOTA session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Payload bytes per fragment, excluding the fragment id
    pub fragment_size: usize,
    /// How long to wait for each status notification after START
    pub start_timeout_ms: u64,
    /// Timeouts tolerated while waiting for XON before giving up
    pub start_attempts: u32,
    /// Deadline for a single binary stream write
    pub write_timeout_ms: u64,
    /// Back-off after a stalled write before the fragment is sent again
    pub write_backoff_ms: u64,
    /// Pause after every fragment so the device buffer never overruns
    pub pacing_ms: u64,
    /// Poll interval for new status notifications while paused by XOFF
    pub pause_poll_ms: u64,
    /// Fail the session when the device reports an error status while streaming
    pub fail_on_device_error: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fragment_size: fota_proto::FRAGMENT_SIZE,
            start_timeout_ms: 10_000,
            start_attempts: 5,
            write_timeout_ms: 25,
            write_backoff_ms: 100,
            pacing_ms: 75,
            pause_poll_ms: 1,
            fail_on_device_error: false,
        }
    }
}

impl SessionConfig {
    pub fn fragment_size(&self) -> usize {
        self.fragment_size.max(1)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn write_backoff(&self) -> Duration {
        Duration::from_millis(self.write_backoff_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }
}

/// Settings for the whole update: discovery, session and verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Advertised local name (or address) of the target
    pub device_name: String,
    pub scan_secs: u64,
    pub connect_attempts: u32,
    /// Time the device gets to install the image before we reconnect
    pub reboot_wait_secs: u64,
    pub session: SessionConfig,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            device_name: "FOTA".to_string(),
            scan_secs: 5,
            connect_attempts: 5,
            reboot_wait_secs: 60,
            session: SessionConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("invalid config file {0}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),
}

impl UpdateConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_json::from_str(&data).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// Load `path` if given, else the config file in [`fota_home`] when one
    /// exists, else the defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match fota_home().map(|home| home.join("config.json")) {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_secs)
    }

    pub fn reboot_wait(&self) -> Duration {
        Duration::from_secs(self.reboot_wait_secs)
    }
}

/// `$FOTA_HOME`, falling back to `~/.fota`
pub fn fota_home() -> Option<PathBuf> {
    match std::env::var_os("FOTA_HOME") {
        Some(home) => Some(PathBuf::from(home)),
        None => dirs::home_dir().map(|home| home.join(".fota")),
    }
}
