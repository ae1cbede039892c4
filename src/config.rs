//! Listener configuration.
//!
//! Loaded from JSON; every field is optional and falls back to its default.
//!
//! ```
//! use wirestage::config::ListenerConfig;
//!
//! let config = ListenerConfig::from_json(r#"{ "interface": "eth1", "read_batch": 16 }"#).unwrap();
//! assert_eq!(config.interface, "eth1");
//! assert_eq!(config.read_batch, 16);
//! assert_eq!(config.max_suspended, 1024);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default interface to bind.
pub const DEFAULT_INTERFACE: &str = "eth0";

/// Default directory holding per-interface capture streams.
pub const DEFAULT_CAPTURE_DIR: &str = "/run/wirestage";

/// Default delay between transport polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default maximum frames read per poll.
pub const DEFAULT_READ_BATCH: usize = 64;

/// Default time a request may stay suspended before it is timed out.
pub const DEFAULT_MAX_REQUEST_TIME: Duration = Duration::from_secs(30);

/// Default maximum number of suspended requests.
pub const DEFAULT_MAX_SUSPENDED: usize = 1024;

/// Default listener command channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Configuration for one listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenerConfig {
    /// Interface to bind.
    pub interface: String,
    /// Directory interface names are resolved in.
    pub capture_dir: PathBuf,
    /// Milliseconds between transport polls.
    pub poll_interval_ms: u64,
    /// Maximum frames read per poll.
    pub read_batch: usize,
    /// Milliseconds a request may stay suspended.
    pub max_request_time_ms: u64,
    /// Maximum number of suspended requests.
    pub max_suspended: usize,
    /// Command channel capacity.
    pub channel_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            interface: DEFAULT_INTERFACE.to_string(),
            capture_dir: PathBuf::from(DEFAULT_CAPTURE_DIR),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            read_batch: DEFAULT_READ_BATCH,
            max_request_time_ms: DEFAULT_MAX_REQUEST_TIME.as_millis() as u64,
            max_suspended: DEFAULT_MAX_SUSPENDED,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ListenerConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Reject settings the listener cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.interface.trim().is_empty() {
            return Err(Error::Config("interface must not be empty".to_string()));
        }

        for (name, value) in [
            ("poll_interval_ms", self.poll_interval_ms),
            ("read_batch", self.read_batch as u64),
            ("max_request_time_ms", self.max_request_time_ms),
            ("max_suspended", self.max_suspended as u64),
            ("channel_capacity", self.channel_capacity as u64),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than 0", name)));
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_request_time(&self) -> Duration {
        Duration::from_millis(self.max_request_time_ms)
    }
}
