//! Persistent configuration for surfkit.
//!
//! Stores user settings in `~/.surfkit/config.json`: how long to wait for
//! surfaces, how often to poll while waiting, and how much diagnostic
//! evidence to collect around intercepted calls.
//!
//! # Example
//!
//! ```no_run
//! use surfkit_core::config::SurfkitConfig;
//!
//! // Load (returns defaults if file doesn't exist)
//! let config = SurfkitConfig::load();
//! println!("waiting up to {:?} for surfaces", config.handle_wait_timeout());
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const CONFIG_FILENAME: &str = "config.json";

/// Returns the surfkit directory (`~/.surfkit/`).
///
/// Falls back to a relative `.surfkit` when no home directory is known.
pub fn surfkit_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".surfkit"))
        .unwrap_or_else(|| PathBuf::from(".surfkit"))
}

fn default_handle_wait_timeout_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

/// Persistent surfkit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfkitConfig {
    /// Default timeout for resolving a surface, when neither the caller nor
    /// the description declares one.
    #[serde(default = "default_handle_wait_timeout_ms")]
    pub handle_wait_timeout_ms: u64,

    /// Pause between registry polls while resolving.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Attach a screenshot to diagnostic artifacts of failed calls.
    #[serde(default = "default_true")]
    pub screenshot_on_failure: bool,

    /// Attach a screenshot to the call record of successful calls.
    #[serde(default)]
    pub screenshot_on_success: bool,

    /// Upper bound on retries an exception handler may request per call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for SurfkitConfig {
    fn default() -> Self {
        Self {
            handle_wait_timeout_ms: default_handle_wait_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            screenshot_on_failure: true,
            screenshot_on_success: false,
            max_retries: default_max_retries(),
        }
    }
}

impl SurfkitConfig {
    /// Load config from `~/.surfkit/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(surfkit_dir().join(CONFIG_FILENAME)).unwrap_or_default()
    }

    /// Load config from an explicit path.
    pub fn load_from(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to `~/.surfkit/config.json`.
    pub fn save(&self) -> std::io::Result<()> {
        let dir = surfkit_dir();
        std::fs::create_dir_all(&dir)?;
        self.save_to(dir.join(CONFIG_FILENAME))
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }

    pub fn handle_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.handle_wait_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
