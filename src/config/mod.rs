//! Configuration for streamio ports
//!
//! Queue depths, buffer sizes, burst thresholds, sink shutdown timing and
//! statistics collection can be tuned from a file instead of code. Every
//! port with tunables has a `with_config` constructor taking a
//! [`StreamConfig`].
//!
//! # File Location
//!
//! The default configuration file lives in the platform config directory:
//! - **Linux**: `~/.config/streamio/streamio.toml`
//! - **macOS**: `~/Library/Application Support/streamio/streamio.toml`
//! - **Windows**: `%APPDATA%\streamio\streamio.toml`
//!
//! # Formats
//!
//! TOML by default; a `.json` extension selects JSON. Missing sections and
//! fields fall back to their defaults.
//!
//! ```toml
//! [input]
//! max_queue_depth = 100   # negative = unlimited
//!
//! [burst]
//! queue_threshold = 100
//!
//! [sink]
//! shutdown_timeout_ms = 2000
//! ```

use crate::error::{Result, ResultExt, StreamError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for the config directory
pub const APP_ID: &str = "streamio";

/// Default configuration filename
pub const CONFIG_FILE: &str = "streamio.toml";

/// Default input queue depth in packets
pub const DEFAULT_MAX_QUEUE_DEPTH: i64 = 100;

/// Default burst queue threshold in bursts
pub const DEFAULT_QUEUE_THRESHOLD: usize = 100;

/// Default time to wait for a sink's process thread to exit
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2000;

/// Default sleep after an idle process iteration
pub const DEFAULT_NOOP_DELAY_MS: u64 = 10;

/// Largest accepted statistics window
pub const MAX_WINDOW_SIZE: usize = 100_000;

// ==================== Config Directory ====================

/// Platform config directory for streamio
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Path of the default configuration file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Sections ====================

/// Input queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Maximum queued packets; negative means unlimited, 0 discards everything
    pub max_queue_depth: i64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
        }
    }
}

impl InputConfig {
    /// Depth as used by the queue (`UNLIMITED_QUEUE_DEPTH` for negatives)
    pub fn queue_depth(&self) -> usize {
        usize::try_from(self.max_queue_depth).unwrap_or(crate::input::UNLIMITED_QUEUE_DEPTH)
    }
}

/// Output stream settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Elements to coalesce per packet; 0 disables buffering
    pub buffer_size: usize,
}

/// Burst queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurstConfig {
    /// Depth at which producers block; must be at least 1
    pub queue_threshold: usize,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            queue_threshold: DEFAULT_QUEUE_THRESHOLD,
        }
    }
}

/// Reassembly sink settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub shutdown_timeout_ms: u64,
    pub noop_delay_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            noop_delay_ms: DEFAULT_NOOP_DELAY_MS,
        }
    }
}

impl SinkConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn noop_delay(&self) -> Duration {
        Duration::from_millis(self.noop_delay_ms)
    }
}

/// Port statistics settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub enabled: bool,
    /// Number of recent calls averaged over
    pub window_size: usize,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_size: crate::stats::DEFAULT_WINDOW_SIZE,
        }
    }
}

impl StatisticsConfig {
    /// Build a recorder for one port
    pub fn recorder(&self, port_name: &str, bits_per_element: usize) -> crate::stats::StatisticsRecorder {
        let mut recorder =
            crate::stats::StatisticsRecorder::with_window(port_name, bits_per_element, self.window_size);
        recorder.set_enabled(self.enabled);
        recorder
    }
}

// ==================== StreamConfig ====================

/// Complete streamio configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub burst: BurstConfig,
    pub sink: SinkConfig,
    pub statistics: StatisticsConfig,
}

impl StreamConfig {
    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| StreamError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, or JSON when the extension is `.json`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;

        if is_json(path) {
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| StreamError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// Load from `path`, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!(
                "Failed to load config from {}, using defaults: {}",
                path.display(),
                e
            );
            Self::default()
        })
    }

    /// Save in the format implied by the extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.validate()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| StreamError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| StreamError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        tracing::debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Reject values no port can run with
    pub fn validate(&self) -> Result<()> {
        if self.burst.queue_threshold == 0 {
            return Err(StreamError::Config(
                "burst.queue_threshold must be at least 1".to_string(),
            ));
        }
        if self.statistics.window_size == 0 {
            return Err(StreamError::Config(
                "statistics.window_size must be at least 1".to_string(),
            ));
        }
        if self.statistics.window_size > MAX_WINDOW_SIZE {
            return Err(StreamError::Config(format!(
                "statistics.window_size must be at most {}",
                MAX_WINDOW_SIZE
            )));
        }
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
