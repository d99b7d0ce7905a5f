//! Pipeline configuration
//!
//! ```rust
//! use pmdstream::{DownsamplingMode, PipelineConfig};
//!
//! let config = PipelineConfig::from_yaml_str("window_size: 20\nmode: average\n").unwrap();
//! assert_eq!(config.window_size, 20);
//! assert_eq!(config.mode, DownsamplingMode::Average);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::DownsamplingMode;
use crate::{PmdError, Result};

/// Runtime configuration of the ingestion session and the downsampling pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(default)]
pub struct PipelineConfig {
    /// Consecutive snapshots folded into one emitted snapshot
    pub window_size: usize,

    /// Reduction applied to a full window
    pub mode: DownsamplingMode,

    /// Capacity of the ingestion -> pipeline handoff channel
    pub channel_capacity: usize,

    /// Per-consumer backlog of the emitted snapshot stream
    pub broadcast_capacity: usize,

    /// Window of the throughput signal in milliseconds
    pub throughput_window_ms: u64,

    /// Skip the calibration acknowledge / stream mode commands on connect
    pub calibration_mode: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: 1,
            mode: DownsamplingMode::Single,
            channel_capacity: 4096,
            broadcast_capacity: 1024,
            throughput_window_ms: 2000,
            calibration_mode: false,
        }
    }
}

impl PipelineConfig {
    pub fn new(window_size: usize, mode: DownsamplingMode) -> Self {
        Self { window_size, mode, ..Self::default() }
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| PmdError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(PmdError::InvalidWindowSize { size: self.window_size });
        }
        if self.channel_capacity == 0 {
            return Err(PmdError::config_error("channel_capacity must be at least 1"));
        }
        if self.broadcast_capacity == 0 {
            return Err(PmdError::config_error("broadcast_capacity must be at least 1"));
        }
        if self.throughput_window_ms == 0 {
            return Err(PmdError::config_error("throughput_window_ms must be at least 1"));
        }
        Ok(())
    }

    pub fn throughput_window(&self) -> Duration {
        Duration::from_millis(self.throughput_window_ms)
    }
}
