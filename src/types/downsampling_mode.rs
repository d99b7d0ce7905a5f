//! Downsampling mode for the snapshot pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a full window of snapshots is reduced to one emitted snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "lowercase")]
pub enum DownsamplingMode {
    /// Emit the most recent snapshot of the window (preserves spikes)
    #[default]
    Single,

    /// Emit the per-channel arithmetic mean of the window
    Average,
}

impl DownsamplingMode {
    /// Whether the reduction needs every snapshot of the window
    pub fn needs_full_window(self) -> bool {
        matches!(self, DownsamplingMode::Average)
    }
}

impl fmt::Display for DownsamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownsamplingMode::Single => f.write_str("single"),
            DownsamplingMode::Average => f.write_str("average"),
        }
    }
}
