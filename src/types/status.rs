//! Driver status reported to consumers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the PMD driver.
///
/// Transport failures surface here instead of as per-sample errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum DriverStatus {
    /// Idle; no transport attached
    #[default]
    Ready,
    /// Transport open and streaming
    Connected,
    /// Transport reported a failure
    Error,
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverStatus::Ready => "ready",
            DriverStatus::Connected => "connected",
            DriverStatus::Error => "error",
        };
        f.write_str(name)
    }
}
