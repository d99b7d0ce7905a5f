//! Framing, decoding and downsampling for PMD power telemetry.
//!
//! A PMD (power measurement device) sits between the power supply and the
//! PC and streams voltage and current readings for every rail over a serial
//! link. This crate turns that byte stream into typed snapshots of 42
//! channels and delivers them as async streams.
//!
//! # Features
//!
//! - **Framing**: recovers fixed 69-byte frames from arbitrarily chunked input
//! - **Decoding**: scaled volts, amps and watts per rail plus packet loss counting
//! - **Downsampling**: runtime-configurable window averaging on its own task
//! - **Aggregates**: GPU, CPU (EPS), ATX and system power over snapshot histories
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use pmdstream::{DownsamplingMode, Pmd, PipelineConfig, PowerGroup, power};
//!
//! #[tokio::main]
//! async fn main() -> pmdstream::Result<()> {
//!     let config = PipelineConfig::new(20, DownsamplingMode::Average);
//!     let connection = Pmd::replay("capture.bin", config)?;
//!
//!     let mut snapshots = Box::pin(connection.channel_stream());
//!     while let Some(snapshot) = snapshots.next().await {
//!         println!("GPU: {:.1} W", power::group_power(&snapshot, PowerGroup::Gpu));
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod topology;
pub mod types;

// Wire protocol and ingestion
pub mod protocol;
pub mod session;

// Stream-based pipeline architecture
pub mod connection;
pub mod driver;
pub mod pipeline;
pub mod power;
pub mod transport;
pub mod transports;

// Core exports
pub use config::PipelineConfig;
pub use error::*;
pub use topology::{CHANNEL_COUNT, CHANNELS, ChannelInfo, PowerGroup};
pub use types::*;

// Main API exports
pub use connection::PmdConnection;
pub use pipeline::{DownsampleExt, Downsampler, ThroughputExt};
pub use transport::Transport;
pub use transports::{ChannelTransport, ChannelTransportHandle, ReplayTransport};

use std::path::Path;

/// Unified entry point for PMD connections.
///
/// Every constructor spawns tasks and must be called from within a Tokio
/// runtime.
///
/// # Examples
///
/// ## Serial link bridged through a channel
/// ```rust,no_run
/// use pmdstream::{ChannelTransport, Pmd, PipelineConfig};
///
/// #[tokio::main]
/// async fn main() -> pmdstream::Result<()> {
///     let (transport, handle) = ChannelTransport::new("COM3", 64);
///     let connection = Pmd::connect(transport, PipelineConfig::default())?;
///     // Forward bytes from the serial port's read callback:
///     handle.try_send_bytes(vec![0xCA, 0xAC])?;
///     Ok(())
/// }
/// ```
///
/// ## Capture file replay
/// ```rust,no_run
/// use pmdstream::{Pmd, PipelineConfig};
///
/// #[tokio::main]
/// async fn main() -> pmdstream::Result<()> {
///     let connection = Pmd::replay("capture.bin", PipelineConfig::default())?;
///     Ok(())
/// }
/// ```
pub struct Pmd;

impl Pmd {
    /// Connect through `transport`.
    ///
    /// Unless `config.calibration_mode` is set, the device is told to accept
    /// its calibration and start streaming.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn connect<T: Transport>(transport: T, config: PipelineConfig) -> Result<PmdConnection> {
        PmdConnection::open(transport, config)
    }

    /// Replay a raw byte capture.
    ///
    /// Chunks are delivered back to back; wrap a [`ReplayTransport`] with
    /// pacing and use [`connect`](Self::connect) to simulate device timing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the configuration does
    /// not validate.
    pub fn replay<P: AsRef<Path>>(path: P, config: PipelineConfig) -> Result<PmdConnection> {
        let transport = ReplayTransport::open(path, transports::replay::DEFAULT_CHUNK_SIZE)?;
        let config = PipelineConfig { calibration_mode: true, ..config };
        PmdConnection::open(transport, config)
    }

    /// Start a session without a reader task.
    ///
    /// Bytes are pushed with [`PmdConnection::feed`], typically from a serial
    /// library's data-received callback.
    pub fn attach(config: PipelineConfig) -> Result<PmdConnection> {
        PmdConnection::attach(config)
    }
}
