//! Core types for PMD telemetry data representation.
//!
//! - [`ChannelSample`] is one measurement of one logical channel
//! - [`ChannelSnapshot`] is the full set of 42 samples decoded from one frame
//! - [`ChannelGroup`] and [`Measurand`] classify channels
//! - [`DriverStatus`] tracks the transport lifecycle
//! - [`DownsamplingMode`] selects how the pipeline reduces a window
//!
//! ## Usage Example
//!
//! ```rust
//! use pmdstream::types::{ChannelSnapshot, Measurand};
//!
//! let snapshot = ChannelSnapshot::zeroed(7);
//! assert_eq!(snapshot.len(), 42);
//! assert_eq!(snapshot.timestamp(), 7);
//! assert_eq!(snapshot[2].measurand, Measurand::Power);
//! ```

mod channel;
mod downsampling_mode;
mod snapshot;
mod status;

pub use channel::{ChannelGroup, ChannelSample, Measurand};
pub use downsampling_mode::DownsamplingMode;
pub use snapshot::ChannelSnapshot;
pub use status::DriverStatus;
