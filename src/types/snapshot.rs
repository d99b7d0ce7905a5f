//! Fixed-size channel snapshot

use serde::{Serialize, Serializer};
use std::ops::Index;

use super::ChannelSample;
use crate::topology::{CHANNEL_COUNT, CHANNELS};

/// All channel values decoded from one frame.
///
/// Always holds exactly [`CHANNEL_COUNT`] samples ordered by topology index.
/// Channels without hardware behind them are present with value `0.0`, so
/// consumers can index by position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSnapshot {
    samples: [ChannelSample; CHANNEL_COUNT],
}

impl ChannelSnapshot {
    /// Create a snapshot with every channel at `0.0`.
    pub fn zeroed(timestamp: u64) -> Self {
        let samples = CHANNELS.map(|info| ChannelSample {
            name: info.name,
            channel_group: info.channel_group,
            measurand: info.measurand,
            value: 0.0,
            timestamp,
        });
        Self { samples }
    }

    /// Sample index shared by every channel of this snapshot
    pub fn timestamp(&self) -> u64 {
        self.samples[0].timestamp
    }

    /// Value of the channel at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= CHANNEL_COUNT`.
    pub fn value(&self, index: usize) -> f32 {
        self.samples[index].value
    }

    pub(crate) fn set_value(&mut self, index: usize, value: f32) {
        self.samples[index].value = value;
    }

    #[cfg(test)]
    pub(crate) fn set_timestamp(&mut self, timestamp: u64) {
        for sample in &mut self.samples {
            sample.timestamp = timestamp;
        }
    }

    pub fn samples(&self) -> &[ChannelSample; CHANNEL_COUNT] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChannelSample> {
        self.samples.iter()
    }

    /// Number of channels, always [`CHANNEL_COUNT`]
    pub const fn len(&self) -> usize {
        CHANNEL_COUNT
    }

    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Sum of the values at `indices`.
    pub fn sum(&self, indices: &[usize]) -> f32 {
        indices.iter().map(|&index| self.samples[index].value).sum()
    }
}

impl Index<usize> for ChannelSnapshot {
    type Output = ChannelSample;

    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl<'a> IntoIterator for &'a ChannelSnapshot {
    type Item = &'a ChannelSample;
    type IntoIter = std::slice::Iter<'a, ChannelSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

// serde only derives for arrays up to 32 elements
impl Serialize for ChannelSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.samples.iter())
    }
}
