//! Test utilities for building synthetic PMD frames and snapshots
//!
//! Shared by unit tests and the criterion benches.

#![cfg(any(test, feature = "benchmark"))]

use crate::protocol::decoder::Rail;
use crate::protocol::{FRAME_LENGTH, HEADER};
use crate::topology::CHANNEL_COUNT;
use crate::types::ChannelSnapshot;

/// Builder for a single wire frame.
///
/// Rails that are not set read as 0 V / 0 A.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    bytes: [u8; FRAME_LENGTH],
}

impl FrameBuilder {
    pub fn new(sequence: u16) -> Self {
        let mut bytes = [0u8; FRAME_LENGTH];
        bytes[..2].copy_from_slice(&HEADER);
        bytes[2..4].copy_from_slice(&sequence.to_be_bytes());
        Self { bytes }
    }

    /// Set one rail in millivolts and milliamps (24-bit).
    pub fn rail(mut self, rail: Rail, millivolts: u16, milliamps: u32) -> Self {
        debug_assert!(milliamps < 1 << 24, "current field is 24 bits");
        let layout = rail.layout();
        let v = HEADER.len() + layout.voltage_offset;
        let i = HEADER.len() + layout.current_offset;
        self.bytes[v..v + 2].copy_from_slice(&millivolts.to_be_bytes());
        self.bytes[i..i + 3].copy_from_slice(&milliamps.to_be_bytes()[1..]);
        self
    }

    pub fn build(&self) -> [u8; FRAME_LENGTH] {
        self.bytes
    }
}

/// Concatenate frames for consecutive sequence numbers, every rail loaded.
pub fn frame_stream(first_sequence: u16, count: usize) -> Vec<u8> {
    let mut stream = Vec::with_capacity(count * FRAME_LENGTH);
    for n in 0..count {
        let sequence = first_sequence.wrapping_add(n as u16);
        let mut builder = FrameBuilder::new(sequence);
        for (k, rail) in Rail::ALL.into_iter().enumerate() {
            builder = builder.rail(rail, 12_000 + k as u16, 1_000 + (n % 100) as u32);
        }
        stream.extend_from_slice(&builder.build());
    }
    stream
}

/// Snapshot whose channel `k` holds `values[k]`, or `fill` when shorter.
pub fn snapshot_with(timestamp: u64, values: &[f32], fill: f32) -> ChannelSnapshot {
    let mut snapshot = ChannelSnapshot::zeroed(timestamp);
    for index in 0..CHANNEL_COUNT {
        snapshot.set_value(index, values.get(index).copied().unwrap_or(fill));
    }
    snapshot
}
