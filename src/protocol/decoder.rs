//! Packet decoding and sequence loss tracking.
//!
//! Every rail is a 16-bit big-endian voltage in millivolts followed by a
//! 24-bit big-endian current in milliamps, at fixed offsets from the payload
//! start. Power is derived as `voltage * current` and stored next to them.
//!
//! The offset table was reverse-engineered from device captures. PCIe lanes
//! 4 and 5 have no wiring on current hardware and are always reported as
//! zero; the wire order of EPS #2 and #3 is swapped relative to their
//! channel indices.

use tracing::{trace, warn};

use super::PAYLOAD_LENGTH;
use crate::types::ChannelSnapshot;

/// ATX 5V standby is only decoded when the ATX 3.3V rail reads above this
/// voltage, i.e. when a 24-pin connector is attached.
pub const ATX_PRESENT_THRESHOLD_VOLTS: f32 = 1.0;

/// Byte offsets and channel indices of one measured rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RailLayout {
    pub voltage_offset: usize,
    pub current_offset: usize,
    pub voltage_index: usize,
    pub current_index: usize,
    pub power_index: usize,
}

/// Rails carried in every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rail {
    Atx33V,
    Atx5VStandby,
    Atx12V,
    Atx5V,
    Eps1,
    Eps2,
    Eps3,
    Pcie1,
    Pcie2,
    Pcie3,
    PcieSlot33V,
    PcieSlot12V,
}

impl Rail {
    /// Rails in wire order.
    pub const ALL: [Rail; 12] = [
        Rail::Atx33V,
        Rail::Atx5VStandby,
        Rail::Atx12V,
        Rail::Atx5V,
        Rail::Eps1,
        Rail::Eps3,
        Rail::Eps2,
        Rail::Pcie3,
        Rail::Pcie2,
        Rail::PcieSlot33V,
        Rail::PcieSlot12V,
        Rail::Pcie1,
    ];

    #[rustfmt::skip]
    pub const fn layout(self) -> RailLayout {
        const fn rail(voltage_offset: usize, v: usize, i: usize, p: usize) -> RailLayout {
            RailLayout {
                voltage_offset,
                current_offset: voltage_offset + 2,
                voltage_index: v,
                current_index: i,
                power_index: p,
            }
        }

        match self {
            Rail::Atx33V       => rail(2, 36, 37, 38),
            Rail::Atx5VStandby => rail(7, 39, 40, 41),
            Rail::Atx12V       => rail(12, 30, 31, 32),
            Rail::Atx5V        => rail(17, 33, 34, 35),
            Rail::Eps1         => rail(22, 21, 24, 27),
            Rail::Eps3         => rail(32, 23, 26, 29),
            Rail::Eps2         => rail(37, 22, 25, 28),
            Rail::Pcie3        => rail(42, 8, 13, 18),
            Rail::Pcie2        => rail(47, 7, 12, 17),
            Rail::PcieSlot33V  => rail(52, 3, 4, 5),
            Rail::PcieSlot12V  => rail(57, 0, 1, 2),
            Rail::Pcie1        => rail(62, 6, 11, 16),
        }
    }
}

/// Rails decoded unconditionally, in wire order.
const ALWAYS_DECODED: [Rail; 10] = [
    Rail::Atx12V,
    Rail::Atx5V,
    Rail::Eps1,
    Rail::Eps3,
    Rail::Eps2,
    Rail::Pcie3,
    Rail::Pcie2,
    Rail::PcieSlot33V,
    Rail::PcieSlot12V,
    Rail::Pcie1,
];

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn read_u24(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([0, data[offset], data[offset + 1], data[offset + 2]])
}

/// Millivolts to volts.
fn read_voltage(data: &[u8], offset: usize) -> f32 {
    read_u16(data, offset) as f32 / 1000.0
}

/// Milliamps to amps.
fn read_current(data: &[u8], offset: usize) -> f32 {
    read_u24(data, offset) as f32 / 1000.0
}

/// Tracks the wrapping 16-bit packet number and counts gaps.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    previous: Option<u16>,
    lost: u32,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `current` and return the new cumulative loss if it changed.
    ///
    /// Only strictly increasing jumps count. A lower packet number is a
    /// wraparound (or device restart) and is never scored.
    pub fn observe(&mut self, current: u16) -> Option<u32> {
        let previous = self.previous.replace(current)?;
        if current > previous && current - previous != 1 {
            let missing = u32::from(current - previous - 1);
            self.lost = self.lost.saturating_add(missing);
            warn!("Lost {} packets ({} -> {}), {} total", missing, previous, current, self.lost);
            Some(self.lost)
        } else {
            None
        }
    }

    /// Cumulative lost packets since the last reset
    pub fn lost(&self) -> u32 {
        self.lost
    }

    pub fn previous(&self) -> Option<u16> {
        self.previous
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Decodes complete frames into channel snapshots.
#[derive(Debug, Default)]
pub struct PacketDecoder {
    sequence: SequenceTracker,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the frame whose payload starts at `offset`.
    ///
    /// Returns the snapshot stamped with `sample_index` and, when this frame
    /// revealed a gap, the new cumulative lost-packet count.
    pub fn decode(
        &mut self,
        frame: &[u8],
        offset: usize,
        sample_index: u64,
    ) -> (ChannelSnapshot, Option<u32>) {
        debug_assert!(
            offset + PAYLOAD_LENGTH <= frame.len(),
            "framer handed over a short frame: offset {} len {}",
            offset,
            frame.len()
        );
        let payload = &frame[offset..offset + PAYLOAD_LENGTH];

        let packet_number = read_u16(payload, 0);
        let lost = self.sequence.observe(packet_number);
        trace!("Packet {} -> sample {}", packet_number, sample_index);

        let mut snapshot = ChannelSnapshot::zeroed(sample_index);

        let atx_33v = decode_rail(payload, Rail::Atx33V, &mut snapshot);
        if atx_33v > ATX_PRESENT_THRESHOLD_VOLTS {
            decode_rail(payload, Rail::Atx5VStandby, &mut snapshot);
        }
        for rail in ALWAYS_DECODED {
            decode_rail(payload, rail, &mut snapshot);
        }

        (snapshot, lost)
    }

    /// Cumulative lost packets since the last reset
    pub fn lost_packets(&self) -> u32 {
        self.sequence.lost()
    }

    /// Forget the previous packet number and the loss count.
    pub fn reset(&mut self) {
        self.sequence.reset();
    }
}

/// Write voltage, current and power of `rail`; returns the voltage.
fn decode_rail(payload: &[u8], rail: Rail, snapshot: &mut ChannelSnapshot) -> f32 {
    let layout = rail.layout();
    let voltage = read_voltage(payload, layout.voltage_offset);
    let current = read_current(payload, layout.current_offset);

    snapshot.set_value(layout.voltage_index, voltage);
    snapshot.set_value(layout.current_index, current);
    snapshot.set_value(layout.power_index, voltage * current);
    voltage
}
