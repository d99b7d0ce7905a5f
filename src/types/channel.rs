//! Channel sample types

use serde::Serialize;
use std::fmt;

/// Connector family a channel is measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[allow(clippy::upper_case_acronyms)]
pub enum ChannelGroup {
    /// CPU EPS 12V connectors
    EPS,
    /// PCIe auxiliary power connectors (6+2 pin, 12+4 pin)
    PCIe,
    /// PCIe slot rails, measured by the riser board
    PCIeSlot,
    /// 24-pin ATX connector
    ATX,
}

impl fmt::Display for ChannelGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelGroup::EPS => "EPS",
            ChannelGroup::PCIe => "PCIe",
            ChannelGroup::PCIeSlot => "PCIe Slot",
            ChannelGroup::ATX => "ATX",
        };
        f.write_str(name)
    }
}

/// Physical quantity carried by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum Measurand {
    Voltage,
    Current,
    Power,
}

impl Measurand {
    /// SI unit symbol for values of this measurand.
    pub fn unit(self) -> &'static str {
        match self {
            Measurand::Voltage => "V",
            Measurand::Current => "A",
            Measurand::Power => "W",
        }
    }
}

/// A single measurement of one logical channel.
///
/// `timestamp` is the sample index assigned by the driver session, not a wall
/// clock. All samples decoded from the same frame share it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelSample {
    pub name: &'static str,
    pub channel_group: ChannelGroup,
    pub measurand: Measurand,
    pub value: f32,
    pub timestamp: u64,
}
