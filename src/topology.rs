//! Static channel topology and derived index groups.
//!
//! The 42 logical channels are laid out once and never reordered: snapshot
//! position `i` always holds channel `CHANNELS[i]`. Index groups are plain
//! lists of positions, computed on first use and shared for the lifetime of
//! the process.
//!
//! ## Layout
//!
//! | Indices | Rails |
//! |---|---|
//! | 0..=5 | PCIe slot 12V and 3.3V (V, I, P each) |
//! | 6..=20 | PCIe 12V lanes 1-5 (voltages, currents, powers) |
//! | 21..=29 | EPS 12V rails 1-3 (voltages, currents, powers) |
//! | 30..=41 | ATX 12V, 5V, 3.3V, 5V standby (V, I, P each) |

use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::types::{ChannelGroup, Measurand};

/// Number of logical channels in every snapshot.
pub const CHANNEL_COUNT: usize = 42;

/// Static description of one logical channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    pub index: usize,
    pub name: &'static str,
    pub channel_group: ChannelGroup,
    pub measurand: Measurand,
}

const fn channel(
    index: usize,
    name: &'static str,
    channel_group: ChannelGroup,
    measurand: Measurand,
) -> ChannelInfo {
    ChannelInfo { index, name, channel_group, measurand }
}

use ChannelGroup::{ATX, EPS, PCIe, PCIeSlot};
use Measurand::{Current, Power, Voltage};

/// The channel table, ordered by index.
#[rustfmt::skip]
pub const CHANNELS: [ChannelInfo; CHANNEL_COUNT] = [
    channel(0, "PCIe_Slot_12V_Voltage", PCIeSlot, Voltage),
    channel(1, "PCIe_Slot_12V_Current", PCIeSlot, Current),
    channel(2, "PCIe_Slot_12V_Power", PCIeSlot, Power),

    channel(3, "PCIe_Slot_33V_Voltage", PCIeSlot, Voltage),
    channel(4, "PCIe_Slot_33V_Current", PCIeSlot, Current),
    channel(5, "PCIe_Slot_33V_Power", PCIeSlot, Power),

    channel(6, "PCIe_12V_Voltage1", PCIe, Voltage),
    channel(7, "PCIe_12V_Voltage2", PCIe, Voltage),
    channel(8, "PCIe_12V_Voltage3", PCIe, Voltage),
    channel(9, "PCIe_12V_Voltage4", PCIe, Voltage),
    channel(10, "PCIe_12V_Voltage5", PCIe, Voltage),

    channel(11, "PCIe_12V_Current1", PCIe, Current),
    channel(12, "PCIe_12V_Current2", PCIe, Current),
    channel(13, "PCIe_12V_Current3", PCIe, Current),
    channel(14, "PCIe_12V_Current4", PCIe, Current),
    channel(15, "PCIe_12V_Current5", PCIe, Current),

    channel(16, "PCIe_12V_Power1", PCIe, Power),
    channel(17, "PCIe_12V_Power2", PCIe, Power),
    channel(18, "PCIe_12V_Power3", PCIe, Power),
    channel(19, "PCIe_12V_Power4", PCIe, Power),
    channel(20, "PCIe_12V_Power5", PCIe, Power),

    channel(21, "EPS_Voltage1", EPS, Voltage),
    channel(22, "EPS_Voltage2", EPS, Voltage),
    channel(23, "EPS_Voltage3", EPS, Voltage),

    channel(24, "EPS_Current1", EPS, Current),
    channel(25, "EPS_Current2", EPS, Current),
    channel(26, "EPS_Current3", EPS, Current),

    channel(27, "EPS_Power1", EPS, Power),
    channel(28, "EPS_Power2", EPS, Power),
    channel(29, "EPS_Power3", EPS, Power),

    channel(30, "ATX_12V_Voltage", ATX, Voltage),
    channel(31, "ATX_12V_Current", ATX, Current),
    channel(32, "ATX_12V_Power", ATX, Power),

    channel(33, "ATX_5V_Voltage", ATX, Voltage),
    channel(34, "ATX_5V_Current", ATX, Current),
    channel(35, "ATX_5V_Power", ATX, Power),

    channel(36, "ATX_33V_Voltage", ATX, Voltage),
    channel(37, "ATX_33V_Current", ATX, Current),
    channel(38, "ATX_33V_Power", ATX, Power),

    channel(39, "ATX_STB_Voltage", ATX, Voltage),
    channel(40, "ATX_STB_Current", ATX, Current),
    channel(41, "ATX_STB_Power", ATX, Power),
];

/// Power channel index and the (voltage, current) channels it is derived from.
pub const POWER_DEPENDENCIES: [(usize, (usize, usize)); 14] = [
    (2, (0, 1)),
    (5, (3, 4)),
    (16, (6, 11)),
    (17, (7, 12)),
    (18, (8, 13)),
    (19, (9, 14)),
    (20, (10, 15)),
    (27, (21, 24)),
    (28, (22, 25)),
    (29, (23, 26)),
    (32, (30, 31)),
    (35, (33, 34)),
    (38, (36, 37)),
    (41, (39, 40)),
];

/// (voltage, current) channels a power channel is derived from.
pub fn power_dependencies(power_index: usize) -> Option<(usize, usize)> {
    POWER_DEPENDENCIES
        .iter()
        .find(|(index, _)| *index == power_index)
        .map(|(_, dependencies)| *dependencies)
}

/// Look up a channel by its name.
pub fn channel_by_name(name: &str) -> Option<&'static ChannelInfo> {
    CHANNELS.iter().find(|info| info.name == name)
}

/// Voltage, current and power index lists for one set of rails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeasurandIndices {
    pub voltage: Vec<usize>,
    pub current: Vec<usize>,
    pub power: Vec<usize>,
}

impl MeasurandIndices {
    fn of(channel_group: ChannelGroup) -> Self {
        let select = |measurand| {
            CHANNELS
                .iter()
                .filter(|info| info.channel_group == channel_group && info.measurand == measurand)
                .map(|info| info.index)
                .collect()
        };
        Self { voltage: select(Voltage), current: select(Current), power: select(Power) }
    }

    fn concat(parts: &[&MeasurandIndices]) -> Self {
        let mut out = Self::default();
        for part in parts {
            out.voltage.extend_from_slice(&part.voltage);
            out.current.extend_from_slice(&part.current);
            out.power.extend_from_slice(&part.power);
        }
        out
    }

    /// Index list for `measurand`
    pub fn get(&self, measurand: Measurand) -> &[usize] {
        match measurand {
            Voltage => &self.voltage,
            Current => &self.current,
            Power => &self.power,
        }
    }
}

/// Precomputed index groups per connector family plus composite groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexGroups {
    pub atx: MeasurandIndices,
    pub eps: MeasurandIndices,
    pub pcie: MeasurandIndices,
    pub pcie_slot: MeasurandIndices,
    /// PCIe slot rails followed by PCIe connector rails
    pub gpu: MeasurandIndices,
    /// PCIe connectors, EPS and ATX. The slot rails are fed from ATX and
    /// would be counted twice.
    pub system: MeasurandIndices,
}

impl IndexGroups {
    fn build() -> Self {
        let atx = MeasurandIndices::of(ATX);
        let eps = MeasurandIndices::of(EPS);
        let pcie = MeasurandIndices::of(PCIe);
        let pcie_slot = MeasurandIndices::of(PCIeSlot);
        let gpu = MeasurandIndices::concat(&[&pcie_slot, &pcie]);
        let system = MeasurandIndices::concat(&[&pcie, &eps, &atx]);
        Self { atx, eps, pcie, pcie_slot, gpu, system }
    }

    /// Indices for `group`
    pub fn get(&self, group: PowerGroup) -> &MeasurandIndices {
        match group {
            PowerGroup::Gpu => &self.gpu,
            PowerGroup::PcieSlot => &self.pcie_slot,
            PowerGroup::Pcie => &self.pcie,
            PowerGroup::Eps => &self.eps,
            PowerGroup::Atx => &self.atx,
            PowerGroup::System => &self.system,
        }
    }
}

static GROUPS: LazyLock<IndexGroups> = LazyLock::new(IndexGroups::build);

/// Shared index groups, built on first access.
pub fn groups() -> &'static IndexGroups {
    &GROUPS
}

/// Named aggregate used for power sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum PowerGroup {
    /// PCIe slot and PCIe connectors
    Gpu,
    PcieSlot,
    Pcie,
    /// EPS 12V total (CPU)
    Eps,
    Atx,
    /// Whole system input
    System,
}

impl PowerGroup {
    /// Every group, in display order.
    pub const ALL: [PowerGroup; 6] = [
        PowerGroup::System,
        PowerGroup::Gpu,
        PowerGroup::Pcie,
        PowerGroup::PcieSlot,
        PowerGroup::Eps,
        PowerGroup::Atx,
    ];

    pub fn power_indices(self) -> &'static [usize] {
        &groups().get(self).power
    }

    pub fn voltage_indices(self) -> &'static [usize] {
        &groups().get(self).voltage
    }

    pub fn current_indices(self) -> &'static [usize] {
        &groups().get(self).current
    }
}

impl fmt::Display for PowerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PowerGroup::Gpu => "GPU",
            PowerGroup::PcieSlot => "PCIe slot",
            PowerGroup::Pcie => "PCIe",
            PowerGroup::Eps => "EPS12V total",
            PowerGroup::Atx => "ATX",
            PowerGroup::System => "System",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_ordered_by_index() {
        for (position, info) in CHANNELS.iter().enumerate() {
            assert_eq!(info.index, position, "channel {} out of place", info.name);
        }
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = CHANNELS.iter().map(|info| info.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CHANNEL_COUNT);
    }

    #[test]
    fn per_family_groups() {
        let groups = groups();
        assert_eq!(groups.pcie_slot.power, vec![2, 5]);
        assert_eq!(groups.pcie.power, vec![16, 17, 18, 19, 20]);
        assert_eq!(groups.eps.voltage, vec![21, 22, 23]);
        assert_eq!(groups.eps.current, vec![24, 25, 26]);
        assert_eq!(groups.eps.power, vec![27, 28, 29]);
        assert_eq!(groups.atx.power, vec![32, 35, 38, 41]);
        assert_eq!(groups.atx.current, vec![31, 34, 37, 40]);
    }

    #[test]
    fn composite_groups() {
        let groups = groups();
        assert_eq!(groups.gpu.power, vec![2, 5, 16, 17, 18, 19, 20]);
        assert_eq!(
            groups.system.power,
            vec![16, 17, 18, 19, 20, 27, 28, 29, 32, 35, 38, 41]
        );
        assert_eq!(groups.system.current.len(), 5 + 3 + 4);
        assert!(groups.system.current.iter().all(|&i| CHANNELS[i].measurand == Current));
    }

    #[test]
    fn power_groups_only_contain_power_channels() {
        for group in PowerGroup::ALL {
            assert!(!group.power_indices().is_empty());
            for &index in group.power_indices() {
                assert_eq!(CHANNELS[index].measurand, Power, "{group}: index {index}");
            }
        }
    }

    #[test]
    fn power_dependencies_match_rails() {
        for (power, (voltage, current)) in POWER_DEPENDENCIES {
            assert_eq!(CHANNELS[power].measurand, Power);
            assert_eq!(CHANNELS[voltage].measurand, Voltage);
            assert_eq!(CHANNELS[current].measurand, Current);
            assert_eq!(CHANNELS[power].channel_group, CHANNELS[voltage].channel_group);
            assert_eq!(CHANNELS[power].channel_group, CHANNELS[current].channel_group);
        }
        assert_eq!(power_dependencies(2), Some((0, 1)));
        assert_eq!(power_dependencies(1), None);
    }

    #[test]
    fn lookup_by_name() {
        let info = channel_by_name("EPS_Power2").expect("channel exists");
        assert_eq!(info.index, 28);
        assert!(channel_by_name("GPU_Fan").is_none());
    }
}
