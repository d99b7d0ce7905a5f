//! Aggregate power over snapshot histories
//!
//! Consumers usually keep a [`SnapshotHistory`] of the emitted stream and
//! derive charts ([`power_series`]) and summary figures ([`PowerMetrics`])
//! from it.
//!
//! ```rust
//! use pmdstream::power::{PowerMetricSet, group_power};
//! use pmdstream::{ChannelSnapshot, PowerGroup};
//!
//! let snapshot = ChannelSnapshot::zeroed(0);
//! assert_eq!(group_power(&snapshot, PowerGroup::Gpu), 0.0);
//! let history: Vec<ChannelSnapshot> = Vec::new();
//! assert!(PowerMetricSet::from_history(&history, PowerGroup::Gpu).is_none());
//! ```

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::Serialize;

use crate::topology::PowerGroup;
use crate::types::ChannelSnapshot;

/// Sum of the group's power channels in watts.
pub fn group_power(snapshot: &ChannelSnapshot, group: PowerGroup) -> f32 {
    snapshot.sum(group.power_indices())
}

/// One point of a power chart
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerPoint {
    /// Distance from the first snapshot of the series
    pub elapsed: f64,
    pub watts: f32,
}

/// Group power over a history, `elapsed` in sample-index units.
pub fn power_series<'a, I>(history: I, group: PowerGroup) -> Vec<PowerPoint>
where
    I: IntoIterator<Item = &'a ChannelSnapshot>,
{
    series(history, group, 1.0)
}

/// Group power over a history, `elapsed` in seconds at `sample_rate_hz`.
pub fn power_series_seconds<'a, I>(
    history: I,
    group: PowerGroup,
    sample_rate_hz: f64,
) -> Vec<PowerPoint>
where
    I: IntoIterator<Item = &'a ChannelSnapshot>,
{
    series(history, group, 1.0 / sample_rate_hz)
}

pub fn eps_power_series<'a, I>(history: I) -> Vec<PowerPoint>
where
    I: IntoIterator<Item = &'a ChannelSnapshot>,
{
    power_series(history, PowerGroup::Eps)
}

pub fn gpu_power_series<'a, I>(history: I) -> Vec<PowerPoint>
where
    I: IntoIterator<Item = &'a ChannelSnapshot>,
{
    power_series(history, PowerGroup::Gpu)
}

fn series<'a, I>(history: I, group: PowerGroup, scale: f64) -> Vec<PowerPoint>
where
    I: IntoIterator<Item = &'a ChannelSnapshot>,
{
    let mut history = history.into_iter().peekable();
    let Some(first) = history.peek().map(|snapshot| snapshot.timestamp()) else {
        return Vec::new();
    };

    history
        .map(|snapshot| PowerPoint {
            elapsed: snapshot.timestamp().saturating_sub(first) as f64 * scale,
            watts: group_power(snapshot, group),
        })
        .collect()
}

/// Minimum, mean and maximum group power over a history
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct PowerMetricSet {
    pub min: f32,
    pub average: f32,
    pub max: f32,
}

impl PowerMetricSet {
    /// `None` for an empty history.
    pub fn from_history<'a, I>(history: I, group: PowerGroup) -> Option<Self>
    where
        I: IntoIterator<Item = &'a ChannelSnapshot>,
    {
        let mut count = 0usize;
        let mut sum = 0.0f64;
        let mut min = f32::MAX;
        let mut max = f32::MIN;

        for snapshot in history {
            let watts = group_power(snapshot, group);
            count += 1;
            sum += f64::from(watts);
            min = min.min(watts);
            max = max.max(watts);
        }

        (count > 0).then(|| Self { min, average: (sum / count as f64) as f32, max })
    }
}

#[derive(Debug, Clone, Default)]
struct GroupMetrics {
    averages: VecDeque<f32>,
    max: Option<f32>,
}

/// Rolling power figures per group.
///
/// Each [`update`](Self::update) receives the history visible at one refresh
/// and records its average. The reported average is the mean of the
/// averages seen during the last `data_window`; the maximum is the largest
/// value seen since creation or the last [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct PowerMetrics {
    history_length: usize,
    groups: HashMap<PowerGroup, GroupMetrics>,
}

impl PowerMetrics {
    pub fn new(refresh_period: Duration, data_window: Duration) -> Self {
        let refresh = refresh_period.as_secs_f64();
        let history_length =
            if refresh > 0.0 { (data_window.as_secs_f64() / refresh) as usize } else { 1 };
        Self { history_length: history_length.max(1), groups: HashMap::new() }
    }

    /// Number of refreshes averaged together
    pub fn history_length(&self) -> usize {
        self.history_length
    }

    /// Fold one refresh worth of snapshots into every group.
    pub fn update(&mut self, history: &[ChannelSnapshot]) {
        for group in PowerGroup::ALL {
            let Some(set) = PowerMetricSet::from_history(history, group) else {
                continue;
            };
            let metrics = self.groups.entry(group).or_default();

            metrics.averages.push_back(set.average);
            while metrics.averages.len() > self.history_length {
                metrics.averages.pop_front();
            }
            metrics.max = Some(metrics.max.map_or(set.max, |max| max.max(set.max)));
        }
    }

    /// Mean of the retained averages, `None` before the first update.
    pub fn average(&self, group: PowerGroup) -> Option<f32> {
        let metrics = self.groups.get(&group)?;
        if metrics.averages.is_empty() {
            return None;
        }
        let sum: f64 = metrics.averages.iter().map(|&v| f64::from(v)).sum();
        Some((sum / metrics.averages.len() as f64) as f32)
    }

    pub fn max(&self, group: PowerGroup) -> Option<f32> {
        self.groups.get(&group).and_then(|metrics| metrics.max)
    }

    pub fn reset(&mut self) {
        self.groups.clear();
    }
}

/// Bounded FIFO of the most recent snapshots
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    capacity: usize,
    snapshots: VecDeque<ChannelSnapshot>,
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, snapshots: VecDeque::with_capacity(capacity) }
    }

    /// Append, evicting the oldest snapshot when full.
    pub fn push(&mut self, snapshot: ChannelSnapshot) {
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, ChannelSnapshot> {
        self.snapshots.iter()
    }

    pub fn to_vec(&self) -> Vec<ChannelSnapshot> {
        self.snapshots.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<&ChannelSnapshot> {
        self.snapshots.back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

impl<'a> IntoIterator for &'a SnapshotHistory {
    type Item = &'a ChannelSnapshot;
    type IntoIter = std::collections::vec_deque::Iter<'a, ChannelSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.iter()
    }
}
