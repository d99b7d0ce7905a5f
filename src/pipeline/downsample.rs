//! Window reduction of snapshot streams

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::topology::CHANNEL_COUNT;
use crate::types::{ChannelSnapshot, DownsamplingMode};
use crate::{PmdError, Result};

/// Folds every `window_size` consecutive snapshots into one.
///
/// - [`DownsamplingMode::Single`] emits the last snapshot of each window.
/// - [`DownsamplingMode::Average`] emits the per-channel arithmetic mean,
///   stamped with the timestamp of the last snapshot in the window.
///
/// Sums are kept in `f64` so long windows do not lose precision.
#[derive(Debug, Clone)]
pub struct Downsampler {
    window_size: usize,
    mode: DownsamplingMode,
    count: usize,
    sums: [f64; CHANNEL_COUNT],
    last: Option<ChannelSnapshot>,
}

impl Downsampler {
    pub fn new(window_size: usize, mode: DownsamplingMode) -> Result<Self> {
        if window_size == 0 {
            return Err(PmdError::InvalidWindowSize { size: window_size });
        }
        Ok(Self { window_size, mode, count: 0, sums: [0.0; CHANNEL_COUNT], last: None })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn mode(&self) -> DownsamplingMode {
        self.mode
    }

    /// Snapshots collected towards the current window
    pub fn pending(&self) -> usize {
        self.count
    }

    /// Add a snapshot; returns the reduced snapshot once the window is full.
    pub fn push(&mut self, snapshot: ChannelSnapshot) -> Option<ChannelSnapshot> {
        if self.mode.needs_full_window() {
            for (sum, sample) in self.sums.iter_mut().zip(snapshot.iter()) {
                *sum += f64::from(sample.value);
            }
        }
        self.count += 1;
        self.last = Some(snapshot);

        if self.count < self.window_size {
            return None;
        }

        let mut reduced = self.last.take()?;
        if self.mode == DownsamplingMode::Average {
            let count = self.count as f64;
            for (index, sum) in self.sums.iter().enumerate() {
                reduced.set_value(index, (sum / count) as f32);
            }
        }
        self.reset();
        Some(reduced)
    }

    /// Discard a partially filled window.
    pub fn reset(&mut self) {
        self.count = 0;
        self.sums = [0.0; CHANNEL_COUNT];
        self.last = None;
    }
}

/// Extension trait to downsample any snapshot stream
pub trait DownsampleExt: Stream<Item = ChannelSnapshot> {
    /// Reduce every `window_size` items to one.
    ///
    /// A trailing partial window is dropped when the stream ends.
    fn downsample(self, window_size: usize, mode: DownsamplingMode) -> Result<Downsample<Self>>
    where
        Self: Sized,
    {
        Ok(Downsample { stream: self, downsampler: Downsampler::new(window_size, mode)? })
    }
}

impl<T: Stream<Item = ChannelSnapshot>> DownsampleExt for T {}

pin_project! {
    /// A stream combinator that folds fixed windows of snapshots
    pub struct Downsample<S> {
        #[pin]
        stream: S,
        downsampler: Downsampler,
    }
}

impl<S: Stream<Item = ChannelSnapshot>> Stream for Downsample<S> {
    type Item = ChannelSnapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            match ready!(this.stream.as_mut().poll_next(cx)) {
                Some(snapshot) => {
                    if let Some(reduced) = this.downsampler.push(snapshot) {
                        return Poll::Ready(Some(reduced));
                    }
                }
                None => return Poll::Ready(None),
            }
        }
    }
}
