//! Downsampling pipeline
//!
//! The pipeline runs on its own task between the ingestion session and the
//! consumers:
//!
//! ```text
//! DriverSession ──mpsc──▶ worker (Downsampler) ──broadcast──▶ channel_stream()
//! ```
//!
//! Reconfiguration stops the running worker, takes back its receiver and
//! starts a new worker with a fresh [`Downsampler`]. A partially filled
//! window is discarded, never emitted short.

mod downsample;
mod throughput;

pub use downsample::{Downsample, DownsampleExt, Downsampler};
pub use throughput::{Throughput, ThroughputExt};

use std::sync::{Mutex as StdMutex, PoisonError};

use futures::{Stream, StreamExt};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::PipelineConfig;
use crate::types::{ChannelSnapshot, DownsamplingMode};
use crate::{PmdError, Result};

/// A running worker; awaiting the task gives the receiver back.
struct Worker {
    cancel: CancellationToken,
    task: JoinHandle<mpsc::Receiver<ChannelSnapshot>>,
}

/// Downsampling stage between the session and the consumers
pub struct Pipeline {
    worker: Mutex<Option<Worker>>,
    output: broadcast::Sender<ChannelSnapshot>,
    /// Subscribed at start so the first consumer sees every early snapshot
    first_subscriber: StdMutex<Option<broadcast::Receiver<ChannelSnapshot>>>,
    config: watch::Sender<PipelineConfig>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Start the worker on `receiver`.
    ///
    /// Workers run on child tokens of `parent`, so cancelling it stops the
    /// pipeline.
    pub fn start(
        receiver: mpsc::Receiver<ChannelSnapshot>,
        config: PipelineConfig,
        parent: &CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let downsampler = Downsampler::new(config.window_size, config.mode)?;
        let (output, first_subscriber) = broadcast::channel(config.broadcast_capacity);
        let cancel = parent.child_token();

        let worker = Self::spawn_worker(receiver, downsampler, output.clone(), &cancel);
        info!("Pipeline started (window {}, {})", config.window_size, config.mode);

        let (config, _) = watch::channel(config);
        Ok(Self {
            worker: Mutex::new(Some(worker)),
            output,
            first_subscriber: StdMutex::new(Some(first_subscriber)),
            config,
            cancel,
        })
    }

    fn spawn_worker(
        receiver: mpsc::Receiver<ChannelSnapshot>,
        downsampler: Downsampler,
        output: broadcast::Sender<ChannelSnapshot>,
        parent: &CancellationToken,
    ) -> Worker {
        let cancel = parent.child_token();
        let task = tokio::spawn(Self::worker_task(receiver, downsampler, output, cancel.clone()));
        Worker { cancel, task }
    }

    async fn worker_task(
        mut receiver: mpsc::Receiver<ChannelSnapshot>,
        mut downsampler: Downsampler,
        output: broadcast::Sender<ChannelSnapshot>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<ChannelSnapshot> {
        loop {
            let snapshot = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                snapshot = receiver.recv() => snapshot,
            };

            let Some(snapshot) = snapshot else {
                debug!("Session closed, pipeline worker stopping");
                break;
            };

            if let Some(reduced) = downsampler.push(snapshot) {
                // Err only means nobody is subscribed right now
                if output.send(reduced).is_err() {
                    trace!("No subscribers for snapshot {}", reduced.timestamp());
                }
            }
        }

        if downsampler.pending() > 0 {
            debug!("Discarding partial window of {} snapshots", downsampler.pending());
        }
        receiver
    }

    /// Stream of downsampled snapshots.
    ///
    /// The first call also yields what the worker emitted before it, up to
    /// `broadcast_capacity` snapshots; later calls start at the next
    /// snapshot. Subscribers that fall more than `broadcast_capacity`
    /// snapshots behind skip the missed snapshots. The stream ends on
    /// [`shutdown`](Self::shutdown).
    pub fn subscribe(&self) -> impl Stream<Item = ChannelSnapshot> + Send + 'static {
        let retained = self.first_subscriber.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.stream(retained.unwrap_or_else(|| self.output.subscribe()))
    }

    /// Like [`subscribe`](Self::subscribe) but always starts at the next
    /// snapshot, leaving any retained backlog for the first consumer.
    pub fn subscribe_live(&self) -> impl Stream<Item = ChannelSnapshot> + Send + 'static {
        self.stream(self.output.subscribe())
    }

    fn stream(
        &self,
        receiver: broadcast::Receiver<ChannelSnapshot>,
    ) -> impl Stream<Item = ChannelSnapshot> + Send + 'static {
        BroadcastStream::new(receiver)
            .filter_map(|item| async move {
                match item {
                    Ok(snapshot) => Some(snapshot),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!("Snapshot consumer lagged, skipped {} snapshots", skipped);
                        None
                    }
                }
            })
            .take_until(self.cancel.clone().cancelled_owned())
    }

    pub fn config(&self) -> PipelineConfig {
        self.config.borrow().clone()
    }

    pub fn subscribe_config(&self) -> watch::Receiver<PipelineConfig> {
        self.config.subscribe()
    }

    pub async fn set_window_size(&self, window_size: usize) -> Result<()> {
        self.update(|current| PipelineConfig { window_size, ..current }).await
    }

    pub async fn set_mode(&self, mode: DownsamplingMode) -> Result<()> {
        self.update(|current| PipelineConfig { mode, ..current }).await
    }

    /// Stop the running worker and start a new one with `config`.
    ///
    /// Channel capacities and calibration mode are fixed for the lifetime of
    /// the connection; only the window, mode and throughput window change.
    pub async fn reconfigure(&self, config: PipelineConfig) -> Result<()> {
        self.update(move |_| config).await
    }

    /// Derive the next config from the current one and swap workers.
    ///
    /// The worker lock is held from reading the current config until the
    /// new one is published, so concurrent changes apply in turn.
    async fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(PipelineConfig) -> PipelineConfig,
    {
        let mut worker = self.worker.lock().await;

        let current = self.config();
        let requested = change(current.clone());
        requested.validate()?;
        let downsampler = Downsampler::new(requested.window_size, requested.mode)?;

        if requested.channel_capacity != current.channel_capacity
            || requested.broadcast_capacity != current.broadcast_capacity
        {
            debug!("Channel capacities only apply to new connections");
        }
        let applied = PipelineConfig {
            channel_capacity: current.channel_capacity,
            broadcast_capacity: current.broadcast_capacity,
            calibration_mode: current.calibration_mode,
            ..requested
        };

        let receiver = Self::stop_worker(worker.take()).await?;
        *worker = Some(Self::spawn_worker(receiver, downsampler, self.output.clone(), &self.cancel));
        debug!("Pipeline reconfigured (window {}, {})", applied.window_size, applied.mode);
        self.config.send_replace(applied);
        Ok(())
    }

    async fn stop_worker(worker: Option<Worker>) -> Result<mpsc::Receiver<ChannelSnapshot>> {
        let worker = worker.ok_or_else(|| PmdError::channel_closed("pipeline"))?;
        worker.cancel.cancel();
        worker.task.await.map_err(|e| {
            warn!("Pipeline worker failed: {}", e);
            PmdError::channel_closed("pipeline")
        })
    }

    /// Stop the worker, close the session handoff and end every subscriber
    /// stream.
    ///
    /// The session keeps running but every snapshot it decodes afterwards is
    /// discarded.
    pub async fn shutdown(&self) {
        let mut worker = self.worker.lock().await;
        if let Ok(receiver) = Self::stop_worker(worker.take()).await {
            drop(receiver);
            info!("Pipeline stopped");
        }
        self.first_subscriber.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.cancel.cancel();
    }

    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.as_ref().is_some_and(|worker| !worker.task.is_finished())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::snapshot_with;
    use std::time::Duration;

    fn start(capacity: usize, config: PipelineConfig) -> (mpsc::Sender<ChannelSnapshot>, Pipeline) {
        let (tx, rx) = mpsc::channel(capacity);
        let pipeline = Pipeline::start(rx, config, &CancellationToken::new()).expect("valid config");
        (tx, pipeline)
    }

    async fn next(stream: &mut (impl Stream<Item = ChannelSnapshot> + Unpin)) -> ChannelSnapshot {
        tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("snapshot within timeout")
            .expect("stream open")
    }

    #[tokio::test]
    async fn averages_windows() {
        let (tx, pipeline) = start(16, PipelineConfig::new(2, DownsamplingMode::Average));
        let mut stream = Box::pin(pipeline.subscribe());

        for (t, value) in [(0, 1.0), (1, 3.0), (2, 10.0), (3, 20.0)] {
            tx.send(snapshot_with(t, &[], value)).await.expect("send");
        }

        let first = next(&mut stream).await;
        assert_eq!((first.timestamp(), first.value(0)), (1, 2.0));
        let second = next(&mut stream).await;
        assert_eq!((second.timestamp(), second.value(41)), (3, 15.0));
    }

    #[tokio::test]
    async fn invalid_start_config_is_rejected() {
        let (_tx, rx) = mpsc::channel(1);
        let result =
            Pipeline::start(rx, PipelineConfig::new(0, DownsamplingMode::Single), &CancellationToken::new());
        assert!(matches!(result, Err(PmdError::InvalidWindowSize { size: 0 })));
    }

    #[tokio::test]
    async fn reconfigure_discards_partial_window() {
        let (tx, pipeline) = start(16, PipelineConfig::new(3, DownsamplingMode::Average));
        let mut stream = Box::pin(pipeline.subscribe());

        tx.send(snapshot_with(0, &[], 100.0)).await.expect("send");
        tx.send(snapshot_with(1, &[], 100.0)).await.expect("send");
        tokio::time::sleep(Duration::from_millis(20)).await;

        pipeline.set_window_size(2).await.expect("reconfigure");
        assert_eq!(pipeline.config().window_size, 2);
        assert_eq!(pipeline.config().mode, DownsamplingMode::Average);

        tx.send(snapshot_with(2, &[], 1.0)).await.expect("send");
        tx.send(snapshot_with(3, &[], 3.0)).await.expect("send");

        let emitted = next(&mut stream).await;
        assert_eq!((emitted.timestamp(), emitted.value(0)), (3, 2.0));
    }

    #[tokio::test]
    async fn set_mode_keeps_window() {
        let (tx, pipeline) = start(16, PipelineConfig::new(2, DownsamplingMode::Average));
        let mut stream = Box::pin(pipeline.subscribe());

        pipeline.set_mode(DownsamplingMode::Single).await.expect("reconfigure");
        tx.send(snapshot_with(0, &[], 1.0)).await.expect("send");
        tx.send(snapshot_with(1, &[], 3.0)).await.expect("send");

        assert_eq!(next(&mut stream).await.value(0), 3.0);
        assert_eq!(pipeline.config().window_size, 2);
    }

    #[tokio::test]
    async fn invalid_reconfigure_keeps_running_worker() {
        let (tx, pipeline) = start(16, PipelineConfig::default());
        let mut stream = Box::pin(pipeline.subscribe());

        assert!(pipeline.set_window_size(0).await.is_err());
        assert!(pipeline.is_running().await);

        tx.send(snapshot_with(9, &[], 1.0)).await.expect("send");
        assert_eq!(next(&mut stream).await.timestamp(), 9);
    }

    #[tokio::test]
    async fn capacities_are_fixed_after_start() {
        let (_tx, pipeline) = start(16, PipelineConfig::default());
        let config = PipelineConfig { channel_capacity: 1, window_size: 5, ..PipelineConfig::default() };
        pipeline.reconfigure(config).await.expect("reconfigure");

        let applied = pipeline.config();
        assert_eq!(applied.window_size, 5);
        assert_eq!(applied.channel_capacity, PipelineConfig::default().channel_capacity);
    }

    #[tokio::test]
    async fn shutdown_closes_handoff() {
        let (tx, pipeline) = start(4, PipelineConfig::default());
        let mut stream = Box::pin(pipeline.subscribe());
        pipeline.shutdown().await;

        assert!(tx.is_closed());
        assert!(stream.next().await.is_none());
        assert!(!pipeline.is_running().await);
        assert!(matches!(
            pipeline.set_window_size(2).await,
            Err(PmdError::ChannelClosed { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_setters_both_apply() {
        let (_tx, pipeline) = start(16, PipelineConfig::default());

        let (window, mode) =
            tokio::join!(pipeline.set_window_size(4), pipeline.set_mode(DownsamplingMode::Average));
        window.expect("window");
        mode.expect("mode");

        let applied = pipeline.config();
        assert_eq!((applied.window_size, applied.mode), (4, DownsamplingMode::Average));
    }

    #[tokio::test]
    async fn first_subscriber_sees_snapshots_sent_before_subscribing() {
        let (tx, pipeline) = start(16, PipelineConfig::default());
        let mut live = Box::pin(pipeline.subscribe_live());

        for t in 0..3 {
            tx.send(snapshot_with(t, &[], 0.0)).await.expect("send");
        }
        assert_eq!(next(&mut live).await.timestamp(), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut first = Box::pin(pipeline.subscribe());
        for t in 0..3 {
            assert_eq!(next(&mut first).await.timestamp(), t);
        }

        let mut second = Box::pin(pipeline.subscribe());
        tx.send(snapshot_with(3, &[], 0.0)).await.expect("send");
        assert_eq!(next(&mut second).await.timestamp(), 3);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead() {
        let config = PipelineConfig { broadcast_capacity: 2, ..PipelineConfig::default() };
        let (tx, pipeline) = start(16, config);
        let mut stream = Box::pin(pipeline.subscribe());

        for t in 0..6 {
            tx.send(snapshot_with(t, &[], 0.0)).await.expect("send");
        }
        // let the worker publish everything before reading
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(next(&mut stream).await.timestamp(), 4);
        assert_eq!(next(&mut stream).await.timestamp(), 5);
    }
}
