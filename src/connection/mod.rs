//! PMD connection: session, pipeline and transport reader wired together

use std::sync::Arc;

use futures::Stream;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::driver::{Driver, DriverHandle};
use crate::pipeline::{Pipeline, ThroughputExt};
use crate::session::DriverSession;
use crate::transport::Transport;
use crate::Result;
use crate::types::{ChannelSnapshot, DownsamplingMode, DriverStatus};


/// Live connection to a PMD
///
/// Created by [`Pmd::connect`](crate::Pmd::connect) and friends. Dropping the
/// connection cancels every task it started; [`disconnect`](Self::disconnect)
/// does the same but waits for the transport to be closed and resets the
/// session.
pub struct PmdConnection {
    /// Transport name, or "push" when bytes arrive through `feed`
    name: String,

    /// Ingestion state shared with the reader task
    session: Arc<DriverSession>,

    pipeline: Pipeline,

    /// Reader task; `None` in push mode or after disconnect
    driver: Option<DriverHandle>,

    /// Parent of every task token
    cancel: CancellationToken,
}

impl PmdConnection {
    /// Start the session and pipeline, then the reader task on `transport`.
    pub(crate) fn open<T: Transport>(transport: T, config: PipelineConfig) -> Result<Self> {
        let name = transport.name().to_string();
        info!("Connecting to PMD on {}", name);

        let calibration_mode = config.calibration_mode;
        let mut connection = Self::start(name, config)?;
        let driver = Driver::spawn(
            transport,
            Arc::clone(&connection.session),
            calibration_mode,
            connection.cancel.child_token(),
        );
        connection.driver = Some(driver);

        info!("PMD connection established");
        Ok(connection)
    }

    /// Start without a reader task; bytes arrive through [`feed`](Self::feed).
    pub(crate) fn attach(config: PipelineConfig) -> Result<Self> {
        info!("Attaching PMD session in push mode");
        Self::start("push".to_string(), config)
    }

    fn start(name: String, config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let cancel = CancellationToken::new();
        let (session, receiver) = DriverSession::new(config.channel_capacity);
        let pipeline = Pipeline::start(receiver, config, &cancel)?;
        session.connect();

        Ok(Self { name, session: Arc::new(session), pipeline, driver: None, cancel })
    }

    /// Push raw bytes into the session; returns the number of frames decoded.
    ///
    /// Never blocks, so it can be called from a serial port's data-received
    /// callback. Bytes fed alongside a running reader task interleave with
    /// its reads.
    pub fn feed(&self, bytes: &[u8]) -> usize {
        self.session.feed(bytes)
    }

    /// Downsampled snapshots; ends on disconnect.
    ///
    /// The first stream starts at the connection's first snapshot, so a
    /// replay can be subscribed after it was opened. Up to
    /// `broadcast_capacity` snapshots are held for it; later streams start
    /// at the next snapshot.
    pub fn channel_stream(&self) -> impl Stream<Item = ChannelSnapshot> + Send + 'static {
        self.pipeline.subscribe()
    }

    /// Cumulative lost packet count, current value first.
    pub fn lost_packets(&self) -> impl Stream<Item = u32> + Send + 'static {
        WatchStream::new(self.session.subscribe_lost_packets())
    }

    pub fn lost_packet_count(&self) -> u32 {
        self.session.lost_packets()
    }

    /// Driver status changes, current value first.
    pub fn status_updates(&self) -> impl Stream<Item = DriverStatus> + Send + 'static {
        WatchStream::new(self.session.subscribe_status())
    }

    pub fn status(&self) -> DriverStatus {
        self.session.status()
    }

    /// Emitted snapshots per second over the configured throughput window.
    pub fn throughput(&self) -> impl Stream<Item = f64> + Send + 'static {
        let window = self.pipeline.config().throughput_window();
        self.pipeline.subscribe_live().throughput(window)
    }

    /// Snapshots dropped because the pipeline fell behind
    pub fn dropped_snapshots(&self) -> u64 {
        self.session.dropped_snapshots()
    }

    pub fn config(&self) -> PipelineConfig {
        self.pipeline.config()
    }

    pub async fn set_window_size(&self, window_size: usize) -> Result<()> {
        self.pipeline.set_window_size(window_size).await
    }

    pub async fn set_mode(&self, mode: DownsamplingMode) -> Result<()> {
        self.pipeline.set_mode(mode).await
    }

    pub async fn reconfigure(&self, config: PipelineConfig) -> Result<()> {
        self.pipeline.reconfigure(config).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the pipeline, close the transport and reset the session.
    ///
    /// Afterwards the status is [`DriverStatus::Ready`], all counters are
    /// zero and the snapshot streams have ended. Status and loss streams end
    /// when the connection is dropped.
    pub async fn disconnect(&mut self) {
        info!("Disconnecting PMD on {}", self.name);
        self.pipeline.shutdown().await;
        if let Some(driver) = self.driver.take() {
            driver.shutdown().await;
        }
        self.session.disconnect();
        self.cancel.cancel();
    }
}

impl Drop for PmdConnection {
    fn drop(&mut self) {
        debug!("Dropping PMD connection on {}", self.name);
        self.cancel.cancel();
    }
}
