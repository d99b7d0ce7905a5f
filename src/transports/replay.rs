//! Replay transport for raw PMD byte captures

use std::path::Path;

use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use crate::transport::Transport;
use crate::{PmdError, Result};

/// Default read size, roughly what a serial driver hands over at 921600 baud
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Replays a capture of raw device bytes in fixed-size chunks.
///
/// Chunks deliberately ignore frame boundaries, like a real serial read.
pub struct ReplayTransport {
    name: String,
    data: Vec<u8>,
    position: usize,
    chunk_size: usize,
    pacing: Option<Interval>,
}

impl ReplayTransport {
    /// Load a capture file.
    pub fn open<P: AsRef<Path>>(path: P, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| PmdError::file_error(path.to_path_buf(), e))?;
        info!("Opened capture {}: {} bytes", path.display(), data.len());
        Ok(Self::new(path.display().to_string(), data, chunk_size))
    }

    /// Replay bytes already in memory.
    pub fn from_bytes(data: Vec<u8>, chunk_size: usize) -> Self {
        Self::new("memory".to_string(), data, chunk_size)
    }

    fn new(name: String, data: Vec<u8>, chunk_size: usize) -> Self {
        Self { name, data, position: 0, chunk_size: chunk_size.max(1), pacing: None }
    }

    /// Deliver one chunk per `period` instead of as fast as possible.
    pub fn with_pacing(mut self, period: Duration) -> Self {
        let mut pacing = interval(period);
        pacing.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.pacing = Some(pacing);
        self
    }

    /// Bytes not yet delivered
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

#[async_trait::async_trait]
impl Transport for ReplayTransport {
    async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        if self.position >= self.data.len() {
            debug!("Reached end of capture {}", self.name);
            return Ok(None);
        }

        match self.pacing.as_mut() {
            Some(pacing) => {
                pacing.tick().await;
            }
            // give the pipeline a turn so an unpaced replay does not overrun it
            None => tokio::task::yield_now().await,
        }

        let end = (self.position + self.chunk_size).min(self.data.len());
        let chunk = self.data[self.position..end].to_vec();
        self.position = end;
        trace!("Replayed {} bytes ({} remaining)", chunk.len(), self.remaining());
        Ok(Some(chunk))
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        // captures cannot be commanded
        trace!("{}: ignoring write of {} bytes", self.name, bytes.len());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
