//! Driver session: the ingestion state behind the transport callback.
//!
//! A session owns the frame buffer, the sequence counter and the sample
//! index. [`DriverSession::feed`] runs framing and decoding under a single
//! mutex and hands snapshots to the pipeline with a non-blocking `try_send`,
//! so it is safe to call from a transport's I/O thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::protocol::{Framer, PacketDecoder};
use crate::types::{ChannelSnapshot, DriverStatus};

#[derive(Debug, Default)]
struct IngestState {
    framer: Framer,
    decoder: PacketDecoder,
    sample_index: u64,
}

impl IngestState {
    fn reset(&mut self) {
        self.framer.reset();
        self.decoder.reset();
        self.sample_index = 0;
    }
}

/// Ingestion state shared between the transport and the connection.
#[derive(Debug)]
pub struct DriverSession {
    state: Mutex<IngestState>,
    snapshots: mpsc::Sender<ChannelSnapshot>,
    lost_packets: watch::Sender<u32>,
    status: watch::Sender<DriverStatus>,
    dropped: AtomicU64,
}

impl DriverSession {
    /// Create a session and the receiving end of its snapshot handoff.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ChannelSnapshot>) {
        let (snapshots, receiver) = mpsc::channel(capacity.max(1));
        let (lost_packets, _) = watch::channel(0);
        let (status, _) = watch::channel(DriverStatus::Ready);

        let session = Self {
            state: Mutex::new(IngestState::default()),
            snapshots,
            lost_packets,
            status,
            dropped: AtomicU64::new(0),
        };
        (session, receiver)
    }

    fn lock(&self) -> MutexGuard<'_, IngestState> {
        // state stays consistent even if a holder panicked mid-feed
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push raw transport bytes; returns the number of frames decoded.
    pub fn feed(&self, bytes: &[u8]) -> usize {
        let mut guard = self.lock();
        let IngestState { framer, decoder, sample_index } = &mut *guard;

        framer.feed(bytes, |buffer, offset| {
            let (snapshot, lost) = decoder.decode(buffer, offset, *sample_index);
            *sample_index += 1;

            if let Some(total) = lost {
                self.lost_packets.send_replace(total);
            }
            self.hand_off(snapshot);
        })
    }

    fn hand_off(&self, snapshot: ChannelSnapshot) {
        match self.snapshots.try_send(snapshot) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    warn!("Pipeline not keeping up, {} snapshots dropped", dropped);
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("Pipeline stopped, discarding snapshot");
            }
        }
    }

    /// Start a fresh session on a newly opened transport.
    pub fn connect(&self) {
        self.reset();
        info!("PMD session connected");
        self.set_status(DriverStatus::Connected);
    }

    /// Clear all state after the transport was closed.
    pub fn disconnect(&self) {
        self.reset();
        info!("PMD session disconnected");
        self.set_status(DriverStatus::Ready);
    }

    /// Reset buffer, sequence counter, sample index and loss counter.
    pub fn reset(&self) {
        self.lock().reset();
        self.lost_packets.send_replace(0);
        self.dropped.store(0, Ordering::Relaxed);
        debug!("Session state reset");
    }

    pub fn set_status(&self, status: DriverStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            debug!("Driver status {} -> {}", previous, status);
        }
    }

    pub fn status(&self) -> DriverStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<DriverStatus> {
        self.status.subscribe()
    }

    /// Cumulative lost packets since connect
    pub fn lost_packets(&self) -> u32 {
        *self.lost_packets.borrow()
    }

    pub fn subscribe_lost_packets(&self) -> watch::Receiver<u32> {
        self.lost_packets.subscribe()
    }

    /// Snapshots discarded because the pipeline channel was full
    pub fn dropped_snapshots(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Frames decoded since connect
    pub fn sample_index(&self) -> u64 {
        self.lock().sample_index
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn buffered_bytes(&self) -> usize {
        self.lock().framer.buffered()
    }
}
