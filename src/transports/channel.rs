//! In-process transport fed through a channel handle.
//!
//! Bridges callback-driven serial libraries: the library's data-received
//! callback calls [`ChannelTransportHandle::try_send_bytes`] and the driver
//! reads from the other end. Also used to script device behaviour in tests.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::trace;

use crate::transport::Transport;
use crate::{PmdError, Result};

#[derive(Debug)]
enum TransportEvent {
    Data(Vec<u8>),
    Error(String),
}

/// Receiving side, handed to the driver.
#[derive(Debug)]
pub struct ChannelTransport {
    name: String,
    events: mpsc::Receiver<TransportEvent>,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
}

/// Sending side, kept by the producer. Dropping every handle closes the link.
#[derive(Debug, Clone)]
pub struct ChannelTransportHandle {
    events: mpsc::Sender<TransportEvent>,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ChannelTransport {
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, ChannelTransportHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let written = Arc::new(Mutex::new(Vec::new()));
        let transport = Self { name: name.into(), events: rx, written: Arc::clone(&written) };
        (transport, ChannelTransportHandle { events: tx, written })
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        match self.events.recv().await {
            Some(TransportEvent::Data(bytes)) => Ok(Some(bytes)),
            Some(TransportEvent::Error(reason)) => Err(PmdError::transport_failed(reason)),
            None => Ok(None),
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        trace!("{}: write {:02X?}", self.name, bytes);
        self.written.lock().unwrap_or_else(PoisonError::into_inner).push(bytes.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.events.close();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl ChannelTransportHandle {
    /// Deliver bytes, waiting for room in the channel.
    pub async fn send_bytes(&self, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.events
            .send(TransportEvent::Data(bytes.into()))
            .await
            .map_err(|_| PmdError::channel_closed("transport"))
    }

    /// Deliver bytes without waiting, for use inside I/O callbacks.
    pub fn try_send_bytes(&self, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.events
            .try_send(TransportEvent::Data(bytes.into()))
            .map_err(|_| PmdError::channel_closed("transport"))
    }

    /// Report a read failure to the driver.
    pub async fn fail(&self, reason: impl Into<String>) -> Result<()> {
        self.events
            .send(TransportEvent::Error(reason.into()))
            .await
            .map_err(|_| PmdError::channel_closed("transport"))
    }

    /// Commands written to the device so far
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
