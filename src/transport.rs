//! Transport trait for PMD byte sources

use crate::Result;

/// A byte pipe to the device.
///
/// The session never interprets baud rate, parity or handshake state; a
/// transport only moves bytes and reports failures. Implementations wrap a
/// serial port, a capture file or an in-process channel.
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    /// Wait for the next chunk of received bytes
    ///
    /// Returns:
    /// - `Ok(Some(bytes))` - Bytes available (any length, any alignment)
    /// - `Ok(None)` - Link closed (normal termination)
    /// - `Err(e)` - Read failure; surfaced as [`DriverStatus::Error`](crate::DriverStatus::Error)
    async fn read(&mut self) -> Result<Option<Vec<u8>>>;

    /// Send a command to the device
    async fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Release the underlying link. Called once when the reader stops.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Human readable name for logs (port name, file path)
    fn name(&self) -> &str;
}
