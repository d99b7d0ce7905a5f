//! Driver spawns and manages the transport reader task

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::protocol::PmdCommand;
use crate::session::DriverSession;
use crate::transport::Transport;
use crate::types::DriverStatus;

/// Settle time the device needs after each configuration command
const COMMAND_SETTLE: Duration = Duration::from_millis(100);

/// Consecutive read failures before the reader gives up
const MAX_ERRORS: u32 = 10;

/// Handle to a running reader task
pub struct DriverHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DriverHandle {
    /// Cancel the reader and wait until the transport is closed.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Transport reader task failed: {}", e);
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Driver spawns the task that owns the transport
///
/// The reader task is the only owner of the [`Transport`]. Every chunk it
/// reads goes straight into [`DriverSession::feed`]; downsampling happens on
/// the pipeline task so reads are never held up by consumers.
pub struct Driver;

impl Driver {
    /// Spawn the reader task for `transport`.
    ///
    /// Unless `calibration_mode` is set, the device is first told to accept
    /// its stored calibration and switch to stream mode.
    pub fn spawn<T>(
        transport: T,
        session: Arc<DriverSession>,
        calibration_mode: bool,
        cancel: CancellationToken,
    ) -> DriverHandle
    where
        T: Transport,
    {
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            Self::reader_task(transport, session, calibration_mode, task_cancel).await;
        });

        DriverHandle { cancel, task: Some(task) }
    }

    async fn configure_device<T: Transport>(transport: &mut T) -> crate::Result<()> {
        for command in [PmdCommand::CalibrationOk, PmdCommand::StreamMode] {
            debug!("Sending {:?} to {}", command, transport.name());
            transport.write(command.as_bytes()).await?;
            tokio::time::sleep(COMMAND_SETTLE).await;
        }
        Ok(())
    }

    async fn reader_task<T: Transport>(
        mut transport: T,
        session: Arc<DriverSession>,
        calibration_mode: bool,
        cancel: CancellationToken,
    ) {
        info!("Transport reader started on {}", transport.name());

        if !calibration_mode {
            let configured = tokio::select! {
                _ = cancel.cancelled() => None,
                result = Self::configure_device(&mut transport) => Some(result),
            };
            if let Some(Err(e)) = configured {
                error!("Failed to configure PMD: {}", e);
                session.set_status(DriverStatus::Error);
            }
        }

        let mut chunk_count = 0u64;
        let mut error_count = 0u32;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Transport reader cancelled");
                    break;
                }
                result = transport.read() => result,
            };

            match result {
                Ok(Some(bytes)) => {
                    chunk_count += 1;
                    if error_count > 0 {
                        error_count = 0;
                        session.set_status(DriverStatus::Connected);
                    }
                    session.feed(&bytes);
                }
                Ok(None) => {
                    info!("Transport closed after {} reads", chunk_count);
                    break;
                }
                Err(e) => {
                    error_count += 1;
                    error!("Transport error ({}/{}): {}", error_count, MAX_ERRORS, e);
                    session.set_status(DriverStatus::Error);

                    if error_count >= MAX_ERRORS {
                        error!("Too many transport errors, stopping reader");
                        break;
                    }

                    // Exponential backoff: 100ms, 200ms, 400ms, ...
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        if let Err(e) = transport.close().await {
            warn!("Failed to close {}: {}", transport.name(), e);
        }
        info!("Transport reader ended ({} reads)", chunk_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::frame_stream;
    use crate::transports::{ChannelTransport, ReplayTransport};

    #[tokio::test(start_paused = true)]
    async fn configures_device_before_reading() {
        let (session, _rx) = DriverSession::new(8);
        let (transport, handle) = ChannelTransport::new("cmd", 4);

        let driver = Driver::spawn(transport, Arc::new(session), false, CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(250)).await;

        let written = handle.written();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0], PmdCommand::CalibrationOk.as_bytes().to_vec());
        assert_eq!(written[1], PmdCommand::StreamMode.as_bytes().to_vec());
        driver.shutdown().await;
    }

    #[tokio::test]
    async fn calibration_mode_sends_nothing() {
        let (session, _rx) = DriverSession::new(8);
        let (transport, handle) = ChannelTransport::new("cal", 4);

        let driver = Driver::spawn(transport, Arc::new(session), true, CancellationToken::new());
        handle.send_bytes(vec![0x00]).await.expect("send");
        tokio::task::yield_now().await;
        assert!(handle.written().is_empty());
        driver.shutdown().await;
    }

    #[tokio::test]
    async fn replays_until_end_of_stream() {
        let (session, mut rx) = DriverSession::new(64);
        let session = Arc::new(session);
        let transport = ReplayTransport::from_bytes(frame_stream(1, 10), 50);

        let driver = Driver::spawn(transport, Arc::clone(&session), true, CancellationToken::new());
        for expected in 0..10u64 {
            let snapshot = rx.recv().await.expect("snapshot");
            assert_eq!(snapshot.timestamp(), expected);
        }
        driver.shutdown().await;
        assert_eq!(session.sample_index(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn read_errors_surface_as_status() {
        let (session, _rx) = DriverSession::new(8);
        let session = Arc::new(session);
        session.connect();
        let mut status = session.subscribe_status();
        let (transport, handle) = ChannelTransport::new("err", 4);

        let driver = Driver::spawn(transport, Arc::clone(&session), true, CancellationToken::new());
        handle.fail("EIO").await.expect("fail");
        status.wait_for(|s| *s == DriverStatus::Error).await.expect("error status");

        handle.send_bytes(vec![0x00]).await.expect("send");
        status.wait_for(|s| *s == DriverStatus::Connected).await.expect("recovered");
        driver.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_repeated_errors() {
        let (session, _rx) = DriverSession::new(8);
        let (transport, handle) = ChannelTransport::new("dead", 16);

        let driver = Driver::spawn(transport, Arc::new(session), true, CancellationToken::new());
        for _ in 0..MAX_ERRORS {
            handle.fail("EIO").await.expect("fail");
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(driver.is_finished());
    }
}
