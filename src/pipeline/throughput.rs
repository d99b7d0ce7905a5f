//! Stream rate measurement

use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// Extension trait to measure the item rate of any Stream
pub trait ThroughputExt: Stream {
    /// Count items over fixed windows and yield items per second.
    ///
    /// One value is produced at the end of each window. The first window
    /// starts on the first poll. Ends when the inner stream ends.
    fn throughput(self, window: Duration) -> Throughput<Self>
    where
        Self: Sized,
    {
        Throughput::new(self, window)
    }
}

impl<T: Stream> ThroughputExt for T {}

pin_project! {
    /// A stream combinator that reports the rate of its inner stream
    pub struct Throughput<S> {
        #[pin]
        stream: S,
        window: Duration,
        interval: Option<Interval>,
        count: u64,
    }
}

impl<S: Stream> Throughput<S> {
    pub fn new(stream: S, window: Duration) -> Self {
        Self { stream, window: window.max(Duration::from_millis(1)), interval: None, count: 0 }
    }
}

impl<S: Stream> Stream for Throughput<S> {
    type Item = f64;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        let window = *this.window;

        let interval = this.interval.get_or_insert_with(|| {
            let mut interval = interval_at(Instant::now() + window, window);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        // Count everything that is ready
        loop {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(_)) => *this.count += 1,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => break,
            }
        }

        match interval.poll_tick(cx) {
            Poll::Ready(_) => {
                let rate = *this.count as f64 / window.as_secs_f64();
                *this.count = 0;
                Poll::Ready(Some(rate))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    #[tokio::test(start_paused = true)]
    async fn reports_items_per_second() {
        let (tx, rx) = mpsc::channel(64);
        let mut rates = ReceiverStream::new(rx).throughput(Duration::from_secs(2));

        let producer = tokio::spawn(async move {
            // offset by half a period so no send lands on a window edge
            tokio::time::sleep(Duration::from_millis(50)).await;
            for _ in 0..40 {
                tx.send(()).await.expect("send");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            // keep the stream open past the second window
            tokio::time::sleep(Duration::from_secs(3)).await;
        });

        assert_eq!(rates.next().await, Some(10.0));
        assert_eq!(rates.next().await, Some(10.0));
        assert_eq!(rates.next().await, Some(0.0));
        producer.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn ends_with_inner_stream() {
        let mut rates = futures::stream::iter(0..5).throughput(Duration::from_secs(1));
        assert_eq!(rates.next().await, None);
    }
}
