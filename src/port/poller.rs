//! Periodic statistics collection

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::{InPort, OutPort};
use crate::stats::PortStatistics;

/// Anything that can report port statistics on demand.
pub trait StatisticsSource: Send + Sync + 'static {
    fn source_name(&self) -> &str;

    /// Current records; an output port yields one per connection.
    fn collect(&self) -> Vec<PortStatistics>;
}

impl<T> StatisticsSource for OutPort<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn source_name(&self) -> &str {
        self.name()
    }

    fn collect(&self) -> Vec<PortStatistics> {
        self.collect_statistics()
    }
}

impl<T> StatisticsSource for InPort<T>
where
    T: Send + 'static,
{
    fn source_name(&self) -> &str {
        self.name()
    }

    fn collect(&self) -> Vec<PortStatistics> {
        vec![self.statistics()]
    }
}

/// Result of spawning a statistics poller
pub struct PollerChannels {
    /// Latest snapshot across all sources
    pub statistics: watch::Receiver<Arc<Vec<PortStatistics>>>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
}

impl PollerChannels {
    /// Snapshots as a stream, starting with the current one.
    pub fn updates(&self) -> WatchStream<Arc<Vec<PortStatistics>>> {
        WatchStream::new(self.statistics.clone())
    }
}

/// Samples every registered source on a fixed interval
pub struct StatisticsPoller;

impl StatisticsPoller {
    /// Spawn the polling task.
    ///
    /// The first snapshot is taken immediately. The task stops when cancelled
    /// or when every receiver has been dropped.
    pub fn spawn(sources: Vec<Arc<dyn StatisticsSource>>, period: Duration) -> PollerChannels {
        let (stats_tx, stats_rx) = watch::channel(Arc::new(Vec::new()));
        let cancel = CancellationToken::new();
        let cancel_task = cancel.clone();

        tokio::spawn(async move {
            Self::poll_task(sources, period, stats_tx, cancel_task).await;
        });

        PollerChannels { statistics: stats_rx, cancel }
    }

    async fn poll_task(
        sources: Vec<Arc<dyn StatisticsSource>>,
        period: Duration,
        stats_tx: watch::Sender<Arc<Vec<PortStatistics>>>,
        cancel: CancellationToken,
    ) {
        info!(sources = sources.len(), period_ms = period.as_millis() as u64, "Statistics poller started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut polls = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Statistics poller cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let snapshot: Vec<PortStatistics> = sources.iter().flat_map(|source| source.collect()).collect();
            polls += 1;
            trace!(poll = polls, records = snapshot.len(), "Statistics collected");

            if stats_tx.send(Arc::new(snapshot)).is_err() {
                debug!("Statistics receiver dropped, shutting down");
                break;
            }
        }

        info!("Statistics poller ended after {} polls", polls);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn polls_until_cancelled() {
        let input = Arc::new(InPort::<i16>::new("in"));
        let output = Arc::new(OutPort::<i16>::new("out"));
        output.connect("loop", input.clone()).await.unwrap();

        let sources: Vec<Arc<dyn StatisticsSource>> = vec![output.clone(), input.clone()];
        assert_eq!(sources[0].source_name(), "out");

        let channels = StatisticsPoller::spawn(sources, Duration::from_millis(100));
        let mut updates = channels.updates();

        // Initial empty value, then the first poll
        let _ = updates.next().await;
        let first = updates.next().await.unwrap();
        let names: Vec<_> = first.iter().map(|record| record.port_name.as_str()).collect();
        assert_eq!(names, ["out", "in"]);

        channels.cancel.cancel();
        // At most one tick can race the cancellation
        let remaining: Vec<_> = updates.collect().await;
        assert!(remaining.len() <= 1);
    }
}
