//! Pull-based fallback: a periodic table fetch that runs while the realtime
//! channel is down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::manager::Signal;
use crate::protocol::TableSummary;

/// Fetches the lobby's table list without the realtime channel.
///
/// Polling carries tables only; player presence needs the realtime channel.
#[async_trait]
pub trait TableFetcher: Send + Sync + 'static {
    /// Fetch the current table list.
    ///
    /// # Errors
    ///
    /// Any error is logged by the manager and the previous snapshot is kept;
    /// the next scheduled poll runs regardless.
    async fn fetch_tables(&self) -> Result<Vec<TableSummary>>;
}

/// Handle to a running poll timer. Dropping it cancels the timer.
#[derive(Debug)]
pub(crate) struct PollHandle {
    generation: u64,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Start polling: one fetch right away, then one every `period`.
    pub(crate) fn spawn(
        fetcher: Arc<dyn TableFetcher>,
        period: Duration,
        generation: u64,
        signal_tx: mpsc::UnboundedSender<Signal>,
    ) -> Self {
        let task = tokio::spawn(poll_loop(fetcher, period, generation, signal_tx));
        Self { generation, task }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancel the timer and wait until its task is gone, so no fetch starts
    /// after this returns.
    pub(crate) async fn shutdown(mut self) {
        self.task.abort();
        if let Err(join_err) = (&mut self.task).await {
            if !join_err.is_cancelled() {
                warn!(generation = self.generation, "poll task failed: {join_err}");
            }
        }
        debug!(generation = self.generation, "poll timer stopped");
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_loop(
    fetcher: Arc<dyn TableFetcher>,
    period: Duration,
    generation: u64,
    signal_tx: mpsc::UnboundedSender<Signal>,
) {
    // The first tick completes immediately.
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        trace!(generation, "polling lobby tables");
        let result = fetcher.fetch_tables().await;
        if signal_tx.send(Signal::Poll { generation, result }).is_err() {
            break;
        }
    }
}
