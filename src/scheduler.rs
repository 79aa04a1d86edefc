//! The collection loop: a fixed-interval scheduler that fans due feeds
//! out to concurrent ingestion tasks.
//!
//! Each cycle selects at most `concurrency` due feeds, spawns one task
//! per feed, and waits for all of them before the next cycle can run.
//! A cycle never kills the loop: selection failures skip the cycle and
//! per-feed failures are logged and left for a later rotation.

use crate::feed::Fetcher;
use crate::storage::Database;
use futures::future::join_all;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct Scheduler {
    db: Database,
    fetcher: Fetcher,
    concurrency: u32,
    interval: Duration,
}

/// Handle to a running collection loop.
pub struct SchedulerHandle {
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for it to finish its current cycle.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(()).await;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "collection loop did not shut down cleanly");
        }
    }
}

impl Scheduler {
    pub fn new(db: Database, fetcher: Fetcher, concurrency: u32, interval: Duration) -> Self {
        Self {
            db,
            fetcher,
            concurrency,
            interval,
        }
    }

    /// Start the loop on the runtime. The first cycle runs immediately;
    /// later cycles fire on the interval.
    pub fn spawn(self) -> SchedulerHandle {
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(self.run(rx));

        SchedulerHandle {
            shutdown: tx,
            task,
        }
    }

    async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            concurrency = self.concurrency,
            "collection loop started"
        );

        let mut timer = tokio::time::interval(self.interval);
        // A cycle longer than the interval should not cause a burst of
        // back-to-back cycles afterwards
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = timer.tick() => self.tick().await,
                _ = shutdown.recv() => {
                    tracing::info!("collection loop stopping");
                    break;
                }
            }
        }
    }

    /// Run one collection cycle: select due feeds, ingest them
    /// concurrently, and wait for every task to finish.
    ///
    /// If selection itself fails the whole cycle is skipped; the next
    /// tick retries with a fresh query.
    pub async fn tick(&self) {
        let feeds = match self.db.select_due_feeds(self.concurrency).await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::error!(error = %e, "failed to select due feeds, skipping cycle");
                return;
            }
        };

        if feeds.is_empty() {
            tracing::debug!("no feeds due");
            return;
        }

        tracing::debug!(count = feeds.len(), "collecting due feeds");

        let tasks: Vec<_> = feeds
            .into_iter()
            .map(|feed| {
                let fetcher = self.fetcher.clone();
                let name = feed.name.clone();
                let url = feed.url.clone();

                tokio::spawn(async move {
                    if let Err(e) = fetcher.ingest(feed).await {
                        tracing::error!(
                            feed = %name,
                            url = %url,
                            error = %e,
                            "feed collection failed"
                        );
                    }
                })
            })
            .collect();

        for result in join_all(tasks).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "collection task panicked");
            }
        }
    }
}
