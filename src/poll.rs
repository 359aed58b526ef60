// src/poll.rs

use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{error, info, warn};

use crate::fetch::Fetcher;
use crate::process::{scrape, PollOutcome, TimingSnapshot};
use crate::store::TimingSink;

/// What happened on one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    /// Snapshot parsed (maybe empty) and stored, if a race was set.
    Updated { cars: usize },
    FetchFailed(String),
    ParseFailed(String),
    /// Parsed fine but the sink refused it.
    StoreFailed(String),
}

#[derive(Debug, Clone)]
pub struct PollUpdate {
    pub sequence: u64,
    pub at: DateTime<Utc>,
    pub status: PollStatus,
    /// Present only when this poll produced data.
    pub snapshot: Option<Arc<TimingSnapshot>>,
}

impl PollUpdate {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, PollStatus::Updated { .. })
    }
}

/// Periodic fetch → parse → store, decoupled from whoever renders.
pub struct Poller<S: TimingSink> {
    fetcher: Fetcher,
    sink: Arc<S>,
    race_id: Option<i64>,
    interval: Duration,
}

/// Running poller. Drop `updates` or call [`PollHandle::shutdown`] to stop it.
pub struct PollHandle {
    pub updates: watch::Receiver<Option<PollUpdate>>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "poll task ended abnormally");
        }
    }
}

impl<S: TimingSink> Poller<S> {
    pub fn new(fetcher: Fetcher, sink: Arc<S>, race_id: Option<i64>, interval: Duration) -> Self {
        Self {
            fetcher,
            sink,
            race_id,
            interval,
        }
    }

    /// One full cycle. Storage runs on the blocking pool.
    pub async fn poll_once(&self, sequence: u64) -> PollUpdate {
        let at = Utc::now();
        let outcome = scrape(&self.fetcher).await;

        let snap = match outcome {
            PollOutcome::Data(snap) => Arc::new(snap),
            PollOutcome::FetchFailed(e) => {
                warn!(sequence, error = %e, "poll produced no data: fetch failed");
                return PollUpdate {
                    sequence,
                    at,
                    status: PollStatus::FetchFailed(e.to_string()),
                    snapshot: None,
                };
            }
            PollOutcome::ParseFailed(e) => {
                warn!(sequence, error = %e, "poll produced no data: parse failed");
                return PollUpdate {
                    sequence,
                    at,
                    status: PollStatus::ParseFailed(e.to_string()),
                    snapshot: None,
                };
            }
        };

        let mut status = PollStatus::Updated {
            cars: snap.car_numbers.len(),
        };
        if let Some(race_id) = self.race_id {
            let sink = Arc::clone(&self.sink);
            let to_store = Arc::clone(&snap);
            let stored = tokio::task::spawn_blocking(move || sink.record(race_id, &to_store, at))
                .await
                .map_err(anyhow::Error::from)
                .and_then(|r| r);
            if let Err(e) = stored {
                error!(sequence, race_id, error = %e, "storing snapshot failed");
                status = PollStatus::StoreFailed(format!("{:#}", e));
            }
        }

        PollUpdate {
            sequence,
            at,
            status,
            snapshot: Some(snap),
        }
    }

    /// Start polling on the current runtime. The first poll runs immediately.
    pub fn spawn(self) -> PollHandle {
        let (tx, rx) = watch::channel(None);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut sequence = 0u64;
            info!(url = %self.fetcher.url(), race_id = ?self.race_id, every = ?self.interval, "poller started");

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }

                sequence += 1;
                let update = tokio::select! {
                    _ = stop_rx.changed() => break,
                    u = self.poll_once(sequence) => u,
                };

                if tx.send(Some(update)).is_err() {
                    // nobody is listening any more
                    break;
                }
            }
            info!(polls = sequence, "poller stopped");
        });

        PollHandle {
            updates: rx,
            shutdown: stop_tx,
            task,
        }
    }
}
