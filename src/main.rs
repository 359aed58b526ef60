use anyhow::{Context, Result};
use laptime_tracker::{
    config::Config,
    fetch::Fetcher,
    leaderboard::Leaderboard,
    logging,
    poll::{PollStatus, PollUpdate, Poller},
    store::Store,
};
use std::sync::Arc;
use tokio_stream::{wrappers::WatchStream, StreamExt};
use tracing::{error, info, warn};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

fn status_line(update: &PollUpdate) -> String {
    let when = update.at.format("%H:%M:%S");
    match &update.status {
        PollStatus::Updated { cars } => format!("poll #{} at {}: {} cars", update.sequence, when, cars),
        PollStatus::FetchFailed(e) => {
            format!("poll #{} at {}: no new data, fetch failed: {}", update.sequence, when, e)
        }
        PollStatus::ParseFailed(e) => {
            format!("poll #{} at {}: no new data, page unreadable: {}", update.sequence, when, e)
        }
        PollStatus::StoreFailed(e) => {
            format!("poll #{} at {}: data not saved: {}", update.sequence, when, e)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    logging::init(logging::DEFAULT_FILTER);
    info!("startup");

    // ─── 2) config + storage ─────────────────────────────────────────
    let config = Config::load()?;
    let store = Arc::new(Store::open(&config.database_path)?);

    // ─── 3) pick the race to record ──────────────────────────────────
    let race = match config.race_id {
        Some(id) => Some(
            store
                .race(id)?
                .with_context(|| format!("race {} does not exist", id))?,
        ),
        None => store.races()?.into_iter().next(),
    };
    match &race {
        Some(r) => info!(race_id = r.id, name = %r.name, date = %r.date, "recording race"),
        None => warn!("no active race; polling without recording"),
    }
    let race_id = race.as_ref().map(|r| r.id);

    // ─── 4) start the poller ─────────────────────────────────────────
    let fetcher = Fetcher::new(&config)?;
    let handle = Poller::new(fetcher, Arc::clone(&store), race_id, config.poll_interval()).spawn();
    let mut updates = WatchStream::new(handle.updates.clone());

    // ─── 5) redraw whenever a new poll lands ─────────────────────────
    let title = race
        .as_ref()
        .map(|r| format!("{} ({})", r.name, r.date))
        .unwrap_or_else(|| "live timing (not recording)".to_string());
    let mut board = String::from("waiting for first poll...\n");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let update = tokio::select! {
            _ = &mut ctrl_c => {
                info!("ctrl-c received");
                break;
            }
            next = updates.next() => match next {
                Some(Some(u)) => u,
                Some(None) => continue,
                None => break,
            },
        };

        if update.is_ok() {
            board = match (race_id, update.snapshot.as_ref()) {
                (Some(id), _) => {
                    let store = Arc::clone(&store);
                    match tokio::task::spawn_blocking(move || Leaderboard::load(&store, id)).await? {
                        Ok(b) => b.render(),
                        Err(e) => {
                            error!(error = %e, "loading leaderboard failed");
                            board
                        }
                    }
                }
                (None, Some(snap)) => format!("cars on track: {:?}\n", snap.car_numbers),
                (None, None) => board,
            };
        }

        println!("{}{}\n\n{}\n{}", CLEAR_SCREEN, title, board, status_line(&update));
    }

    handle.shutdown().await;
    info!("all done");
    Ok(())
}
