// src/process/mod.rs
pub mod extract;
pub mod lap_time;
pub mod raw_table;

pub use extract::{extract, normalize, parse_table, LapRecord, TimingSnapshot};
pub use lap_time::parse_lap_time;
pub use raw_table::RawTable;

use tracing::{error, info};

use crate::error::{FetchError, ScrapeError};
use crate::fetch::Fetcher;

/// Result of one poll. The three cases stay distinct so the caller can keep
/// showing the last good board on failure instead of an empty one.
#[derive(Debug)]
pub enum PollOutcome {
    FetchFailed(FetchError),
    ParseFailed(ScrapeError),
    /// Possibly empty.
    Data(TimingSnapshot),
}

impl PollOutcome {
    pub fn snapshot(&self) -> Option<&TimingSnapshot> {
        match self {
            PollOutcome::Data(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_snapshot(self) -> Option<TimingSnapshot> {
        match self {
            PollOutcome::Data(s) => Some(s),
            _ => None,
        }
    }
}

/// Classify an already-fetched page.
pub fn outcome_from_html(html: &str) -> PollOutcome {
    match extract(html) {
        Ok(snap) => PollOutcome::Data(snap),
        Err(ScrapeError::Fetch(e)) => PollOutcome::FetchFailed(e),
        Err(e) => {
            error!(error = %e, "timing page could not be parsed");
            PollOutcome::ParseFailed(e)
        }
    }
}

/// One fetch-and-parse cycle. Never retries.
#[tracing::instrument(level = "info", skip(fetcher), fields(url = %fetcher.url()))]
pub async fn scrape(fetcher: &Fetcher) -> PollOutcome {
    let html = match fetcher.fetch().await {
        Ok(html) => html,
        Err(e) => return PollOutcome::FetchFailed(e),
    };

    let outcome = outcome_from_html(&html);
    if let Some(snap) = outcome.snapshot() {
        info!(
            cars = snap.car_numbers.len(),
            skipped = snap.rows_skipped,
            "processed lap times and positions"
        );
    }
    outcome
}
