//! SQLite storage for races, drivers and recorded timing data

pub mod repository;
pub mod schema;

pub use repository::{Driver, DriverChange, LapTime, PositionSample, Race, Store};
pub use schema::create_tables;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::process::TimingSnapshot;

/// Where the poller hands successful snapshots. Called on the blocking pool.
pub trait TimingSink: Send + Sync + 'static {
    fn record(&self, race_id: i64, snap: &TimingSnapshot, at: DateTime<Utc>) -> Result<()>;
}

impl TimingSink for Store {
    fn record(&self, race_id: i64, snap: &TimingSnapshot, at: DateTime<Utc>) -> Result<()> {
        self.record_snapshot(race_id, snap, at).map(|_| ())
    }
}
