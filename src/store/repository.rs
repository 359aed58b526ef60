//! SQLite repository for races, drivers and live-timing records
//!
//! `Store` holds only the database path. Each operation opens its own
//! connection, runs in one transaction and commits before returning; on
//! error the transaction rolls back when dropped.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::schema::create_tables;
use crate::process::{LapRecord, TimingSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Race {
    pub id: i64,
    pub name: String,
    pub date: NaiveDate,
    pub archived: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Driver {
    pub id: i64,
    pub name: String,
    pub car_number: u32,
    pub race_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LapTime {
    pub id: i64,
    pub race_id: i64,
    pub car_number: u32,
    pub lap: u32,
    pub time: f64,
    pub driver_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionSample {
    pub id: i64,
    pub race_id: i64,
    pub car_number: u32,
    pub position: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverChange {
    pub id: i64,
    pub race_id: i64,
    pub car_number: u32,
    pub driver_id: i64,
    pub timestamp: DateTime<Utc>,
}

fn race_from_row(row: &Row<'_>) -> rusqlite::Result<Race> {
    Ok(Race {
        id: row.get(0)?,
        name: row.get(1)?,
        date: row.get(2)?,
        archived: row.get(3)?,
    })
}

fn driver_from_row(row: &Row<'_>) -> rusqlite::Result<Driver> {
    Ok(Driver {
        id: row.get(0)?,
        name: row.get(1)?,
        car_number: row.get(2)?,
        race_id: row.get(3)?,
    })
}

/// Handle to the tracker database.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open (creating if needed) the database at `path` and make sure the
    /// schema exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {:?}", parent))?;
        }
        let store = Self { path };
        store.with_tx(|tx| Ok(create_tables(tx)?))?;
        info!(path = %store.path.display(), "database initialized");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)
            .with_context(|| format!("opening database {:?}", self.path))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Run `f` inside a fresh connection and transaction.
    fn with_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.connect()?;
        let tx = conn.transaction().context("starting transaction")?;
        let out = f(&tx)?;
        tx.commit().context("committing transaction")?;
        Ok(out)
    }

    // ==================== Races ====================

    pub fn create_race(&self, name: &str, date: NaiveDate) -> Result<i64> {
        let id = self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO races (name, date, archived) VALUES (?1, ?2, 0)",
                params![name, date],
            )?;
            Ok(tx.last_insert_rowid())
        })?;
        info!(race_id = id, name, %date, "created race");
        Ok(id)
    }

    pub fn race(&self, race_id: i64) -> Result<Option<Race>> {
        self.with_tx(|tx| {
            Ok(tx
                .query_row(
                    "SELECT id, name, date, archived FROM races WHERE id = ?1",
                    [race_id],
                    race_from_row,
                )
                .optional()?)
        })
    }

    fn races_where(&self, archived: bool) -> Result<Vec<Race>> {
        self.with_tx(|tx| {
            let mut stmt = tx.prepare(
                "SELECT id, name, date, archived FROM races
                 WHERE archived = ?1 ORDER BY date DESC, id DESC",
            )?;
            let races = stmt
                .query_map([archived], race_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(races)
        })
    }

    /// Active races, newest date first.
    pub fn races(&self) -> Result<Vec<Race>> {
        self.races_where(false)
    }

    pub fn archived_races(&self) -> Result<Vec<Race>> {
        self.races_where(true)
    }

    /// Returns false if no such race.
    pub fn archive_race(&self, race_id: i64) -> Result<bool> {
        let n = self.with_tx(|tx| {
            Ok(tx.execute("UPDATE races SET archived = 1 WHERE id = ?1", [race_id])?)
        })?;
        Ok(n > 0)
    }

    /// Delete a race with all its drivers and records.
    pub fn remove_race(&self, race_id: i64) -> Result<bool> {
        let n = self.with_tx(|tx| Ok(tx.execute("DELETE FROM races WHERE id = ?1", [race_id])?))?;
        if n > 0 {
            info!(race_id, "removed race");
        }
        Ok(n > 0)
    }

    // ==================== Drivers ====================

    pub fn create_driver(&self, race_id: i64, name: &str, car_number: u32) -> Result<i64> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO drivers (name, car_number, race_id) VALUES (?1, ?2, ?3)",
                params![name, car_number, race_id],
            )
            .with_context(|| format!("adding driver {:?} to race {}", name, race_id))?;
            Ok(tx.last_insert_rowid())
        })
    }

    pub fn drivers(&self, race_id: i64) -> Result<Vec<Driver>> {
        self.with_tx(|tx| {
            let mut stmt = tx.prepare(
                "SELECT id, name, car_number, race_id FROM drivers
                 WHERE race_id = ?1 ORDER BY car_number, id",
            )?;
            let drivers = stmt
                .query_map([race_id], driver_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(drivers)
        })
    }

    pub fn update_driver(&self, driver_id: i64, name: &str, car_number: u32) -> Result<bool> {
        let n = self.with_tx(|tx| {
            Ok(tx.execute(
                "UPDATE drivers SET name = ?1, car_number = ?2 WHERE id = ?3",
                params![name, car_number, driver_id],
            )?)
        })?;
        Ok(n > 0)
    }

    // ==================== Driver changes ====================

    pub fn create_driver_change(
        &self,
        race_id: i64,
        car_number: u32,
        driver_id: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO driver_changes (race_id, car_number, driver_id, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![race_id, car_number, driver_id, timestamp],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    /// All changes for a race, oldest first.
    pub fn driver_changes(&self, race_id: i64) -> Result<Vec<DriverChange>> {
        self.with_tx(|tx| {
            let mut stmt = tx.prepare(
                "SELECT id, race_id, car_number, driver_id, timestamp FROM driver_changes
                 WHERE race_id = ?1 ORDER BY timestamp, id",
            )?;
            let changes = stmt
                .query_map([race_id], |row| {
                    Ok(DriverChange {
                        id: row.get(0)?,
                        race_id: row.get(1)?,
                        car_number: row.get(2)?,
                        driver_id: row.get(3)?,
                        timestamp: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(changes)
        })
    }

    /// Who is in the car now: the latest driver change, else a driver
    /// registered with that car number.
    pub fn current_driver(&self, race_id: i64, car_number: u32) -> Result<Option<Driver>> {
        self.with_tx(|tx| current_driver_tx(tx, race_id, car_number))
    }

    // ==================== Timing records ====================

    /// Store one lap row per car. Laps already on record are left alone.
    pub fn save_lap_times(&self, race_id: i64, laps: &BTreeMap<u32, LapRecord>) -> Result<usize> {
        self.with_tx(|tx| insert_lap_times(tx, race_id, laps))
    }

    pub fn save_positions(
        &self,
        race_id: i64,
        positions: &BTreeMap<u32, u32>,
        timestamp: DateTime<Utc>,
    ) -> Result<usize> {
        self.with_tx(|tx| insert_positions(tx, race_id, positions, timestamp))
    }

    /// Store both halves of a poll atomically. Returns (laps, positions) inserted.
    pub fn record_snapshot(
        &self,
        race_id: i64,
        snap: &TimingSnapshot,
        timestamp: DateTime<Utc>,
    ) -> Result<(usize, usize)> {
        let counts = self.with_tx(|tx| {
            let laps = insert_lap_times(tx, race_id, &snap.lap_times)?;
            let positions = insert_positions(tx, race_id, &snap.positions, timestamp)?;
            Ok((laps, positions))
        })?;
        debug!(race_id, laps = counts.0, positions = counts.1, "stored snapshot");
        Ok(counts)
    }

    /// Lap rows for a race, in insertion order.
    pub fn lap_times(&self, race_id: i64) -> Result<Vec<LapTime>> {
        self.with_tx(|tx| {
            let mut stmt = tx.prepare(
                "SELECT id, race_id, car_number, lap, time, driver_id FROM lap_times
                 WHERE race_id = ?1 ORDER BY id",
            )?;
            let laps = stmt
                .query_map([race_id], |row| {
                    Ok(LapTime {
                        id: row.get(0)?,
                        race_id: row.get(1)?,
                        car_number: row.get(2)?,
                        lap: row.get(3)?,
                        time: row.get(4)?,
                        driver_id: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(laps)
        })
    }

    /// Position samples for a race, oldest first.
    pub fn positions(&self, race_id: i64) -> Result<Vec<PositionSample>> {
        self.with_tx(|tx| {
            let mut stmt = tx.prepare(
                "SELECT id, race_id, car_number, position, timestamp FROM positions
                 WHERE race_id = ?1 ORDER BY timestamp, id",
            )?;
            let rows = stmt
                .query_map([race_id], |row| {
                    Ok(PositionSample {
                        id: row.get(0)?,
                        race_id: row.get(1)?,
                        car_number: row.get(2)?,
                        position: row.get(3)?,
                        timestamp: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Every car number seen in this race, ascending.
    pub fn car_numbers(&self, race_id: i64) -> Result<Vec<u32>> {
        self.with_tx(|tx| {
            let mut stmt = tx.prepare(
                "SELECT car_number FROM lap_times WHERE race_id = ?1
                 UNION
                 SELECT car_number FROM positions WHERE race_id = ?1
                 ORDER BY 1",
            )?;
            let cars = stmt
                .query_map([race_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<u32>>>()?;
            Ok(cars)
        })
    }
}

fn current_driver_tx(tx: &Transaction<'_>, race_id: i64, car_number: u32) -> Result<Option<Driver>> {
    let changed = tx
        .query_row(
            "SELECT d.id, d.name, d.car_number, d.race_id
             FROM driver_changes c JOIN drivers d ON d.id = c.driver_id
             WHERE c.race_id = ?1 AND c.car_number = ?2
             ORDER BY c.timestamp DESC, c.id DESC LIMIT 1",
            params![race_id, car_number],
            driver_from_row,
        )
        .optional()?;
    if changed.is_some() {
        return Ok(changed);
    }
    Ok(tx
        .query_row(
            "SELECT id, name, car_number, race_id FROM drivers
             WHERE race_id = ?1 AND car_number = ?2
             ORDER BY id LIMIT 1",
            params![race_id, car_number],
            driver_from_row,
        )
        .optional()?)
}

fn insert_lap_times(
    tx: &Transaction<'_>,
    race_id: i64,
    laps: &BTreeMap<u32, LapRecord>,
) -> Result<usize> {
    let mut inserted = 0;
    for (&car, rec) in laps {
        let driver_id = current_driver_tx(tx, race_id, car)?.map(|d| d.id);
        inserted += tx
            .execute(
                "INSERT OR IGNORE INTO lap_times (race_id, car_number, lap, time, driver_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![race_id, car, rec.lap_count, rec.last_lap_seconds, driver_id],
            )
            .with_context(|| format!("saving lap {} for car {} in race {}", rec.lap_count, car, race_id))?;
    }
    Ok(inserted)
}

fn insert_positions(
    tx: &Transaction<'_>,
    race_id: i64,
    positions: &BTreeMap<u32, u32>,
    timestamp: DateTime<Utc>,
) -> Result<usize> {
    let mut stmt = tx.prepare(
        "INSERT INTO positions (race_id, car_number, position, timestamp) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (&car, &position) in positions {
        stmt.execute(params![race_id, car, position, timestamp])
            .with_context(|| format!("saving position for car {} in race {}", car, race_id))?;
    }
    Ok(positions.len())
}
