//! SQLite schema for races and live-timing records
//!
//! Tables:
//! - races: one row per event
//! - drivers: drivers registered for a race with their car number
//! - lap_times: one row per completed lap per car
//! - positions: position samples, one per car per poll
//! - driver_changes: driver swaps during a race

use rusqlite::{Connection, Result};

/// Create all tables. Safe to call on an existing database.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS races (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            date TEXT NOT NULL,
            archived INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS drivers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            car_number INTEGER NOT NULL,
            race_id INTEGER NOT NULL REFERENCES races(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS lap_times (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            race_id INTEGER NOT NULL REFERENCES races(id) ON DELETE CASCADE,
            car_number INTEGER NOT NULL,
            lap INTEGER NOT NULL,
            time REAL NOT NULL,
            driver_id INTEGER REFERENCES drivers(id) ON DELETE SET NULL,
            UNIQUE(race_id, car_number, lap)
        );

        CREATE TABLE IF NOT EXISTS positions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            race_id INTEGER NOT NULL REFERENCES races(id) ON DELETE CASCADE,
            car_number INTEGER NOT NULL,
            position INTEGER NOT NULL,
            timestamp TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS driver_changes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            race_id INTEGER NOT NULL REFERENCES races(id) ON DELETE CASCADE,
            car_number INTEGER NOT NULL,
            driver_id INTEGER NOT NULL REFERENCES drivers(id) ON DELETE CASCADE,
            timestamp TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_lap_times_race ON lap_times(race_id, car_number);
        CREATE INDEX IF NOT EXISTS idx_positions_race ON positions(race_id, car_number);
        CREATE INDEX IF NOT EXISTS idx_drivers_race ON drivers(race_id);
        CREATE INDEX IF NOT EXISTS idx_driver_changes_race ON driver_changes(race_id, car_number);
        "#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN
                 ('races', 'drivers', 'lap_times', 'positions', 'driver_changes')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn test_create_tables_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
    }
}
