// src/leaderboard.rs

use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use crate::store::{Driver, DriverChange, LapTime, PositionSample, Store};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Standing {
    pub position: u32,
    pub car_number: u32,
    pub driver: Option<String>,
    pub total_laps: usize,
    pub avg_lap_time: f64,
    pub last_lap_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Leaderboard {
    pub standings: Vec<Standing>,
}

/// Name of whoever drives each car: the latest change, else the first
/// driver registered with that number.
pub fn current_driver_names(drivers: &[Driver], changes: &[DriverChange]) -> HashMap<u32, String> {
    let by_id: HashMap<i64, &Driver> = drivers.iter().map(|d| (d.id, d)).collect();
    let mut names = HashMap::new();

    let mut registered: Vec<&Driver> = drivers.iter().collect();
    registered.sort_by_key(|d| std::cmp::Reverse(d.id));
    for d in registered {
        names.insert(d.car_number, d.name.clone());
    }

    // changes come oldest first, so the last one written wins
    for c in changes {
        if let Some(d) = by_id.get(&c.driver_id) {
            names.insert(c.car_number, d.name.clone());
        }
    }
    names
}

impl Leaderboard {
    /// Cars need at least one lap row and one position sample to appear.
    /// `laps` and `positions` must be in recording order.
    pub fn build(
        laps: &[LapTime],
        positions: &[PositionSample],
        names: &HashMap<u32, String>,
    ) -> Self {
        let mut by_car: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        for lap in laps {
            by_car.entry(lap.car_number).or_default().push(lap.time);
        }

        let mut latest: HashMap<u32, u32> = HashMap::new();
        for p in positions {
            latest.insert(p.car_number, p.position);
        }

        let mut standings: Vec<Standing> = by_car
            .into_iter()
            .filter_map(|(car, times)| {
                let position = *latest.get(&car)?;
                let last = *times.last()?;
                let total: f64 = times.iter().sum();
                Some(Standing {
                    position,
                    car_number: car,
                    driver: names.get(&car).cloned(),
                    total_laps: times.len(),
                    avg_lap_time: total / times.len() as f64,
                    last_lap_time: last,
                })
            })
            .collect();

        standings.sort_by_key(|s| (s.position, s.car_number));
        Self { standings }
    }

    pub fn load(store: &Store, race_id: i64) -> Result<Self> {
        let laps = store.lap_times(race_id)?;
        let positions = store.positions(race_id)?;
        let names = current_driver_names(&store.drivers(race_id)?, &store.driver_changes(race_id)?);
        Ok(Self::build(&laps, &positions, &names))
    }

    pub fn is_empty(&self) -> bool {
        self.standings.is_empty()
    }

    /// Fixed-width text table.
    pub fn render(&self) -> String {
        if self.standings.is_empty() {
            return "no timing data yet\n".to_string();
        }

        let name_width = self
            .standings
            .iter()
            .filter_map(|s| s.driver.as_deref())
            .map(|n| n.chars().count())
            .max()
            .unwrap_or(0)
            .max("Driver".len());

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>3}  {:>4}  {:<w$}  {:>4}  {:>8}  {:>8}",
            "Pos",
            "Car",
            "Driver",
            "Laps",
            "Avg",
            "Last",
            w = name_width
        );
        for s in &self.standings {
            let _ = writeln!(
                out,
                "{:>3}  {:>4}  {:<w$}  {:>4}  {:>8.2}  {:>8.2}",
                s.position,
                s.car_number,
                s.driver.as_deref().unwrap_or("-"),
                s.total_laps,
                s.avg_lap_time,
                s.last_lap_time,
                w = name_width
            );
        }
        out
    }
}
