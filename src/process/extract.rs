// src/process/extract.rs

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

use super::lap_time::{parse_lap_time, ZERO_LAP_TIME};
use super::raw_table::RawTable;
use crate::error::{RowError, ScrapeError};

/// Car number always sits in the third cell, whatever the header says.
pub const CAR_COLUMN_INDEX: usize = 2;
pub const POSITION_COLUMN_INDEX: usize = 0;
pub const LAPS_COLUMN: &str = "Laps";
pub const LAST_COLUMN: &str = "Last";

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("table selector"));
static TH: Lazy<Selector> = Lazy::new(|| Selector::parse("th").expect("th selector"));
static TR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("tr selector"));
static TD: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("td selector"));

/// Lap data for one car in one poll.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LapRecord {
    pub lap_count: u32,
    pub last_lap_seconds: f64,
}

/// Everything one poll yields. Built fresh each time, never merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimingSnapshot {
    pub headers: Vec<String>,
    pub lap_times: BTreeMap<u32, LapRecord>,
    pub positions: BTreeMap<u32, u32>,
    /// Ascending, no duplicates.
    pub car_numbers: Vec<u32>,
    pub rows_seen: usize,
    pub rows_skipped: usize,
}

impl TimingSnapshot {
    pub fn is_empty(&self) -> bool {
        self.car_numbers.is_empty()
    }
}

/// Locate the first table in `html` and turn it into a snapshot.
pub fn extract(html: &str) -> Result<TimingSnapshot, ScrapeError> {
    let table = parse_table(html)?;
    Ok(normalize(&table))
}

fn cell_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Read the first `<table>` in document order into a [`RawTable`].
pub fn parse_table(html: &str) -> Result<RawTable, ScrapeError> {
    let doc = Html::parse_document(html);
    let table = doc.select(&TABLE).next().ok_or(ScrapeError::NoTableFound)?;

    let headers: Vec<String> = table.select(&TH).map(cell_text).collect();
    let rows: Vec<Vec<String>> = table
        .select(&TR)
        .skip(1)
        .map(|tr| tr.select(&TD).map(cell_text).collect())
        .collect();

    let raw = RawTable::new(headers, rows);
    debug!(headers = ?raw.headers, rows = raw.rows.len(), "parsed timing table");
    trace!(first_row = ?raw.rows.first(), "first data row");
    Ok(raw)
}

/// Car number of a row, if its third cell is made only of ASCII digits.
pub fn car_number(row: &[String]) -> Option<u32> {
    let cell = row.get(CAR_COLUMN_INDEX)?.trim();
    if cell.is_empty() || !cell.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    cell.parse().ok()
}

/// Where the name-located columns live in this poll's header.
#[derive(Debug, Clone, Copy)]
struct Columns {
    laps: Option<usize>,
    last: Option<usize>,
}

fn cell<'a>(row: &'a [String], index: usize, column: &'static str) -> Result<&'a str, RowError> {
    row.get(index)
        .map(|s| s.trim())
        .ok_or(RowError::MissingColumn { column, index })
}

fn parse_row(row: &[String], cols: Columns) -> Result<(u32, LapRecord), RowError> {
    let lap_count = match cols.laps {
        Some(i) => {
            let text = cell(row, i, LAPS_COLUMN)?;
            text.parse::<u32>()
                .map_err(|_| RowError::BadLapCount(text.to_string()))?
        }
        None => 0,
    };

    let last = match cols.last {
        Some(i) => cell(row, i, LAST_COLUMN)?,
        None => ZERO_LAP_TIME,
    };

    let pos_text = cell(row, POSITION_COLUMN_INDEX, "Position")?;
    let position = match pos_text.parse::<u32>() {
        Ok(p) if p > 0 => p,
        _ => return Err(RowError::BadPosition(pos_text.to_string())),
    };

    let last_lap_seconds = parse_lap_time(last)?;
    Ok((
        position,
        LapRecord {
            lap_count,
            last_lap_seconds,
        },
    ))
}

/// Validate rows and aggregate them per car. Later rows overwrite earlier
/// ones for the same car number.
pub fn normalize(table: &RawTable) -> TimingSnapshot {
    let cols = Columns {
        laps: table.column(LAPS_COLUMN),
        last: table.column(LAST_COLUMN),
    };
    debug!(laps = ?cols.laps, last = ?cols.last, "resolved columns");

    let mut snap = TimingSnapshot {
        headers: table.headers.clone(),
        rows_seen: table.rows.len(),
        ..Default::default()
    };

    for row in &table.rows {
        let Some(car) = car_number(row) else {
            debug!(car_cell = ?row.get(CAR_COLUMN_INDEX), "skipping row without numeric car number");
            snap.rows_skipped += 1;
            continue;
        };

        match parse_row(row, cols) {
            Ok((position, record)) => {
                trace!(
                    car,
                    position,
                    laps = record.lap_count,
                    last = record.last_lap_seconds,
                    "accepted row"
                );
                snap.lap_times.insert(car, record);
                snap.positions.insert(car, position);
                snap.car_numbers.push(car);
            }
            Err(e) => {
                warn!(car, error = %e, "skipping malformed row");
                snap.rows_skipped += 1;
            }
        }
    }

    snap.car_numbers.sort_unstable();
    snap.car_numbers.dedup();
    debug!(
        cars = snap.car_numbers.len(),
        skipped = snap.rows_skipped,
        car_numbers = ?snap.car_numbers,
        "normalized timing table"
    );
    snap
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(headers: &[&str], rows: &[&[&str]]) -> String {
        let mut html = String::from("<html><body><table><tr>");
        for h in headers {
            html.push_str(&format!("<th>{h}</th>"));
        }
        html.push_str("</tr>");
        for r in rows {
            html.push_str("<tr>");
            for c in *r {
                html.push_str(&format!("<td>{c}</td>"));
            }
            html.push_str("</tr>");
        }
        html.push_str("</table></body></html>");
        html
    }

    const FULL_HEADER: &[&str] = &["Pos", "Class", "Car", "Name", "Laps", "Last"];

    #[test]
    fn reference_table() {
        let html = page(
            FULL_HEADER,
            &[
                &["1", "GT", "42", "A. Driver", "10", "1:05.321"],
                &["2", "GT", "x", "B. Driver", "9", "58.000"],
            ],
        );
        let snap = extract(&html).unwrap();

        assert_eq!(snap.car_numbers, vec![42]);
        assert_eq!(snap.lap_times[&42].lap_count, 10);
        assert!((snap.lap_times[&42].last_lap_seconds - 65.321).abs() < 1e-9);
        assert_eq!(snap.positions[&42], 1);
        assert_eq!(snap.headers[0], "Position");
        assert_eq!(snap.rows_seen, 2);
        assert_eq!(snap.rows_skipped, 1);
    }

    #[test]
    fn no_table_is_an_error() {
        let err = extract("<html><body><p>closed</p></body></html>").unwrap_err();
        assert!(matches!(err, ScrapeError::NoTableFound));
    }

    #[test]
    fn header_only_is_empty_not_error() {
        let snap = extract(&page(FULL_HEADER, &[])).unwrap();
        assert!(snap.is_empty());
        assert!(snap.lap_times.is_empty());
        assert!(snap.positions.is_empty());
    }

    #[test]
    fn first_table_wins() {
        let first = page(&["P", "C", "Car"], &[&["1", "A", "7"]]);
        let second = page(&["P", "C", "Car"], &[&["1", "A", "99"]]);
        let snap = extract(&format!("{first}{second}")).unwrap();
        assert_eq!(snap.car_numbers, vec![7]);
    }

    #[test]
    fn missing_laps_and_last_default_to_zero() {
        let html = page(
            &["Pos", "Class", "Car", "Name"],
            &[&["1", "GT", "5", "A"], &["2", "GT", "3", "B"]],
        );
        let snap = extract(&html).unwrap();
        assert_eq!(snap.car_numbers, vec![3, 5]);
        for rec in snap.lap_times.values() {
            assert_eq!(rec.lap_count, 0);
            assert_eq!(rec.last_lap_seconds, 0.0);
        }
    }

    #[test]
    fn columns_found_by_name_anywhere() {
        let html = page(
            &["P", "Last", "Car", "Laps"],
            &[&["3", "45.200", "12", "4"]],
        );
        let snap = extract(&html).unwrap();
        assert_eq!(snap.lap_times[&12].lap_count, 4);
        assert!((snap.lap_times[&12].last_lap_seconds - 45.2).abs() < 1e-9);
        assert_eq!(snap.positions[&12], 3);
    }

    #[test]
    fn header_names_are_case_sensitive() {
        let html = page(&["P", "C", "Car", "laps", "LAST"], &[&["1", "A", "8", "9", "1:00.0"]]);
        let snap = extract(&html).unwrap();
        assert_eq!(snap.lap_times[&8].lap_count, 0);
        assert_eq!(snap.lap_times[&8].last_lap_seconds, 0.0);
    }

    #[test]
    fn later_duplicate_wins() {
        let html = page(
            FULL_HEADER,
            &[
                &["4", "GT", "21", "A", "3", "1:00.000"],
                &["2", "GT", "21", "A", "5", "59.500"],
            ],
        );
        let snap = extract(&html).unwrap();
        assert_eq!(snap.car_numbers, vec![21]);
        assert_eq!(snap.positions[&21], 2);
        assert_eq!(snap.lap_times[&21].lap_count, 5);
        assert!((snap.lap_times[&21].last_lap_seconds - 59.5).abs() < 1e-9);
    }

    #[test]
    fn car_numbers_sorted_and_unique() {
        let html = page(
            FULL_HEADER,
            &[
                &["1", "GT", "30", "A", "1", "50.0"],
                &["2", "GT", "4", "B", "1", "51.0"],
                &["3", "GT", "30", "A", "1", "52.0"],
                &["4", "GT", "17", "C", "1", "53.0"],
            ],
        );
        let snap = extract(&html).unwrap();
        assert_eq!(snap.car_numbers, vec![4, 17, 30]);
    }

    #[test]
    fn non_digit_car_cells_never_pass() {
        let html = page(
            FULL_HEADER,
            &[
                &["1", "GT", " 42 ", "A", "1", "50.0"],
                &["2", "GT", "", "B", "1", "50.0"],
                &["3", "GT", "-5", "C", "1", "50.0"],
                &["4", "GT", "4.0", "D", "1", "50.0"],
                &["5", "GT", "１２", "E", "1", "50.0"],
                &["6", "GT", "7a", "F", "1", "50.0"],
            ],
        );
        let snap = extract(&html).unwrap();
        assert_eq!(snap.car_numbers, vec![42]);
        assert_eq!(snap.rows_skipped, 5);
    }

    #[test]
    fn short_rows_are_tolerated() {
        let html = page(
            FULL_HEADER,
            &[
                &["Lap 12 – session running"],
                &["1", "GT"],
                &["2", "GT", "9", "B", "6"],
                &["3", "GT", "11", "C", "6", "1:01.100"],
            ],
        );
        let snap = extract(&html).unwrap();
        // row 3 has a car number but no "Last" cell
        assert_eq!(snap.car_numbers, vec![11]);
        assert_eq!(snap.rows_skipped, 3);
    }

    #[test]
    fn bad_position_skips_row() {
        let html = page(
            FULL_HEADER,
            &[
                &["DNF", "GT", "9", "B", "6", "1:00.000"],
                &["0", "GT", "10", "B", "6", "1:00.000"],
                &["1", "GT", "11", "C", "6", "1:01.100"],
            ],
        );
        let snap = extract(&html).unwrap();
        assert_eq!(snap.car_numbers, vec![11]);
        assert!(!snap.positions.contains_key(&9));
        assert!(!snap.lap_times.contains_key(&10));
    }

    #[test]
    fn bad_time_or_laps_skips_row_only() {
        let html = page(
            FULL_HEADER,
            &[
                &["1", "GT", "9", "B", "6", "PIT"],
                &["2", "GT", "10", "B", "six", "1:00.000"],
                &["3", "GT", "11", "C", "6", "1:01.100"],
            ],
        );
        let snap = extract(&html).unwrap();
        assert_eq!(snap.car_numbers, vec![11]);
        assert_eq!(snap.positions[&11], 3);
    }

    #[test]
    fn row_errors_are_specific() {
        let cols = Columns {
            laps: Some(4),
            last: Some(5),
        };
        let row = |cells: &[&str]| cells.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(
            parse_row(&row(&["1", "GT", "9", "B", "6"]), cols),
            Err(RowError::MissingColumn {
                column: LAST_COLUMN,
                index: 5
            })
        );
        assert_eq!(
            parse_row(&row(&["x", "GT", "9", "B", "6", "1:00"]), cols),
            Err(RowError::BadPosition("x".into()))
        );
        assert!(matches!(
            parse_row(&row(&["1", "GT", "9", "B", "6", "1:xx"]), cols),
            Err(RowError::TimeFormat(_))
        ));
    }

    #[test]
    fn cell_text_is_trimmed_and_flattened() {
        let html = "<table>\
            <tr><th> Pos </th><th>Cl</th><th>No</th><th> Laps </th><th>Last</th></tr>\
            <tr><td> 1 </td><td>GT</td><td>\n <b>42</b> </td><td> 10</td><td><span>1:</span>05.321 </td></tr>\
            </table>";
        let snap = extract(html).unwrap();
        assert_eq!(snap.headers, vec!["Position", "Cl", "No", "Laps", "Last"]);
        assert_eq!(snap.lap_times[&42].lap_count, 10);
        assert!((snap.lap_times[&42].last_lap_seconds - 65.321).abs() < 1e-9);
    }
}
