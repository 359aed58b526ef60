use crate::error::TimeFormatError;

/// Stand-in for a missing "Last" column.
pub const ZERO_LAP_TIME: &str = "0:00.000";

/// Parse `[minutes:]seconds[.fraction]` into seconds.
///
/// Only the last two `:` segments are read: the final one as real seconds,
/// the one before it (if any) as whole minutes.
pub fn parse_lap_time(text: &str) -> Result<f64, TimeFormatError> {
    let err = || TimeFormatError {
        text: text.to_string(),
    };

    let mut parts = text.trim().rsplit(':');
    let secs_part = parts.next().unwrap_or_default().trim();
    if secs_part.is_empty() {
        return Err(err());
    }
    let mut seconds: f64 = secs_part.parse().map_err(|_| err())?;

    if let Some(min_part) = parts.next() {
        let minutes: u32 = min_part.trim().parse().map_err(|_| err())?;
        seconds += f64::from(minutes) * 60.0;
    }

    // "inf"/"NaN" parse as f64 but are not lap times
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(err());
    }
    Ok(seconds)
}
