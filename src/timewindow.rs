//! Local-day window math.
//!
//! The app anchors every calendar date to a fixed UTC+7 offset (no DST).
//! All instants are stored and compared in UTC; these helpers convert a
//! local calendar date to its half-open `[00:00, 24:00)` UTC window and
//! clip arbitrary intervals to it.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use thiserror::Error;

/// Fixed local offset in seconds (UTC+7, no daylight saving).
const TZ_OFFSET_SECS: i32 = 7 * 3600;

#[derive(Debug, Error)]
pub enum TimeError {
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("invalid time: {0}")]
    InvalidTime(String),
}

fn local_offset() -> FixedOffset {
    // Statically valid offset
    FixedOffset::east_opt(TZ_OFFSET_SECS).unwrap()
}

/// Parse a strict `YYYY-MM-DD` date string.
///
/// Rejects non-padded forms like `2025-9-1` that chrono would otherwise
/// accept.
pub fn parse_local_date(s: &str) -> Result<NaiveDate, TimeError> {
    let bytes = s.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| matches!(i, 4 | 7) || b.is_ascii_digit());
    if !shaped {
        return Err(TimeError::InvalidDate(s.to_string()));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| TimeError::InvalidDate(s.to_string()))
}

/// UTC bounds of the local day containing `date`, as the half-open
/// interval `[start, end)`. The span is exactly 24 hours.
pub fn day_bounds_for(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = date.and_time(NaiveTime::MIN);
    let start = local_offset()
        .from_local_datetime(&midnight)
        .unwrap()
        .with_timezone(&Utc);
    (start, start + Duration::hours(24))
}

/// [`day_bounds_for`] from a `YYYY-MM-DD` string.
pub fn day_bounds(local_date: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), TimeError> {
    Ok(day_bounds_for(parse_local_date(local_date)?))
}

/// Combine a local date and an `HH:MM` clock time into a UTC instant.
pub fn local_date_time_to_utc(date: NaiveDate, hhmm: &str) -> Result<DateTime<Utc>, TimeError> {
    let time = NaiveTime::parse_from_str(hhmm, "%H:%M")
        .map_err(|_| TimeError::InvalidTime(hhmm.to_string()))?;
    let local = local_offset()
        .from_local_datetime(&date.and_time(time))
        .unwrap();
    Ok(local.with_timezone(&Utc))
}

/// Whole minutes between two instants, floored at 1.
///
/// The floor keeps zero-length or sub-minute intervals from reporting 0,
/// which would poison downstream ratio math.
pub fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let ms = (end - start).num_milliseconds();
    ((ms as f64) / 60_000.0).round().max(1.0) as i64
}

/// Clip `[start, end)` to `[day_start, day_end)`. Returns `None` when the
/// intersection is empty or inverted.
pub fn clamp_to_day(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    day_start: DateTime<Utc>,
    day_end: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let s = start.max(day_start);
    let e = end.min(day_end);
    if e > s { Some((s, e)) } else { None }
}

/// The Monday of the week containing `date`.
pub fn week_monday(date: NaiveDate) -> NaiveDate {
    // 0 = Sunday .. 6 = Saturday, matching the frontend's convention
    let dow = date.weekday().num_days_from_sunday() as i64;
    let diff_to_monday = (dow + 6) % 7;
    date - Duration::days(diff_to_monday)
}

/// Today's calendar date in the fixed local offset.
pub fn today_local() -> NaiveDate {
    Utc::now().with_timezone(&local_offset()).date_naive()
}

/// Calendar date (in the fixed local offset) containing a UTC instant.
pub fn local_date_of(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&local_offset()).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn day_bounds_span_exactly_24h_at_plus7() {
        let (start, end) = day_bounds("2025-09-11").unwrap();
        assert_eq!(start, utc("2025-09-10T17:00:00Z"));
        assert_eq!(end - start, Duration::hours(24));
    }

    #[test]
    fn day_bounds_rejects_malformed_dates() {
        assert!(day_bounds("not-a-date").is_err());
        assert!(day_bounds("2025-13-01").is_err());
        assert!(day_bounds("2025-02-30").is_err());
        // strict shape: no unpadded components
        assert!(day_bounds("2025-9-1").is_err());
    }

    #[test]
    fn local_date_time_combines_under_fixed_offset() {
        let date = parse_local_date("2025-09-11").unwrap();
        let at = local_date_time_to_utc(date, "08:30").unwrap();
        assert_eq!(at, utc("2025-09-11T01:30:00Z"));
        assert!(local_date_time_to_utc(date, "25:00").is_err());
    }

    #[test]
    fn minutes_between_floors_at_one() {
        let t0 = utc("2025-09-11T10:00:00Z");
        assert_eq!(minutes_between(t0, t0), 1);
        assert_eq!(minutes_between(t0, t0 + Duration::seconds(20)), 1);
        // rounds, not truncates
        assert_eq!(minutes_between(t0, t0 + Duration::seconds(90)), 2);
        assert_eq!(minutes_between(t0, t0 + Duration::minutes(45)), 45);
    }

    #[test]
    fn clamp_returns_intersection_or_none() {
        let (day_start, day_end) = day_bounds("2025-09-11").unwrap();

        // entirely outside
        assert_eq!(
            clamp_to_day(
                day_end,
                day_end + Duration::hours(2),
                day_start,
                day_end
            ),
            None
        );

        // straddles the start boundary
        let clipped = clamp_to_day(
            day_start - Duration::hours(1),
            day_start + Duration::hours(1),
            day_start,
            day_end,
        )
        .unwrap();
        assert_eq!(clipped, (day_start, day_start + Duration::hours(1)));

        // clamping an already-clipped interval is a no-op
        assert_eq!(
            clamp_to_day(clipped.0, clipped.1, day_start, day_end),
            Some(clipped)
        );
    }

    #[test]
    fn week_monday_normalizes_any_weekday() {
        // 2025-09-11 is a Thursday
        let thursday = parse_local_date("2025-09-11").unwrap();
        assert_eq!(week_monday(thursday), parse_local_date("2025-09-08").unwrap());
        // Sunday belongs to the week that started the previous Monday
        let sunday = parse_local_date("2025-09-14").unwrap();
        assert_eq!(week_monday(sunday), parse_local_date("2025-09-08").unwrap());
        // Monday maps to itself
        let monday = parse_local_date("2025-09-08").unwrap();
        assert_eq!(week_monday(monday), monday);
    }
}
