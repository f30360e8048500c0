//! Wall-clock ↔ `Ms` conversions and calendar period arithmetic.
//!
//! Everything is UTC. Dates and times only exist at the edges (SQL input,
//! result rows); the engine compares plain millisecond spans.

use chrono::{DateTime, Days, Months, NaiveDate, NaiveTime, SecondsFormat, Utc};

use crate::model::{Ms, Span};

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// A lifecycle increment. Months are calendar months, clamped to the last
/// day of the target month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Days(u32),
    Months(u32),
}

pub fn now_ms() -> Ms {
    Utc::now().timestamp_millis()
}

/// The instant `time` on `date`.
pub fn at(date: NaiveDate, time: NaiveTime) -> Ms {
    date.and_time(time).and_utc().timestamp_millis()
}

pub fn midnight(date: NaiveDate) -> Ms {
    at(date, NaiveTime::MIN)
}

/// `[00:00, 24:00)` of `date`.
pub fn day_span(date: NaiveDate) -> Span {
    let start = midnight(date);
    Span::new(start, start + DAY_MS)
}

pub fn date_of(ms: Ms) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.date_naive())
}

/// `ms` moved forward by one `period`. `None` when the result leaves
/// chrono's representable range.
pub fn advance(ms: Ms, period: Period) -> Option<Ms> {
    let dt = DateTime::from_timestamp_millis(ms)?;
    let next = match period {
        Period::Days(n) => dt.checked_add_days(Days::new(u64::from(n)))?,
        Period::Months(n) => dt.checked_add_months(Months::new(n))?,
    };
    Some(next.timestamp_millis())
}

pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| format!("bad date {s:?}: {e}"))
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time(s: &str) -> Result<NaiveTime, String> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|e| format!("bad time {s:?}: {e}"))
}

/// Unix milliseconds, RFC 3339, or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(s: &str) -> Result<Ms, String> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<Ms>() {
        if DateTime::from_timestamp_millis(ms).is_none() {
            return Err(format!("timestamp {ms} is outside the supported calendar range"));
        }
        return Ok(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }
    parse_date(s)
        .map(midnight)
        .map_err(|_| format!("bad timestamp {s:?}: expected ms, RFC 3339 or YYYY-MM-DD"))
}

pub fn format_timestamp(ms: Ms) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| ms.to_string())
}

pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Clock reading of `ms` relative to the midnight that opens `date`.
/// The end of the day renders as `24:00`.
pub fn format_clock(date: NaiveDate, ms: Ms) -> String {
    let minutes = (ms - midnight(date)).div_euclid(MINUTE_MS);
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn at_and_date_of_agree() {
        let d = date("2024-01-15");
        let nine = at(d, parse_time("09:00").unwrap());
        assert_eq!(nine - midnight(d), 9 * HOUR_MS);
        assert_eq!(date_of(nine), Some(d));
    }

    #[test]
    fn timestamps_outside_the_calendar_are_rejected() {
        assert_eq!(parse_timestamp("1704067200000"), Ok(1_704_067_200_000));
        assert_eq!(parse_timestamp("-86400000"), Ok(-86_400_000));
        assert!(parse_timestamp("9000000000000000000").is_err());
        assert!(parse_timestamp("-9000000000000000000").is_err());
        assert!(parse_timestamp(&i64::MAX.to_string()).is_err());
    }

    #[test]
    fn day_span_is_24_hours() {
        let span = day_span(date("2024-03-10"));
        assert_eq!(span.duration_ms(), DAY_MS);
    }

    #[test]
    fn advance_days() {
        let start = midnight(date("2024-01-25"));
        assert_eq!(advance(start, Period::Days(7)), Some(midnight(date("2024-02-01"))));
    }

    #[test]
    fn advance_month_clamps_to_month_end() {
        let jan31 = midnight(date("2024-01-31"));
        assert_eq!(advance(jan31, Period::Months(1)), Some(midnight(date("2024-02-29"))));
        let jan31_2023 = midnight(date("2023-01-31"));
        assert_eq!(
            advance(jan31_2023, Period::Months(1)),
            Some(midnight(date("2023-02-28")))
        );
    }

    #[test]
    fn parse_time_with_and_without_seconds() {
        assert_eq!(parse_time("09:30").unwrap(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(parse_time("09:30:15").unwrap(), NaiveTime::from_hms_opt(9, 30, 15).unwrap());
        assert!(parse_time("9.30").is_err());
        assert!(parse_time("25:00").is_err());
    }

    #[test]
    fn parse_timestamp_formats() {
        assert_eq!(parse_timestamp("1700000000000").unwrap(), 1_700_000_000_000);
        assert_eq!(parse_timestamp("2024-01-31").unwrap(), midnight(date("2024-01-31")));
        assert_eq!(
            parse_timestamp("2024-01-31T12:00:00Z").unwrap(),
            midnight(date("2024-01-31")) + 12 * HOUR_MS
        );
        assert!(parse_timestamp("next tuesday").is_err());
    }

    #[test]
    fn format_clock_end_of_day() {
        let d = date("2024-01-15");
        assert_eq!(format_clock(d, midnight(d) + 9 * HOUR_MS + 30 * MINUTE_MS), "09:30");
        assert_eq!(format_clock(d, midnight(d) + DAY_MS), "24:00");
    }

    #[test]
    fn format_timestamp_rfc3339() {
        assert_eq!(format_timestamp(midnight(date("2024-01-31"))), "2024-01-31T00:00:00Z");
    }
}
