//! Parses the timestamp text formats accepted at the SQL boundary (§6):
//! `YYYY-MM-DD HH:MM:SS[.ffffff][±HH:MM]`, the same shape with a `T`
//! separator, and a bare `YYYY-MM-DD` date. A missing offset means UTC;
//! output is always UTC.

use crate::error::EngineError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, EngineError> {
    let trimmed = input.trim();

    // Formats carrying an explicit UTC offset.
    for fmt in &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    // Formats with no offset: interpreted as UTC.
    for fmt in &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }

    // Bare date.
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let naive = date
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time");
        return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
    }

    Err(EngineError::BadTimestamp {
        input: input.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_space_separated_with_micros() {
        let dt = parse_timestamp("2024-03-05 12:30:00.123456").unwrap();
        assert_eq!(dt.timestamp_micros(), {
            let naive = NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_micro_opt(12, 30, 0, 123456)
                .unwrap();
            DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).timestamp_micros()
        });
    }

    #[test]
    fn parses_iso_t_separator_with_offset() {
        let dt = parse_timestamp("2024-03-05T12:30:00-05:00").unwrap();
        let expected = parse_timestamp("2024-03-05T17:30:00+00:00").unwrap();
        assert_eq!(dt, expected);
    }

    #[test]
    fn parses_bare_date_as_utc_midnight() {
        let dt = parse_timestamp("2024-03-05").unwrap();
        assert_eq!(dt.timestamp_micros(), parse_timestamp("2024-03-05 00:00:00").unwrap().timestamp_micros());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("not-a-date").is_err());
    }
}
