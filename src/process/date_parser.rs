use chrono::{NaiveDate, NaiveDateTime};

/// Accepted datetime layouts, tried in order. `%.f` also matches no fraction.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse a naive trip timestamp into microseconds since the epoch.
/// A bare `YYYY-MM-DD` date is taken as midnight.
pub fn parse_timestamp_micros(s: &str) -> Option<i64> {
    let s = s.trim().trim_matches('"');
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|dt| dt.and_utc().timestamp_micros())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_layouts() {
        let expected = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 30, 10)
            .unwrap()
            .and_utc()
            .timestamp_micros();

        assert_eq!(parse_timestamp_micros("2021-01-01 00:30:10"), Some(expected));
        assert_eq!(parse_timestamp_micros("2021-01-01T00:30:10"), Some(expected));
        assert_eq!(parse_timestamp_micros("\"2021/01/01 00:30:10\""), Some(expected));
        assert_eq!(
            parse_timestamp_micros("2021-01-01 00:30:10.25"),
            Some(expected + 250_000)
        );
        assert_eq!(
            parse_timestamp_micros("2021-01-01"),
            Some(expected - (30 * 60 + 10) * 1_000_000)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_timestamp_micros("yesterday"), None);
        assert_eq!(parse_timestamp_micros("2021-13-01 00:00:00"), None);
    }
}
