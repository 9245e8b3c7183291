//! Timestamp encoding shared by every table.
//!
//! Timestamps are stored as RFC-3339 text in UTC with a fixed microsecond
//! precision, so lexical order in SQL equals chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

pub(crate) fn encode(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Read a non-null timestamp column.
pub(crate) fn column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    decode(idx, &raw)
}

/// Read a nullable timestamp column.
pub(crate) fn optional_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| decode(idx, &s)).transpose()
}

fn decode(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_encoding_sorts_chronologically() {
        let early = Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap();
        let late = early + chrono::Duration::microseconds(1);
        assert!(encode(&early) < encode(&late));
        assert_eq!(encode(&early), "2024-09-01T08:00:00.000000Z");
    }

    #[test]
    fn test_decode_round_trip() {
        let ts = now();
        let back = decode(0, &encode(&ts)).unwrap();
        assert_eq!(back.timestamp_micros(), ts.timestamp_micros());
    }
}
