use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer};

use crate::Time;

/// Parses either an RFC 3339 timestamp or a naive ISO-8601 one, the latter
/// being taken as UTC
pub fn parse_time(s: &str) -> Option<Time> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|t| DateTime::<Utc>::from_naive_utc_and_offset(t, Utc))
}

pub(crate) fn deserialize<'de, D>(d: D) -> Result<Time, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(d)?;
    parse_time(&s).ok_or_else(|| de::Error::custom(format!("invalid timestamp {s:?}")))
}

pub(crate) fn deserialize_opt<'de, D>(d: D) -> Result<Option<Time>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(d)? {
        None => Ok(None),
        Some(s) => parse_time(&s)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp {s:?}"))),
    }
}
