use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::CoreError;

/// Identifier of a content item in the navigation tree (e.g. `"day2"`).
pub type ContentId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Parse a server timestamp.
///
/// Accepts RFC 3339 (`2025-08-19T09:00:00Z`, `+09:00` offsets) as well as
/// offset-less ISO 8601 (`2025-08-19T09:00:00.123456`), which is read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Serde helper for optional server timestamps.
///
/// `null`, a missing field, and unparseable strings all become `None`
/// rather than failing the whole response.
pub fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

/// Validate that a content identifier is usable as a lock key and URL
/// path segment.
pub fn validate_content_id(content_id: &str) -> Result<(), CoreError> {
    if content_id.trim().is_empty() {
        return Err(CoreError::Validation(
            "content id must not be empty".to_string(),
        ));
    }
    if content_id.contains('/') {
        return Err(CoreError::Validation(format!(
            "content id '{content_id}' must not contain '/'"
        )));
    }
    Ok(())
}
