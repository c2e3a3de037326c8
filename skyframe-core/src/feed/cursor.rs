//! Feed pagination cursors.
//!
//! The wire format is a single string, `p={sort_key}|g={marker}`, carrying one
//! sub-cursor per stream: the prioritized stream resumes positionally from
//! `{ISO-8601 timestamp}_{id}`, while the discovery stream only carries the
//! `random` marker (a random order cannot be resumed positionally). Bare
//! strings without the composite shape are accepted as legacy discovery
//! cursors. Raw strings are parsed into [`FeedCursor`] right at this boundary
//! and never flow into the blending algorithm.

use chrono::NaiveDateTime;

use crate::catalog::SortKey;
use crate::error::{Result, SkyFrameError};

/// Parsed pagination state for both feed sub-streams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedCursor {
    /// Resume point of the prioritized stream.
    pub prioritized: Option<SortKey>,
    /// Opaque discovery marker, carried through for compatibility.
    pub global_new: Option<String>,
}

/// Parse a raw cursor string. `None` or empty means "first page".
///
/// A malformed prioritized sort key inside a composite cursor is a
/// [`SkyFrameError::InvalidCursor`]; unknown bare tokens are tolerated as
/// legacy discovery cursors instead.
pub fn parse_feed_cursor(raw: Option<&str>) -> Result<FeedCursor> {
    let Some(raw) = raw.filter(|value| !value.is_empty()) else {
        return Ok(FeedCursor::default());
    };
    if raw.contains('|') && (raw.contains("p=") || raw.contains("g=")) {
        let mut parsed = FeedCursor::default();
        for part in raw.split('|') {
            if let Some(value) = part.strip_prefix("p=") {
                parsed.prioritized = if value.is_empty() {
                    None
                } else {
                    Some(parse_sort_key(value)?)
                };
            } else if let Some(value) = part.strip_prefix("g=") {
                parsed.global_new = (!value.is_empty()).then(|| value.to_string());
            }
        }
        return Ok(parsed);
    }
    if raw == "random" {
        return Ok(FeedCursor::default());
    }
    // Legacy bare discovery cursor.
    Ok(FeedCursor {
        prioritized: None,
        global_new: Some(raw.to_string()),
    })
}

/// Format the next-page cursor. Both sub-cursors absent yields the empty
/// string, meaning "no further pages".
pub fn format_feed_cursor(prioritized: Option<&str>, global_new: Option<&str>) -> String {
    if prioritized.is_none() && global_new.is_none() {
        return String::new();
    }
    format!(
        "p={}|g={}",
        prioritized.unwrap_or_default(),
        global_new.unwrap_or_default()
    )
}

/// Encode a sort key as `{ISO-8601 timestamp}_{id}`.
pub(crate) fn encode_sort_key(key: &SortKey) -> String {
    format!(
        "{}_{}",
        key.observed_at.format("%Y-%m-%dT%H:%M:%S%.6f"),
        key.id
    )
}

pub(crate) fn parse_sort_key(value: &str) -> Result<SortKey> {
    let (timestamp, id) = value
        .rsplit_once('_')
        .ok_or_else(|| SkyFrameError::InvalidCursor(format!("missing id separator in {value:?}")))?;
    let id: i64 = id
        .parse()
        .map_err(|_| SkyFrameError::InvalidCursor(format!("non-numeric id in {value:?}")))?;
    let observed_at = NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|_| SkyFrameError::InvalidCursor(format!("bad timestamp in {value:?}")))?
        .and_utc();
    Ok(SortKey { observed_at, id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn key() -> SortKey {
        SortKey {
            observed_at: Utc.with_ymd_and_hms(2026, 8, 20, 21, 15, 3).unwrap(),
            id: 42,
        }
    }

    #[test]
    fn first_page_cursors_parse_to_default() {
        assert_eq!(parse_feed_cursor(None).unwrap(), FeedCursor::default());
        assert_eq!(parse_feed_cursor(Some("")).unwrap(), FeedCursor::default());
        assert_eq!(
            parse_feed_cursor(Some("random")).unwrap(),
            FeedCursor::default()
        );
    }

    #[test]
    fn composite_cursor_roundtrips() {
        let encoded = format_feed_cursor(Some(&encode_sort_key(&key())), Some("random"));
        let parsed = parse_feed_cursor(Some(&encoded)).unwrap();
        assert_eq!(parsed.prioritized, Some(key()));
        assert_eq!(parsed.global_new.as_deref(), Some("random"));
    }

    #[test]
    fn empty_sub_cursors_parse_to_none() {
        let parsed = parse_feed_cursor(Some("p=|g=")).unwrap();
        assert_eq!(parsed, FeedCursor::default());
    }

    #[test]
    fn bare_token_is_a_legacy_discovery_cursor() {
        let parsed = parse_feed_cursor(Some("seen")).unwrap();
        assert_eq!(parsed.prioritized, None);
        assert_eq!(parsed.global_new.as_deref(), Some("seen"));
    }

    #[test]
    fn malformed_prioritized_key_is_invalid_cursor() {
        for raw in [
            "p=not-a-timestamp|g=",
            "p=2026-08-20T21:15:03_notanid|g=",
            "p=justatoken|g=random",
        ] {
            assert!(
                matches!(
                    parse_feed_cursor(Some(raw)),
                    Err(SkyFrameError::InvalidCursor(_))
                ),
                "expected InvalidCursor for {raw:?}"
            );
        }
    }

    #[test]
    fn sort_key_roundtrips_with_fractional_seconds() {
        let original = SortKey {
            observed_at: Utc
                .with_ymd_and_hms(2026, 8, 20, 21, 15, 3)
                .unwrap()
                + chrono::Duration::microseconds(250_000),
            id: 7,
        };
        assert_eq!(parse_sort_key(&encode_sort_key(&original)).unwrap(), original);
    }

    #[test]
    fn sort_key_accepts_second_granularity_timestamps() {
        let parsed = parse_sort_key("2026-08-20T21:15:03_42").unwrap();
        assert_eq!(parsed, key());
    }

    #[test]
    fn no_further_pages_formats_as_empty_string() {
        assert_eq!(format_feed_cursor(None, None), "");
    }
}
