//! The flash: the one data type every other module passes around.
//!
//! A `Flash` is a short news item published by a LibreNews server.  The
//! server's JSON and the local store share the same field names, so the
//! serde derive below doubles as both the wire format and the storage format.
//!
//! ## Dates
//!
//! Flashes are written back out as RFC 3339.  When reading, RFC 3339,
//! RFC 2822 and integer Unix seconds are all accepted, because servers in the
//! wild emit all three.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A single flash, as fetched from the server and as remembered on disk.
///
/// `id` is the only field used for de-duplication.  Nothing else about a
/// flash is compared when deciding whether it has been seen before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    /// Server-assigned identifier, unique per server.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,

    /// Channel the flash was published on (e.g. "Breaking").
    pub channel: String,

    /// Originating outlet (e.g. "Reuters").
    pub source: String,

    /// The headline itself.
    pub text: String,

    /// URL opened when the notification is clicked.
    pub link: String,

    /// Publication timestamp; the store keeps the newest flashes by this field.
    #[serde(deserialize_with = "deserialize_date")]
    pub date: DateTime<Utc>,
}

impl Flash {
    /// Notification title: `"<channel> • <source>"`.
    pub fn title(&self) -> String {
        format!("{} • {}", self.channel, self.source)
    }

    /// Stable numeric key for the desktop notification.
    ///
    /// Numeric identifiers that fit in a `u32` are used as-is; anything else
    /// is hashed with 32-bit FNV-1a.  The result depends only on `id`, so a
    /// re-delivered flash replaces its earlier bubble instead of stacking.
    pub fn notification_id(&self) -> u32 {
        self.id
            .parse::<u32>()
            .unwrap_or_else(|_| fnv1a_32(self.id.as_bytes()))
    }
}

fn fnv1a_32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    bytes.iter().fold(OFFSET_BASIS, |hash, &b| {
        (hash ^ u32::from(b)).wrapping_mul(PRIME)
    })
}

// ---------------------------------------------------------------------------
// Lenient deserializers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Text(String),
    Int(i64),
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawScalar::deserialize(deserializer)? {
        RawScalar::Text(s) => s,
        RawScalar::Int(n) => n.to_string(),
    })
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match RawScalar::deserialize(deserializer)? {
        RawScalar::Text(s) => parse_date(&s)
            .ok_or_else(|| D::Error::custom(format!("unrecognised date {s:?}"))),
        RawScalar::Int(secs) => Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| D::Error::custom(format!("timestamp {secs} out of range"))),
    }
}

/// Parse a date string as RFC 3339, falling back to RFC 2822.
fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_rfc2822(s))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Shorthand constructor shared by tests across the crate.
    pub fn make_flash(id: &str, date: DateTime<Utc>) -> Flash {
        Flash {
            id: id.to_string(),
            channel: "Breaking".to_string(),
            source: "Wire".to_string(),
            text: format!("Headline {id}"),
            link: format!("https://example.com/{id}"),
            date,
        }
    }

    #[test]
    fn title_joins_channel_and_source() {
        let flash = make_flash("1", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(flash.title(), "Breaking • Wire");
    }

    #[test]
    fn numeric_id_is_used_verbatim() {
        let flash = make_flash("4242", Utc::now());
        assert_eq!(flash.notification_id(), 4242);
    }

    #[test]
    fn non_numeric_id_hash_is_stable() {
        let a = make_flash("abc-123", Utc::now());
        let b = make_flash("abc-123", Utc.with_ymd_and_hms(2020, 5, 5, 5, 5, 5).unwrap());
        assert_eq!(a.notification_id(), b.notification_id());
        // Known FNV-1a value for the empty input.
        assert_eq!(fnv1a_32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c_292c);
    }

    #[test]
    fn different_ids_usually_differ() {
        let a = make_flash("flash-a", Utc::now());
        let b = make_flash("flash-b", Utc::now());
        assert_ne!(a.notification_id(), b.notification_id());
    }

    #[test]
    fn deserializes_rfc2822_date_and_numeric_id() {
        let json = r#"{
            "id": 17,
            "channel": "Breaking",
            "source": "AP",
            "text": "Something happened",
            "link": "https://example.com/17",
            "date": "Tue, 02 Jan 2024 12:00:00 +0000"
        }"#;
        let flash: Flash = serde_json::from_str(json).unwrap();
        assert_eq!(flash.id, "17");
        assert_eq!(flash.date, Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap());
    }

    #[test]
    fn deserializes_unix_seconds() {
        let json = r#"{"id":"x","channel":"c","source":"s","text":"t","link":"l","date":1700000000}"#;
        let flash: Flash = serde_json::from_str(json).unwrap();
        assert_eq!(flash.date.timestamp(), 1_700_000_000);
    }

    #[test]
    fn rejects_garbage_date() {
        let json = r#"{"id":"x","channel":"c","source":"s","text":"t","link":"l","date":"yesterday"}"#;
        assert!(serde_json::from_str::<Flash>(json).is_err());
    }

    #[test]
    fn serializes_date_as_rfc3339() {
        let flash = make_flash("1", Utc.with_ymd_and_hms(2024, 3, 4, 5, 6, 7).unwrap());
        let value = serde_json::to_value(&flash).unwrap();
        assert_eq!(value["date"], "2024-03-04T05:06:07Z");
    }
}
