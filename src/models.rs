use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Extended and basic ISO-8601 layouts carrying an offset. `%#z` takes
/// `Z`, `+02`, `+0200` and `+02:00`.
const OFFSET_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y%m%dT%H%M%S%.f%#z",
    "%Y%m%dT%H%M%#z",
];

/// Same layouts without an offset; these are read as UTC.
const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y%m%dT%H%M%S%.f",
    "%Y%m%dT%H%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y%m%d"];

/// An ISO-8601 timestamp as submitted, together with the instant it denotes.
///
/// Ordering must always go through [`EventTimestamp::instant`]: two strings
/// with different offsets can name the same instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTimestamp {
    raw: String,
    instant: DateTime<Utc>,
}

impl EventTimestamp {
    /// Parses RFC 3339 and the other extended or basic ISO-8601 date-times,
    /// with `.` or `,` before the fraction. A missing offset means UTC; a bare
    /// calendar date means midnight UTC.
    pub fn parse(raw: &str) -> Option<Self> {
        parse_iso8601(raw).map(|instant| Self {
            raw: raw.to_string(),
            instant,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }
}

impl Serialize for EventTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

fn parse_iso8601(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // chrono only reads `.` before fractional seconds.
    let raw = raw.replace(',', ".");
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, format) {
            return Some(naive.and_utc());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&raw, format).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    pub event_id: String,
    pub source: String,
    pub timestamp: EventTimestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl WebhookEvent {
    pub fn new(
        event_id: impl Into<String>,
        source: impl Into<String>,
        timestamp: EventTimestamp,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            source: source.into(),
            timestamp,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedResult {
    pub ordered_event_ids: Vec<String>,
    pub unique_count: usize,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
}

impl NormalizedResult {
    pub fn empty() -> Self {
        Self {
            ordered_event_ids: Vec::new(),
            unique_count: 0,
            first_timestamp: None,
            last_timestamp: None,
        }
    }

    /// Summarizes events that are already deduplicated and sorted.
    pub fn from_ordered(events: &[WebhookEvent]) -> Self {
        let ordered_event_ids: Vec<String> = events.iter().map(|e| e.event_id.clone()).collect();
        Self {
            unique_count: ordered_event_ids.len(),
            ordered_event_ids,
            first_timestamp: events.first().map(|e| e.timestamp.as_str().to_string()),
            last_timestamp: events.last().map(|e| e.timestamp.as_str().to_string()),
        }
    }
}
