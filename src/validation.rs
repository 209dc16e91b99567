//! Turns a raw request body into typed events, collecting every violation.

use serde_json::{Map, Value};

use crate::models::{EventTimestamp, WebhookEvent};

pub const INVALID_JSON: &str = "request body must be valid JSON";
pub const EVENTS_NOT_ARRAY: &str = "events must be an array";
pub const EVENT_NOT_OBJECT: &str = "event must be an object";
pub const EVENT_ID_NOT_STRING: &str = "event.event_id must be a string";
pub const SOURCE_NOT_STRING: &str = "event.source must be a string";
pub const TIMESTAMP_NOT_ISO8601: &str = "event.timestamp must be a valid ISO 8601 date string";

/// One node of a validation failure tree. Leaf messages live in
/// `constraints`; nested fields hang off `children`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub property: String,
    pub constraints: Vec<String>,
    pub children: Vec<ValidationError>,
}

impl ValidationError {
    fn leaf(property: impl Into<String>, message: &str) -> Self {
        Self {
            property: property.into(),
            constraints: vec![message.to_string()],
            children: Vec::new(),
        }
    }

    fn branch(property: impl Into<String>, children: Vec<ValidationError>) -> Self {
        Self {
            property: property.into(),
            constraints: Vec::new(),
            children,
        }
    }
}

/// Depth-first walk: a node's own constraints come before its children's.
pub fn collect_messages(errors: &[ValidationError]) -> Vec<String> {
    errors
        .iter()
        .flat_map(|error| {
            let mut messages = error.constraints.clone();
            messages.extend(collect_messages(&error.children));
            messages
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct NormalizeRequest {
    pub events: Vec<WebhookEvent>,
}

pub fn parse_request(body: &[u8]) -> Result<NormalizeRequest, Vec<ValidationError>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| vec![ValidationError::leaf("body", INVALID_JSON)])?;

    let items = match value.get("events").and_then(Value::as_array) {
        Some(items) => items,
        None => return Err(vec![ValidationError::leaf("events", EVENTS_NOT_ARRAY)]),
    };

    let mut events = Vec::with_capacity(items.len());
    let mut failures = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match parse_event(item) {
            Ok(event) => events.push(event),
            Err(children) => failures.push(ValidationError::branch(index.to_string(), children)),
        }
    }

    if failures.is_empty() {
        Ok(NormalizeRequest { events })
    } else {
        Err(vec![ValidationError::branch("events", failures)])
    }
}

fn parse_event(item: &Value) -> Result<WebhookEvent, Vec<ValidationError>> {
    let Some(fields) = item.as_object() else {
        return Err(vec![ValidationError {
            property: String::new(),
            constraints: vec![EVENT_NOT_OBJECT.to_string()],
            children: Vec::new(),
        }]);
    };

    let mut errors = Vec::new();
    let event_id = string_field(fields, "event_id");
    if event_id.is_none() {
        errors.push(ValidationError::leaf("event_id", EVENT_ID_NOT_STRING));
    }
    let source = string_field(fields, "source");
    if source.is_none() {
        errors.push(ValidationError::leaf("source", SOURCE_NOT_STRING));
    }
    let timestamp = string_field(fields, "timestamp").and_then(EventTimestamp::parse);
    if timestamp.is_none() {
        errors.push(ValidationError::leaf("timestamp", TIMESTAMP_NOT_ISO8601));
    }

    match (event_id, source, timestamp) {
        (Some(event_id), Some(source), Some(timestamp)) => {
            let mut event = WebhookEvent::new(event_id, source, timestamp);
            event.payload = fields.get("payload").cloned();
            Ok(event)
        }
        _ => Err(errors),
    }
}

fn string_field<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    fields.get(name).and_then(Value::as_str)
}
