//! Collapses a webhook batch to one record per `event_id` and orders it.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::models::{NormalizedResult, WebhookEvent};

/// Deduplicates, sorts and summarizes a batch. Pure and infallible.
pub fn normalize(events: Vec<WebhookEvent>) -> NormalizedResult {
    if events.is_empty() {
        return NormalizedResult::empty();
    }

    let mut survivors = deduplicate(events);
    survivors.sort_by(presentation_order);
    NormalizedResult::from_ordered(&survivors)
}

/// Which of two events sharing an id is authoritative: earliest instant,
/// then smallest source. `Less` means `a` wins.
pub fn precedence(a: &WebhookEvent, b: &WebhookEvent) -> Ordering {
    a.timestamp
        .instant()
        .cmp(&b.timestamp.instant())
        .then_with(|| a.source.cmp(&b.source))
}

/// Output order for survivors: instant, then `event_id`.
pub fn presentation_order(a: &WebhookEvent, b: &WebhookEvent) -> Ordering {
    a.timestamp
        .instant()
        .cmp(&b.timestamp.instant())
        .then_with(|| a.event_id.cmp(&b.event_id))
}

fn deduplicate(events: Vec<WebhookEvent>) -> Vec<WebhookEvent> {
    let mut by_id: HashMap<String, WebhookEvent> = HashMap::with_capacity(events.len());
    for event in events {
        match by_id.entry(event.event_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(event);
            }
            Entry::Occupied(mut slot) => {
                // Strictly earlier only; full ties keep the first occurrence.
                if precedence(&event, slot.get()) == Ordering::Less {
                    slot.insert(event);
                }
            }
        }
    }
    by_id.into_values().collect()
}
