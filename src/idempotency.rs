//! Rejects byte-identical request bodies resubmitted within a TTL window.
//!
//! In-memory only; the map is lost on restart and is not shared between
//! instances.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

pub const DEFAULT_TTL_SECS: i64 = 60;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// SHA-256 of the canonicalized request body.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(body: &[u8]) -> Self {
        Self(Sha256::digest(canonicalize(body)).into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

/// Compact JSON re-serialization in the order the fields were received;
/// bodies that are not JSON are hashed as-is.
///
/// Key order is not normalized: `{"a":1,"b":2}` and `{"b":2,"a":1}` produce
/// different fingerprints and are not treated as duplicates of each other.
pub fn canonicalize(body: &[u8]) -> Cow<'_, [u8]> {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => match serde_json::to_vec(&value) {
            Ok(compact) => Cow::Owned(compact),
            Err(_) => Cow::Borrowed(body),
        },
        Err(_) => Cow::Borrowed(body),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Rejected,
}

pub struct IdempotencyCache {
    seen: Mutex<HashMap<Fingerprint, DateTime<Utc>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl IdempotencyCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Accepts and records `body` unless an identical body was accepted less
    /// than one TTL ago. Sweep, lookup and insert share one lock acquisition.
    pub fn check_and_record(&self, body: &[u8]) -> Admission {
        let fingerprint = Fingerprint::of(body);
        let now = self.clock.now();
        let mut seen = self.lock();

        let before = seen.len();
        seen.retain(|_, accepted_at| now - *accepted_at < self.ttl);
        if seen.len() != before {
            debug!("Swept {} expired fingerprints", before - seen.len());
        }

        if seen.contains_key(&fingerprint) {
            debug!(%fingerprint, "Fingerprint still fresh, rejecting");
            return Admission::Rejected;
        }
        seen.insert(fingerprint, now);
        debug!(%fingerprint, "Fingerprint recorded");
        Admission::Accepted
    }

    /// Entries currently held, fresh or not yet swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Fingerprint, DateTime<Utc>>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TTL_SECS))
    }
}

impl fmt::Debug for IdempotencyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdempotencyCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn new() -> Arc<Self> {
            let start = DateTime::parse_from_rfc3339("2025-11-15T10:30:00Z")
                .unwrap()
                .with_timezone(&Utc);
            Arc::new(Self(Mutex::new(start)))
        }

        fn advance(&self, by: Duration) {
            *self.0.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn cache_with_clock() -> (IdempotencyCache, Arc<ManualClock>) {
        let clock = ManualClock::new();
        let cache = IdempotencyCache::with_clock(Duration::seconds(60), clock.clone());
        (cache, clock)
    }

    #[test]
    fn first_request_is_accepted() {
        let (cache, _) = cache_with_clock();
        assert_eq!(cache.check_and_record(br#"{"events":[]}"#), Admission::Accepted);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn repeat_within_ttl_is_rejected() {
        let (cache, clock) = cache_with_clock();
        let body = br#"{"events":[{"event_id":"evt_001"}]}"#;
        assert_eq!(cache.check_and_record(body), Admission::Accepted);
        clock.advance(Duration::seconds(59));
        assert_eq!(cache.check_and_record(body), Admission::Rejected);
    }

    #[test]
    fn repeat_after_ttl_is_accepted_again() {
        let (cache, clock) = cache_with_clock();
        let body = br#"{"events":[{"event_id":"evt_001"}]}"#;
        assert_eq!(cache.check_and_record(body), Admission::Accepted);
        clock.advance(Duration::seconds(60));
        assert_eq!(cache.check_and_record(body), Admission::Accepted);
    }

    #[test]
    fn rejection_does_not_extend_the_window() {
        let (cache, clock) = cache_with_clock();
        let body = b"{}";
        assert_eq!(cache.check_and_record(body), Admission::Accepted);
        clock.advance(Duration::seconds(30));
        assert_eq!(cache.check_and_record(body), Admission::Rejected);
        clock.advance(Duration::seconds(30));
        assert_eq!(cache.check_and_record(body), Admission::Accepted);
    }

    #[test]
    fn different_bodies_are_both_accepted() {
        let (cache, _) = cache_with_clock();
        assert_eq!(
            cache.check_and_record(br#"{"events":[{"event_id":"evt_001"}]}"#),
            Admission::Accepted
        );
        assert_eq!(
            cache.check_and_record(br#"{"events":[{"event_id":"evt_002"}]}"#),
            Admission::Accepted
        );
    }

    #[test]
    fn whitespace_differences_share_a_fingerprint() {
        let compact = br#"{"events":[{"event_id":"evt_001"}]}"#;
        let pretty = b"{\n  \"events\": [ { \"event_id\": \"evt_001\" } ]\n}";
        assert_eq!(Fingerprint::of(compact), Fingerprint::of(pretty));
    }

    #[test]
    fn key_order_changes_the_fingerprint() {
        let a = br#"{"event_id":"evt_001","source":"stripe"}"#;
        let b = br#"{"source":"stripe","event_id":"evt_001"}"#;
        assert_ne!(Fingerprint::of(a), Fingerprint::of(b));

        let (cache, _) = cache_with_clock();
        assert_eq!(cache.check_and_record(a), Admission::Accepted);
        assert_eq!(cache.check_and_record(b), Admission::Accepted);
    }

    #[test]
    fn non_json_bodies_hash_raw_bytes() {
        assert_eq!(canonicalize(b"not json").as_ref(), b"not json");
        assert_eq!(
            Fingerprint::of(b"").to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn expired_entries_are_swept_on_any_call() {
        let (cache, clock) = cache_with_clock();
        cache.check_and_record(b"one");
        cache.check_and_record(b"two");
        assert_eq!(cache.len(), 2);
        clock.advance(Duration::seconds(61));
        cache.check_and_record(b"three");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_forgets_everything() {
        let (cache, _) = cache_with_clock();
        cache.check_and_record(b"one");
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.check_and_record(b"one"), Admission::Accepted);
    }

    #[test]
    fn concurrent_identical_bodies_admit_exactly_one() {
        const THREADS: usize = 16;
        let cache = IdempotencyCache::new(Duration::seconds(60));
        let barrier = Barrier::new(THREADS);
        let body = br#"{"events":[{"event_id":"evt_001","source":"stripe"}]}"#;

        let outcomes: Vec<Admission> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.check_and_record(body)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let accepted = outcomes.iter().filter(|o| **o == Admission::Accepted).count();
        assert_eq!(accepted, 1);
        assert_eq!(outcomes.len() - accepted, THREADS - 1);
    }
}
