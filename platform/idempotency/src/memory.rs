use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fast in-memory duplicate suppression.
///
/// Backed by `dashmap` (a lock-free concurrent map, the idiomatic
/// choice over `Mutex<HashMap>` for a structure every consumer task
/// hits on every message) rather than a single global mutex.
///
/// `is_processed` and `mark_processed` never return an error: any
/// internal inconsistency is treated as "not yet processed" so a
/// transient bug in this layer cannot wedge a legitimate event. This
/// fails open deliberately, favouring liveness over strict suppression,
/// since the outbox's unique `event_id` constraint is the secondary
/// line of defence.
#[derive(Clone)]
pub struct MemoryIdempotency {
    entries: Arc<DashMap<String, Instant>>,
}

impl MemoryIdempotency {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// `true` if `(event_type, id)` has a live (non-expired) marker.
    pub fn is_processed(&self, event_type: &str, id: &str) -> bool {
        let key = crate::processed_key("local", event_type, id);
        match self.entries.get(&key) {
            Some(expires_at) => *expires_at > Instant::now(),
            None => false,
        }
    }

    /// Set-if-absent with a TTL. Returns `true` if this call is the one
    /// that created the marker (i.e. the caller is the first to see
    /// this event), `false` if a live marker already existed.
    pub fn mark_processed(&self, event_type: &str, id: &str, ttl: Duration) -> bool {
        let key = crate::processed_key("local", event_type, id);
        let now = Instant::now();
        let expires_at = now + ttl;

        use dashmap::mapref::entry::Entry;
        match self.entries.entry(key) {
            Entry::Occupied(existing) if *existing.get() > now => false,
            Entry::Occupied(mut existing) => {
                existing.insert(expires_at);
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(expires_at);
                true
            }
        }
    }

    /// Remove expired markers. Intended to be driven by a periodic
    /// `tokio::spawn`'d sweeper so the map doesn't grow unbounded; not
    /// required for correctness (a stale entry is indistinguishable
    /// from "still processed" only until its TTL check fails anyway).
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, expires_at| *expires_at > now);
    }

    /// Spawn a background task that calls [`sweep_expired`] on
    /// `interval` until the returned handle is dropped/aborted.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.sweep_expired();
            }
        })
    }
}

impl Default for MemoryIdempotency {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_mark_returns_true_second_returns_false() {
        let store = MemoryIdempotency::new();
        assert!(store.mark_processed("payment.succeeded", "order-1", Duration::from_secs(60)));
        assert!(!store.mark_processed("payment.succeeded", "order-1", Duration::from_secs(60)));
    }

    #[test]
    fn is_processed_reflects_marker_state() {
        let store = MemoryIdempotency::new();
        assert!(!store.is_processed("payment.succeeded", "order-1"));
        store.mark_processed("payment.succeeded", "order-1", Duration::from_secs(60));
        assert!(store.is_processed("payment.succeeded", "order-1"));
    }

    #[test]
    fn expired_marker_is_treated_as_not_processed() {
        let store = MemoryIdempotency::new();
        store.mark_processed("payment.succeeded", "order-1", Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!store.is_processed("payment.succeeded", "order-1"));
        // And a fresh mark after expiry must succeed again.
        assert!(store.mark_processed("payment.succeeded", "order-1", Duration::from_secs(60)));
    }

    #[test]
    fn distinct_event_types_are_independent() {
        let store = MemoryIdempotency::new();
        store.mark_processed("payment.succeeded", "order-1", Duration::from_secs(60));
        assert!(!store.is_processed("payment.failed", "order-1"));
    }

    #[tokio::test]
    async fn sweeper_removes_expired_entries() {
        let store = MemoryIdempotency::new();
        store.mark_processed("payment.succeeded", "order-1", Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.sweep_expired();
        assert_eq!(store.entries.len(), 0);
    }
}
