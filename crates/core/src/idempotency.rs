//! Exactly-once handling of external events.
//!
//! Messaging channels redeliver webhooks and users double-tap buttons. Each external event id
//! is accepted once within the configured window; later deliveries are dropped before they
//! reach the orchestrator.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct EventGuard {
    ttl: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl EventGuard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record `event_id`. Returns `false` if it was already seen within the window.
    pub fn try_claim(&self, event_id: &str) -> bool {
        self.try_claim_at(event_id, Instant::now())
    }

    fn try_claim_at(&self, event_id: &str, now: Instant) -> bool {
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.retain(|_, at| now.saturating_duration_since(*at) < self.ttl);

        if seen.contains_key(event_id) {
            tracing::info!("duplicate event {} dropped", event_id);
            return false;
        }
        seen.insert(event_id.to_string(), now);
        true
    }

    /// Events currently inside the window.
    pub fn len(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn second_delivery_is_rejected() {
        let guard = EventGuard::new(Duration::from_secs(60));
        assert!(guard.try_claim("msg-1"));
        assert!(!guard.try_claim("msg-1"));
        assert!(guard.try_claim("msg-2"));
    }

    #[test]
    fn window_expires() {
        let guard = EventGuard::new(Duration::from_secs(60));
        let start = Instant::now();
        assert!(guard.try_claim_at("msg-1", start));
        assert!(!guard.try_claim_at("msg-1", start + Duration::from_secs(59)));
        assert!(guard.try_claim_at("msg-1", start + Duration::from_secs(61)));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn concurrent_deliveries_admit_exactly_one() {
        let guard = Arc::new(EventGuard::new(Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || guard.try_claim("callback-42"))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }
}
