//! Process-local, TTL-based cache of resolved bindings, keyed by full moniker URI.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::clock::{Clock, MonotonicClock};
use crate::models::ResolvedSource;

struct Entry {
    source: ResolvedSource,
    inserted_at_millis: u64,
}

/// Concurrent-safe cache of [`ResolvedSource`] bindings. A TTL of zero disables caching: every
/// lookup misses and every insert is a no-op.
pub struct ResolutionCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ResolutionCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl, clock: Arc::new(MonotonicClock::default()) }
    }

    #[cfg(test)]
    fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { entries: DashMap::new(), ttl, clock }
    }

    /// Return the live cached binding for `uri`, if any.
    pub fn get(&self, uri: &str) -> Option<ResolvedSource> {
        if self.ttl.is_zero() {
            return None;
        }
        let entry = self.entries.get(uri)?;
        let now = self.clock.now_millis();
        let age = now.saturating_sub(entry.inserted_at_millis);
        if age < self.ttl.as_millis() as u64 {
            Some(entry.source.clone())
        } else {
            drop(entry);
            self.entries.remove(uri);
            None
        }
    }

    /// Record a successful resolution. No-op when the TTL is zero.
    pub fn insert(&self, uri: String, source: ResolvedSource) {
        if self.ttl.is_zero() {
            return;
        }
        let inserted_at_millis = self.clock.now_millis();
        self.entries.insert(uri, Entry { source, inserted_at_millis });
    }

    /// Drop every cached entry.
    pub fn flush(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug)]
    struct FakeClock(AtomicU64);
    impl Clock for FakeClock {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn stub_source(path: &str) -> ResolvedSource {
        use crate::models::{Ownership, SourceType};
        use std::collections::HashMap;
        ResolvedSource {
            moniker: format!("moniker://{path}"),
            path: path.to_string(),
            source_type: SourceType::Http,
            connection: HashMap::new(),
            query: None,
            params: HashMap::new(),
            schema: None,
            read_only: true,
            ownership: Ownership::default(),
            binding_path: path.to_string(),
            sub_path: String::new(),
            status: None,
            deprecation_message: None,
            successor: None,
            sunset_date: None,
            migration_guide: None,
            redirected_from: None,
        }
    }

    #[test]
    fn zero_ttl_disables_caching() {
        let cache = ResolutionCache::new(Duration::ZERO);
        cache.insert("moniker://a/b".to_string(), stub_source("a/b"));
        assert!(cache.get("moniker://a/b").is_none());
    }

    #[test]
    fn hit_within_ttl_then_miss_after_expiry() {
        let clock = Arc::new(FakeClock(AtomicU64::new(0)));
        let clock_ref = Arc::clone(&clock);
        let cache = ResolutionCache::with_clock(Duration::from_secs(10), clock);
        cache.insert("moniker://a/b".to_string(), stub_source("a/b"));
        assert!(cache.get("moniker://a/b").is_some());

        clock_ref.store(5_000, Ordering::SeqCst);
        assert!(cache.get("moniker://a/b").is_some());

        clock_ref.store(11_000, Ordering::SeqCst);
        assert!(cache.get("moniker://a/b").is_none());
    }

    #[test]
    fn flush_clears_all_entries() {
        let cache = ResolutionCache::new(Duration::from_secs(60));
        cache.insert("moniker://a".to_string(), stub_source("a"));
        cache.insert("moniker://b".to_string(), stub_source("b"));
        assert_eq!(cache.len(), 2);
        cache.flush();
        assert!(cache.is_empty());
    }
}
