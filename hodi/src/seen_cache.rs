use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::metrics_consts::{CACHE_EVICTIONS, CACHE_EXPIRED};
use crate::time::TimeSource;
use crate::types::IdentifierClass;

/// Bounded, time-expiring membership set for one identifier class.
///
/// An entry records when its key was last inserted. It stops counting as
/// present once that insertion is older than the TTL, and the least recently
/// used entry is evicted when inserting beyond capacity, whatever its age.
/// Expiry is evaluated lazily on lookup, there is no background sweep.
pub struct SeenCache {
    class: IdentifierClass,
    entries: Mutex<LruCache<String, OffsetDateTime>>,
    ttl: time::Duration,
    time: Arc<dyn TimeSource + Send + Sync>,
}

impl SeenCache {
    pub fn new(
        class: IdentifierClass,
        capacity: NonZeroUsize,
        ttl: std::time::Duration,
        time: Arc<dyn TimeSource + Send + Sync>,
    ) -> Self {
        Self {
            class,
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX),
            time,
        }
    }

    /// True iff an unexpired entry exists. A hit bumps recency but not age.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.time.now();
        let mut entries = self.entries.lock();
        self.live(&mut entries, key, now)
    }

    /// Creates or refreshes the entry for `key`, evicting the LRU entry at capacity.
    pub fn insert(&self, key: String) {
        let now = self.time.now();
        let mut entries = self.entries.lock();
        self.push(&mut entries, key, now);
    }

    /// `contains` followed by `insert` under a single lock acquisition. Returns
    /// true when the key was absent (or expired) and has now been inserted, so
    /// racing observers of a new key see exactly one miss between them.
    pub fn check_and_insert(&self, key: &str) -> bool {
        let now = self.time.now();
        let mut entries = self.entries.lock();
        if self.live(&mut entries, key, now) {
            return false;
        }
        self.push(&mut entries, key.to_string(), now);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    fn live(
        &self,
        entries: &mut LruCache<String, OffsetDateTime>,
        key: &str,
        now: OffsetDateTime,
    ) -> bool {
        let Some(inserted_at) = entries.get(key).copied() else {
            return false;
        };
        if now - inserted_at > self.ttl {
            entries.pop(key);
            metrics::counter!(CACHE_EXPIRED, &[("class", self.class.as_str())]).increment(1);
            return false;
        }
        true
    }

    fn push(
        &self,
        entries: &mut LruCache<String, OffsetDateTime>,
        key: String,
        now: OffsetDateTime,
    ) {
        // push hands back the displaced pair, which is our own old entry on a refresh
        if let Some((evicted, _)) = entries.push(key.clone(), now) {
            if evicted != key {
                metrics::counter!(CACHE_EVICTIONS, &[("class", self.class.as_str())])
                    .increment(1);
            }
        }
    }
}

/// One independent cache per identifier class, sharing a single configuration.
pub struct ClassCaches {
    domain: SeenCache,
    ip: SeenCache,
    md5: SeenCache,
    email: SeenCache,
}

impl ClassCaches {
    pub fn new(
        capacity: NonZeroUsize,
        ttl: std::time::Duration,
        time: Arc<dyn TimeSource + Send + Sync>,
    ) -> Self {
        let cache = |class| SeenCache::new(class, capacity, ttl, time.clone());
        Self {
            domain: cache(IdentifierClass::Domain),
            ip: cache(IdentifierClass::Ip),
            md5: cache(IdentifierClass::Md5),
            email: cache(IdentifierClass::Email),
        }
    }

    pub fn for_class(&self, class: IdentifierClass) -> &SeenCache {
        match class {
            IdentifierClass::Domain => &self.domain,
            IdentifierClass::Ip => &self.ip,
            IdentifierClass::Md5 => &self.md5,
            IdentifierClass::Email => &self.email,
        }
    }

    pub fn len(&self) -> usize {
        IdentifierClass::ALL
            .iter()
            .map(|class| self.for_class(*class).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualTime;
    use std::time::Duration;
    use time::macros::datetime;

    fn cache_with_clock(capacity: usize, ttl_minutes: u64) -> (SeenCache, ManualTime) {
        let clock = ManualTime::new(datetime!(2024-03-01 10:00 UTC));
        let cache = SeenCache::new(
            IdentifierClass::Domain,
            NonZeroUsize::new(capacity).unwrap(),
            Duration::from_secs(ttl_minutes * 60),
            Arc::new(clock.clone()),
        );
        (cache, clock)
    }

    #[test]
    fn insert_then_contains() {
        let (cache, _) = cache_with_clock(10, 5);
        assert!(!cache.contains("example.com"));
        cache.insert("example.com".to_string());
        assert!(cache.contains("example.com"));
        assert!(!cache.contains("example.org"));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let (cache, clock) = cache_with_clock(10, 5);
        cache.insert("example.com".to_string());

        clock.advance(time::Duration::minutes(5));
        assert!(cache.contains("example.com"), "exactly at the ttl is still valid");

        clock.advance(time::Duration::seconds(1));
        assert!(!cache.contains("example.com"));
        // lazily removed on the failed lookup
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn hits_do_not_extend_the_window() {
        let (cache, clock) = cache_with_clock(10, 5);
        cache.insert("example.com".to_string());

        clock.advance(time::Duration::minutes(4));
        assert!(cache.contains("example.com"));

        clock.advance(time::Duration::minutes(2));
        assert!(!cache.contains("example.com"));
    }

    #[test]
    fn reinsert_refreshes_the_window() {
        let (cache, clock) = cache_with_clock(10, 5);
        cache.insert("example.com".to_string());
        clock.advance(time::Duration::minutes(4));
        cache.insert("example.com".to_string());
        clock.advance(time::Duration::minutes(4));
        assert!(cache.contains("example.com"));
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let (cache, _) = cache_with_clock(3, 5);
        for key in ["a", "b", "c"] {
            cache.insert(key.to_string());
        }
        // touch "a" so "b" becomes the LRU entry
        assert!(cache.contains("a"));

        cache.insert("d".to_string());

        assert!(!cache.contains("b"));
        assert!(cache.contains("a"));
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
        assert_eq!(cache.len(), cache.capacity());
    }

    #[test]
    fn check_and_insert_reports_misses_once() {
        let (cache, clock) = cache_with_clock(10, 5);
        assert!(cache.check_and_insert("1.2.3.4"));
        assert!(!cache.check_and_insert("1.2.3.4"));

        clock.advance(time::Duration::minutes(6));
        assert!(cache.check_and_insert("1.2.3.4"));
    }

    #[test]
    fn classes_do_not_share_entries() {
        let clock = ManualTime::new(datetime!(2024-03-01 10:00 UTC));
        let caches = ClassCaches::new(
            NonZeroUsize::new(10).unwrap(),
            Duration::from_secs(300),
            Arc::new(clock),
        );

        caches.for_class(IdentifierClass::Domain).insert("x".to_string());

        assert!(caches.for_class(IdentifierClass::Domain).contains("x"));
        assert!(!caches.for_class(IdentifierClass::Ip).contains("x"));
        assert!(!caches.for_class(IdentifierClass::Md5).contains("x"));
        assert!(!caches.for_class(IdentifierClass::Email).contains("x"));
        assert_eq!(caches.len(), 1);
    }
}
