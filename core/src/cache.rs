//! Memoized comic lookup.
//!
//! Records are keyed by `(id, host_address, info_path)`. Each key owns a slot
//! guarded by its own mutex, so concurrent lookups of one key share a single
//! upstream fetch while different keys proceed independently. Failed fetches
//! leave the slot empty and the next lookup tries again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use crate::client::ComicClient;
use crate::error::ApiError;
use crate::transport::Transport;
use crate::types::ComicRecord;

/// Size and age limits. The default keeps every record for the life of the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// Evict the oldest record once more than this many are stored.
    pub max_entries: Option<usize>,
    /// Refetch records older than this.
    pub ttl: Option<Duration>,
}

impl CachePolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub id: u32,
    pub host_address: String,
    pub info_path: String,
}

impl CacheKey {
    pub fn new(id: u32, client: &ComicClient) -> Self {
        Self {
            id,
            host_address: client.host_address().to_string(),
            info_path: client.info_path().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Cached {
    record: ComicRecord,
    stored_at: Instant,
    // Insertion order, used to pick the eviction victim.
    seq: u64,
}

type Slot = Arc<Mutex<Option<Cached>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
pub struct ComicCache {
    policy: CachePolicy,
    slots: DashMap<CacheKey, Slot>,
    hits: AtomicU64,
    misses: AtomicU64,
    inserted: AtomicU64,
}

impl ComicCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Return the cached record for `id`, fetching it through `transport` on a miss.
    pub fn get_comic(
        &self,
        transport: &dyn Transport,
        client: &ComicClient,
        id: u32,
    ) -> Result<ComicRecord, ApiError> {
        let key = CacheKey::new(id, client);
        // Clone the slot out so the shard lock is released before blocking on it.
        let slot: Slot = self.slots.entry(key.clone()).or_default().clone();
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(cached) = guard.as_ref() {
            if self.is_fresh(cached) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                log::debug!("cache hit for comic {id}");
                return Ok(cached.record.clone());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let record = match client.fetch_by_id(transport, id) {
            Ok(record) => record,
            Err(e) => {
                let empty = guard.is_none();
                drop(guard);
                if empty {
                    self.discard(&key, &slot);
                }
                return Err(e);
            }
        };
        *guard = Some(Cached {
            record: record.clone(),
            stored_at: Instant::now(),
            seq: self.inserted.fetch_add(1, Ordering::Relaxed),
        });
        drop(guard);

        self.enforce_capacity();
        Ok(record)
    }

    /// Number of stored records. Waits for slots that are being read or
    /// fetched, so a record in use is still counted.
    pub fn len(&self) -> usize {
        // Collect first: no shard lock may be held while waiting on a slot.
        let slots: Vec<Slot> = self.slots.iter().map(|entry| entry.value().clone()).collect();
        slots
            .iter()
            .filter(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    // Drop an empty slot after a failed fetch, unless another lookup is
    // waiting on it and will reuse it.
    fn discard(&self, key: &CacheKey, slot: &Slot) {
        self.slots
            .remove_if(key, |_, stored| Arc::ptr_eq(stored, slot) && Arc::strong_count(stored) == 2);
    }

    fn is_fresh(&self, cached: &Cached) -> bool {
        match self.policy.ttl {
            Some(ttl) => cached.stored_at.elapsed() < ttl,
            None => true,
        }
    }

    // Slots that are mid-fetch are skipped rather than waited on.
    fn enforce_capacity(&self) {
        let Some(max) = self.policy.max_entries else {
            return;
        };
        loop {
            let mut stored = 0usize;
            let mut oldest: Option<(CacheKey, u64)> = None;
            for entry in self.slots.iter() {
                let Ok(slot) = entry.value().try_lock() else {
                    continue;
                };
                if let Some(cached) = slot.as_ref() {
                    stored += 1;
                    if oldest.as_ref().map_or(true, |(_, seq)| cached.seq < *seq) {
                        oldest = Some((entry.key().clone(), cached.seq));
                    }
                }
            }
            match oldest {
                Some((key, _)) if stored > max => {
                    log::debug!("evicting comic {} from cache", key.id);
                    self.slots.remove(&key);
                }
                _ => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::http::{HttpRequest, HttpResponse};

    /// Answers every id under 100 with a valid document, everything else with 404.
    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl Counting {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for Counting {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let id: u32 = request
                .url
                .trim_start_matches("http://stub/")
                .split('/')
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(u32::MAX);
            if id >= 100 {
                return Ok(HttpResponse::new(404, ""));
            }
            let body = format!(
                r#"{{"num":{id},"alt":"alt {id}","year":"2006","month":"1","day":"1","title":"Comic {id}","img":"http://stub/comics/{id}.png"}}"#
            );
            Ok(HttpResponse::new(200, body))
        }
    }

    fn client() -> ComicClient {
        ComicClient::new("http://stub/", "info.0.json")
    }

    #[test]
    fn second_lookup_is_served_from_cache() {
        let transport = Counting::default();
        let cache = ComicCache::default();

        let first = cache.get_comic(&transport, &client(), 5).unwrap();
        let second = cache.get_comic(&transport, &client(), 5).unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.calls(), 1);
        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 1,
                hits: 1,
                misses: 1
            }
        );
    }

    #[test]
    fn key_includes_host_and_info_path() {
        let transport = Counting::default();
        let cache = ComicCache::default();

        cache.get_comic(&transport, &client(), 5).unwrap();
        cache
            .get_comic(&transport, &ComicClient::new("http://stub/", "other.json"), 5)
            .unwrap();

        assert_eq!(transport.calls(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failures_are_not_cached() {
        let transport = Counting::default();
        let cache = ComicCache::default();

        assert!(cache.get_comic(&transport, &client(), 404).is_err());
        assert!(cache.get_comic(&transport, &client(), 404).is_err());

        assert_eq!(transport.calls(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn failed_lookups_leave_no_slots_behind() {
        let transport = Counting::default();
        let cache = ComicCache::new(CachePolicy {
            max_entries: Some(2),
            ttl: None,
        });

        for id in 100..1100 {
            assert!(cache.get_comic(&transport, &client(), id).is_err());
        }
        cache.get_comic(&transport, &client(), 1).unwrap();

        assert_eq!(cache.slots.len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn len_counts_records_in_use() {
        let transport = Counting::default();
        let cache = Arc::new(ComicCache::default());
        cache.get_comic(&transport, &client(), 3).unwrap();

        let slot = cache
            .slots
            .get(&CacheKey::new(3, &client()))
            .unwrap()
            .clone();
        let guard = slot.lock().unwrap();
        let counter = {
            let cache = cache.clone();
            std::thread::spawn(move || cache.len())
        };
        std::thread::sleep(Duration::from_millis(50));
        drop(guard);

        assert_eq!(counter.join().unwrap(), 1);
    }

    #[test]
    fn max_entries_evicts_oldest() {
        let transport = Counting::default();
        let cache = ComicCache::new(CachePolicy {
            max_entries: Some(2),
            ttl: None,
        });

        for id in [1, 2, 3] {
            cache.get_comic(&transport, &client(), id).unwrap();
        }
        assert_eq!(cache.len(), 2);

        // 1 was evicted, 3 is still stored.
        cache.get_comic(&transport, &client(), 3).unwrap();
        assert_eq!(transport.calls(), 3);
        cache.get_comic(&transport, &client(), 1).unwrap();
        assert_eq!(transport.calls(), 4);
    }

    #[test]
    fn expired_entries_are_refetched() {
        let transport = Counting::default();
        let cache = ComicCache::new(CachePolicy {
            max_entries: None,
            ttl: Some(Duration::ZERO),
        });

        cache.get_comic(&transport, &client(), 7).unwrap();
        cache.get_comic(&transport, &client(), 7).unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn concurrent_lookups_share_one_fetch() {
        let transport = Arc::new(Counting::default());
        let cache = Arc::new(ComicCache::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let transport = transport.clone();
                let cache = cache.clone();
                std::thread::spawn(move || cache.get_comic(&*transport, &client(), 9).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().id, "9");
        }
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn clear_forgets_everything() {
        let transport = Counting::default();
        let cache = ComicCache::default();
        cache.get_comic(&transport, &client(), 1).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        cache.get_comic(&transport, &client(), 1).unwrap();
        assert_eq!(transport.calls(), 2);
    }
}
