//! TTL dedup cache shared by the enrichers.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Remembers when each key was last fetched. A key is fresh until its TTL
/// elapses; stale entries are purged lazily, at most once per TTL period.
#[derive(Debug)]
pub struct ExpireMap {
    ttl: Duration,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    entries: FxHashMap<i64, Instant>,
    last_purge: Instant,
}

impl ExpireMap {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(Inner {
                entries: FxHashMap::default(),
                last_purge: Instant::now(),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Present and inserted less than one TTL ago.
    pub fn fresh(&self, key: i64) -> bool {
        let inner = self.inner.lock();
        inner
            .entries
            .get(&key)
            .map_or(false, |at| at.elapsed() < self.ttl)
    }

    pub fn insert(&self, key: i64) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.entries.insert(key, now);
        self.purge(&mut inner, now);
    }

    /// Atomically marks a stale or missing key as fetched now. Returns `false`
    /// when the key is still fresh, in which case nothing changes.
    pub fn claim(&self, key: i64) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        if let Some(at) = inner.entries.get(&key) {
            if now.duration_since(*at) < self.ttl {
                return false;
            }
        }
        inner.entries.insert(key, now);
        self.purge(&mut inner, now);
        true
    }

    pub fn remove(&self, key: i64) {
        self.inner.lock().entries.remove(&key);
    }

    /// Entries currently held, stale ones included.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge(&self, inner: &mut Inner, now: Instant) {
        if now.duration_since(inner.last_purge) < self.ttl {
            return;
        }
        let ttl = self.ttl;
        inner.entries.retain(|_, at| now.duration_since(*at) < ttl);
        inner.last_purge = now;
    }
}
