//! Process-local, TTL-bound, tag-invalidated key/value cache.
//!
//! The cache is advisory: it accelerates record and image-key lookups but is
//! never the source of truth, and any value found in the record store wins on
//! a miss. Entries carry tags (e.g. `owner:42`, `record:<id>`) so everything
//! related to one owner or record can be dropped together after a mutation
//! without tracking individual keys.
//!
//! Expiry happens lazily on `get` and eagerly via a background sweep task so
//! worst-case memory growth stays bounded regardless of access pattern.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    written_at: Instant,
    ttl: Duration,
    tags: Vec<String>,
}

impl<V> Entry<V> {
    fn expired_at(&self, now: Instant) -> bool {
        now.duration_since(self.written_at) > self.ttl
    }
}

/// A TTL cache holding values of one type.
///
/// Two instances exist in the process: records by id (short TTL, counters
/// go stale on every scan) and image keys by id (long TTL, keys are stable).
pub struct TtlCache<V> {
    name: &'static str,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone + Send + 'static> TtlCache<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up `key`, treating an entry past its TTL as absent and lazily
    /// removing it.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if entry.expired_at(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    pub fn set(&self, key: &str, value: V, ttl: Duration, tags: Vec<String>) {
        let entry = Entry {
            value,
            written_at: Instant::now(),
            ttl,
            tags,
        };
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(key.to_string(), entry);
    }

    pub fn delete(&self, key: &str) {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .remove(key);
    }

    /// Remove every entry whose tag set intersects `tags`, returning how
    /// many were dropped.
    pub fn invalidate_by_tags(&self, tags: &[String]) -> usize {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| !entry.tags.iter().any(|tag| tags.contains(tag)));
        before - entries.len()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.expired_at(now));
        before - entries.len()
    }

    /// Spawn a background task sweeping expired entries on `every`,
    /// independent of access pattern.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()>
    where
        V: Sync,
    {
        let cache = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let swept = cache.sweep();
                if swept > 0 {
                    tracing::debug!(cache = cache.name, swept, "swept expired entries");
                }
            }
        })
    }
}

/// Tag applied to every cache entry belonging to one owner.
pub fn owner_tag(owner_id: &str) -> String {
    format!("owner:{owner_id}")
}

/// Tag applied to every cache entry derived from one record.
pub fn record_tag(id: &str) -> String {
    format!("record:{id}")
}
