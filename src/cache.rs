use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, MutexGuard};

/// A small TTL cache keyed by the caller's canonical string key.
///
/// Used by the remote classifier (to suppress duplicate classification
/// calls) and the email hub (to avoid re-issuing identical queries).
/// Entries older than the freshness window are treated as absent and
/// pruned lazily on access.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.lock().await.fresh(key)
    }

    pub async fn insert(&self, key: String, value: V) {
        self.lock().await.store(key, value);
    }

    /// Take the cache lock for an atomic check-then-insert. Holding the
    /// guard across the fill call gives single-flight semantics: concurrent
    /// callers with the same key wait instead of racing duplicate requests.
    pub async fn lock(&self) -> TtlCacheGuard<'_, V> {
        TtlCacheGuard {
            ttl: self.ttl,
            entries: self.entries.lock().await,
        }
    }
}

pub struct TtlCacheGuard<'a, V> {
    ttl: Duration,
    entries: MutexGuard<'a, HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCacheGuard<'_, V> {
    pub fn fresh(&mut self, key: &str) -> Option<V> {
        match self.entries.get(key) {
            Some((at, value)) if at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn store(&mut self, key: String, value: V) {
        self.entries.insert(key, (Instant::now(), value));
    }
}
