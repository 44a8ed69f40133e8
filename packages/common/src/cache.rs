use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Read-through cache whose entries can be dropped when the source changes.
///
/// Loads that race with an invalidation are returned to their caller but never
/// left in the map, so a stale value cannot outlive the invalidation that
/// should have removed it.
pub struct InvalidatingCache<K, V> {
    entries: DashMap<K, Arc<V>>,
    generation: AtomicU64,
}

impl<K, V> Default for InvalidatingCache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> InvalidatingCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub async fn get_or_try_load<F, Fut, E>(&self, key: K, load: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        let started = self.generation.load(Ordering::SeqCst);
        let value = Arc::new(load().await?);

        if self.generation.load(Ordering::SeqCst) == started {
            self.entries.insert(key.clone(), Arc::clone(&value));
            if self.generation.load(Ordering::SeqCst) != started {
                self.entries.remove(&key);
            }
        }
        Ok(value)
    }

    pub fn invalidate(&self, key: &K) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.remove(key);
    }

    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
        tracing::debug!("Cache invalidated");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
