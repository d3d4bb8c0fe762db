//! Bounded key-value cache with LRU replacement, optional entry
//! lifetime, and two value-retention modes.
//!
//! Strong retention keeps values until they expire or are evicted.
//! Evictable retention additionally lets the host drop values under
//! memory pressure through a [`MemoryPressure`] handle; an emptied
//! entry is detected and evicted on its next access. All public
//! operations are atomic behind one coarse lock.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Key-value cache with LRU replacement and optional entry lifetime.
pub trait Cache<K, V>: Send + Sync {
    /// Number of currently valid entries. Reaps expired and reclaimed
    /// entries eagerly.
    fn size(&self) -> usize;

    /// Remove every entry.
    fn clear(&self);

    /// Insert an entry, evicting the least recently used one when the
    /// cache is over capacity. The configured lifetime is applied at
    /// insertion.
    fn put(&self, key: K, value: V);

    /// Look up an entry, promoting it to most recently used. Expired or
    /// reclaimed entries are evicted and reported as absent.
    fn get(&self, key: &K) -> Option<Arc<V>>;

    /// Remove one entry.
    fn remove(&self, key: &K);

    /// Change the maximum size; 0 means unbounded. Shrinking evicts
    /// least-recently-used entries until the cache fits.
    fn set_capacity(&self, capacity: usize);

    /// Lifetime in seconds applied to entries inserted after this call;
    /// 0 disables expiry for new entries.
    fn set_timeout(&self, seconds: u64);

    /// Visit every valid entry, least recently used first. The visitor
    /// must not reenter the cache.
    fn for_each(&self, visitor: &mut dyn FnMut(&K, &V));
}

/// Cache that stores nothing.
pub struct NullCache;

impl<K, V> Cache<K, V> for NullCache {
    fn size(&self) -> usize {
        0
    }
    fn clear(&self) {}
    fn put(&self, _key: K, _value: V) {}
    fn get(&self, _key: &K) -> Option<Arc<V>> {
        None
    }
    fn remove(&self, _key: &K) {}
    fn set_capacity(&self, _capacity: usize) {}
    fn set_timeout(&self, _seconds: u64) {}
    fn for_each(&self, _visitor: &mut dyn FnMut(&K, &V)) {}
}

struct Entry<V> {
    /// None once reclaimed under memory pressure.
    value: Option<Arc<V>>,
    expires_at: Option<Instant>,
    last_access: u64,
}

impl<V> Entry<V> {
    fn is_valid(&self, now: Instant) -> bool {
        self.value.is_some() && self.expires_at.map_or(true, |t| now <= t)
    }
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// 0 = unbounded.
    capacity: usize,
    lifetime: Option<Duration>,
    /// Monotonic access counter ordering entries for LRU decisions.
    tick: u64,
    /// Evictable retention: values may be dropped under pressure.
    evictable: bool,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Drop entries whose values were reclaimed under pressure.
    fn reap_reclaimed(&mut self) {
        self.entries.retain(|_, e| e.value.is_some());
    }

    /// Drop reclaimed and expired entries.
    fn expunge(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, e| e.is_valid(now));
    }

    /// Evict least-recently-used entries until at most `target` remain.
    fn evict_lru_to(&mut self, target: usize) {
        while self.entries.len() > target {
            let Some(key) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            self.entries.remove(&key);
        }
    }
}

/// In-memory cache with LRU replacement.
pub struct MemoryCache<K, V> {
    inner: Arc<Mutex<Inner<K, V>>>,
}

/// Memory-pressure hook for an evictable cache.
///
/// Stands in for runtime-driven soft references: the host wires this to
/// its memory-pressure signal and calls [`MemoryPressure::reclaim`] to
/// drop cached values. The cache evicts the emptied entries on their
/// next access.
pub struct MemoryPressure<K, V> {
    inner: Arc<Mutex<Inner<K, V>>>,
}

impl<K: Eq + Hash + Clone, V> MemoryPressure<K, V> {
    /// Drop the values of the `count` least recently used live entries.
    /// No-op on a strong-retention cache.
    pub fn reclaim(&self, count: usize) {
        let mut inner = lock(&self.inner);
        if !inner.evictable {
            return;
        }
        let mut keys: Vec<(u64, K)> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.value.is_some())
            .map(|(k, e)| (e.last_access, k.clone()))
            .collect();
        keys.sort_unstable_by_key(|(tick, _)| *tick);
        for (_, key) in keys.into_iter().take(count) {
            if let Some(entry) = inner.entries.get_mut(&key) {
                entry.value = None;
            }
        }
    }
}

fn lock<K, V>(inner: &Arc<Mutex<Inner<K, V>>>) -> MutexGuard<'_, Inner<K, V>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K: Eq + Hash + Clone, V> MemoryCache<K, V> {
    /// Strong-retention cache with the given maximum size (0 =
    /// unbounded) and no entry lifetime.
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, None, false)
    }

    /// Strong-retention cache whose entries expire `lifetime` after
    /// insertion.
    pub fn with_lifetime(capacity: usize, lifetime: Duration) -> Self {
        Self::build(capacity, Some(lifetime), false)
    }

    /// Evictable-retention cache: cached values may additionally be
    /// dropped through the [`MemoryPressure`] handle.
    pub fn evictable(capacity: usize) -> Self {
        Self::build(capacity, None, true)
    }

    fn build(capacity: usize, lifetime: Option<Duration>, evictable: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                capacity,
                lifetime,
                tick: 0,
                evictable,
            })),
        }
    }

    /// A handle that can reclaim values under memory pressure.
    pub fn pressure_handle(&self) -> MemoryPressure<K, V> {
        MemoryPressure {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Cache<K, V> for MemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send,
    V: Send + Sync,
{
    fn size(&self) -> usize {
        let mut inner = lock(&self.inner);
        inner.expunge();
        inner.entries.len()
    }

    fn clear(&self) {
        lock(&self.inner).entries.clear();
    }

    fn put(&self, key: K, value: V) {
        let mut inner = lock(&self.inner);
        inner.reap_reclaimed();
        let expires_at = inner.lifetime.map(|lt| Instant::now() + lt);
        let tick = inner.next_tick();
        inner.entries.insert(
            key,
            Entry {
                value: Some(Arc::new(value)),
                expires_at,
                last_access: tick,
            },
        );
        if inner.capacity > 0 && inner.entries.len() > inner.capacity {
            inner.expunge();
            if inner.entries.len() > inner.capacity {
                let target = inner.capacity;
                inner.evict_lru_to(target);
            }
        }
    }

    fn get(&self, key: &K) -> Option<Arc<V>> {
        let mut inner = lock(&self.inner);
        inner.reap_reclaimed();
        let now = Instant::now();
        let valid = inner.entries.get(key).map(|e| e.is_valid(now));
        match valid {
            Some(true) => {
                let tick = inner.next_tick();
                let entry = inner.entries.get_mut(key)?;
                entry.last_access = tick;
                entry.value.clone()
            }
            Some(false) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn remove(&self, key: &K) {
        let mut inner = lock(&self.inner);
        inner.reap_reclaimed();
        inner.entries.remove(key);
    }

    fn set_capacity(&self, capacity: usize) {
        let mut inner = lock(&self.inner);
        inner.expunge();
        if capacity > 0 {
            inner.evict_lru_to(capacity);
        }
        inner.capacity = capacity;
    }

    fn set_timeout(&self, seconds: u64) {
        let mut inner = lock(&self.inner);
        inner.reap_reclaimed();
        inner.lifetime = if seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(seconds))
        };
    }

    fn for_each(&self, visitor: &mut dyn FnMut(&K, &V)) {
        let mut inner = lock(&self.inner);
        inner.expunge();
        let mut items: Vec<(&K, &Entry<V>)> = inner.entries.iter().collect();
        items.sort_unstable_by_key(|(_, e)| e.last_access);
        for (key, entry) in items {
            if let Some(value) = entry.value.as_deref() {
                visitor(key, value);
            }
        }
    }
}
