//! Canonicalizing pools for immutable values.
//!
//! A pool maps a key to the single live instance built from it. Two flavors
//! exist:
//!
//! - [`WeakInterner`] holds its instances weakly. An instance is reclaimed as
//!   soon as the last holder drops it and a later lookup builds a fresh one.
//! - [`StrongInterner`] never releases an instance. It is meant for small
//!   closed vocabularies like field names.
//!
//! Both build an instance at most once per distinct live key, even when many
//! threads race on the same key. The constructor runs under the lock of the
//! key's shard, so it must not intern into the same pool. A panicking
//! constructor unwinds to the caller of `intern` and leaves the pool without
//! an entry for the key.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::config;

/// Common contract of both pool flavors.
pub trait Interner<K, V> {
    /// Returns the canonical instance for `key`, building it on a miss.
    fn intern<Q>(&self, key: &Q) -> Arc<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized;

    /// Number of entries currently held, reclaimed ones included.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pool holding its instances weakly.
pub struct WeakInterner<K, V> {
    entries: DashMap<K, Weak<V>>,
    create: fn(&K) -> V,
    misses: AtomicUsize,
}

impl<K: Hash + Eq, V> WeakInterner<K, V> {
    pub fn new(create: fn(&K) -> V) -> Self {
        Self {
            entries: DashMap::new(),
            create,
            misses: AtomicUsize::new(0),
        }
    }

    /// Removes entries whose instance was reclaimed.
    pub fn sweep(&self) {
        let before = self.entries.len();
        self.entries.retain(|_, value| value.strong_count() > 0);
        let remaining = self.entries.len();
        tracing::trace!(
            removed = before.saturating_sub(remaining),
            remaining,
            "swept weak intern pool"
        );
    }

    /// Number of entries whose instance is still alive.
    pub fn live_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    fn record_miss(&self) {
        let misses = self.misses.fetch_add(1, Ordering::Relaxed) + 1;
        if misses % config().pool_sweep_interval.max(1) == 0 {
            self.sweep();
        }
    }
}

impl<K: Hash + Eq, V> Interner<K, V> for WeakInterner<K, V> {
    fn intern<Q>(&self, key: &Q) -> Arc<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        if let Some(entry) = self.entries.get(key) {
            if let Some(value) = entry.value().upgrade() {
                return value;
            }
        }

        self.record_miss();

        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if let Some(value) = occupied.get().upgrade() {
                    return value;
                }
                let value = Arc::new((self.create)(occupied.key()));
                occupied.insert(Arc::downgrade(&value));
                value
            }
            Entry::Vacant(vacant) => {
                let value = Arc::new((self.create)(vacant.key()));
                vacant.insert(Arc::downgrade(&value));
                value
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Pool that keeps every instance alive for the rest of the process.
pub struct StrongInterner<K, V> {
    entries: DashMap<K, Arc<V>>,
    create: fn(&K) -> V,
}

impl<K: Hash + Eq, V> StrongInterner<K, V> {
    pub fn new(create: fn(&K) -> V) -> Self {
        Self {
            entries: DashMap::new(),
            create,
        }
    }
}

impl<K: Hash + Eq, V> Interner<K, V> for StrongInterner<K, V> {
    fn intern<Q>(&self, key: &Q) -> Arc<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        if let Some(entry) = self.entries.get(key) {
            return Arc::clone(entry.value());
        }

        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(occupied) => Arc::clone(occupied.get()),
            Entry::Vacant(vacant) => {
                let value = Arc::new((self.create)(vacant.key()));
                vacant.insert(Arc::clone(&value));
                value
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static BUILDS: AtomicUsize = AtomicUsize::new(0);

    fn build(key: &String) -> String {
        BUILDS.fetch_add(1, Ordering::SeqCst);
        key.to_uppercase()
    }

    #[test]
    fn test_weak_intern_returns_same_instance() {
        let pool: WeakInterner<String, String> = WeakInterner::new(|k| k.clone());
        let a = pool.intern("kg");
        let b = pool.intern("kg");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_weak_intern_reclaims_dropped_instances() {
        let pool: WeakInterner<String, String> = WeakInterner::new(|k| k.clone());
        let a = pool.intern("wk");
        assert_eq!(pool.live_count(), 1);
        drop(a);
        assert_eq!(pool.live_count(), 0);

        pool.sweep();
        assert_eq!(pool.len(), 0);

        let b = pool.intern("wk");
        assert_eq!(*b, "wk");
    }

    #[test]
    fn test_strong_intern_builds_once() {
        let pool: StrongInterner<String, String> = StrongInterner::new(build);
        let before = BUILDS.load(Ordering::SeqCst);
        let a = pool.intern("unit");
        let b = pool.intern("unit");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*a, "UNIT");
        assert_eq!(BUILDS.load(Ordering::SeqCst) - before, 1);
    }

    #[test]
    fn test_panicking_constructor_leaves_pool_usable() {
        fn fail_on_empty(key: &String) -> String {
            if key.is_empty() {
                panic!("empty key");
            }
            key.clone()
        }

        let pool: WeakInterner<String, String> = WeakInterner::new(fail_on_empty);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| pool.intern("")));
        assert!(result.is_err());
        assert_eq!(pool.len(), 0);

        let value = pool.intern("a");
        assert_eq!(*value, "a");
    }
}
