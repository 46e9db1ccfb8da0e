//! Caching utilities for pathscout.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Simple in-memory LRU cache.
///
/// Recency is tracked in a plain vector, which is fine for the small
/// capacities pathscout uses (tens of roots, hundreds of queries).
#[derive(Debug, Clone)]
pub struct LruCache<K, V> {
    capacity: usize,
    items: HashMap<K, V>,
    order: Vec<K>,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// Creates a cache holding at most `capacity` items. A capacity of zero
    /// is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: HashMap::with_capacity(capacity),
            order: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the value for `key` and marks it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        if self.items.contains_key(key) {
            self.touch(key);
            self.items.get(key)
        } else {
            None
        }
    }

    /// Returns the value for `key` without affecting recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.items.get(key)
    }

    /// Mutable access that also marks the key most recently used.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        if self.items.contains_key(key) {
            self.touch(key);
            self.items.get_mut(key)
        } else {
            None
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.items.contains_key(key)
    }

    /// Inserts a value, returning the evicted least-recently-used entry if
    /// the cache was full.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        let mut evicted = None;
        if self.items.len() >= self.capacity
            && !self.items.contains_key(&key)
            && let Some(oldest) = self.order.first().cloned()
        {
            self.order.remove(0);
            evicted = self.items.remove(&oldest).map(|v| (oldest, v));
        }

        self.order.retain(|k| k != &key);
        self.order.push(key.clone());
        self.items.insert(key, value);
        evicted
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let value = self.items.remove(key)?;
        self.order.retain(|k| <K as Borrow<Q>>::borrow(k) != key);
        Some(value)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.order.clear();
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn touch<Q>(&mut self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        if let Some(pos) = self
            .order
            .iter()
            .position(|k| <K as Borrow<Q>>::borrow(k) == key)
        {
            let k = self.order.remove(pos);
            self.order.push(k);
        }
    }
}
