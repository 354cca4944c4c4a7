//! Bounded, insertion-ordered history stores
//!
//! Every kind of captured state (request states, tracebacks, live frames)
//! lives in a `BoundedHistory`: a fixed-capacity map that remembers insertion
//! order and evicts the oldest entry once full. Overwriting an existing key
//! keeps its original position.
//!
//! Stores are shared between concurrently running requests. Inserts take the
//! write side of an `RwLock`; readers take short read guards and get back
//! `Arc` snapshots, so no guard outlives the call.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Fixed-capacity key→value store with FIFO eviction
pub struct BoundedHistory<K, V> {
    capacity: usize,
    inner: RwLock<Inner<K, V>>,
}

struct Inner<K, V> {
    /// Keys, oldest first
    order: VecDeque<K>,
    entries: HashMap<K, Arc<V>>,
}

impl<K, V> BoundedHistory<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a history holding at most `capacity` entries
    ///
    /// # Panics
    /// If `capacity` is zero. Configuration clamps user values before they get here.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be greater than zero");
        Self {
            capacity,
            inner: RwLock::new(Inner {
                order: VecDeque::with_capacity(capacity),
                entries: HashMap::with_capacity(capacity),
            }),
        }
    }

    /// Insert or overwrite `key`
    ///
    /// A new key evicts the oldest entry when the store is full and returns it.
    /// Overwriting an existing key replaces the value in place.
    pub fn insert(&self, key: K, value: V) -> Option<(K, Arc<V>)> {
        self.insert_arc(key, Arc::new(value))
    }

    /// Insert an already shared value (see [`insert`](Self::insert))
    pub fn insert_arc(&self, key: K, value: Arc<V>) -> Option<(K, Arc<V>)> {
        let mut inner = self.write();

        if let Some(slot) = inner.entries.get_mut(&key) {
            *slot = value;
            return None;
        }

        let evicted = if inner.order.len() >= self.capacity {
            inner
                .order
                .pop_front()
                .and_then(|old| inner.entries.remove(&old).map(|v| (old, v)))
        } else {
            None
        };

        inner.order.push_back(key.clone());
        inner.entries.insert(key, value);
        evicted
    }

    /// Look up a value by key
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.read().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.read().entries.contains_key(key)
    }

    /// Key of the most recently inserted entry
    pub fn last_key(&self) -> Option<K> {
        self.read().order.back().cloned()
    }

    /// Snapshot of all entries, newest first
    ///
    /// The snapshot reflects the store at call time; inserts made while the
    /// caller iterates are not visible.
    pub fn iter_newest_first(&self) -> std::vec::IntoIter<(K, Arc<V>)> {
        let inner = self.read();
        let snapshot: Vec<(K, Arc<V>)> = inner
            .order
            .iter()
            .rev()
            .filter_map(|k| inner.entries.get(k).map(|v| (k.clone(), v.clone())))
            .collect();
        snapshot.into_iter()
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panicking writer can only leave a fully applied or untouched insert behind,
    // so a poisoned lock is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, Inner<K, V>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<K, V>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> std::fmt::Debug for BoundedHistory<K, V>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedHistory")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
