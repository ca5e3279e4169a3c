//! Keyed entity collections injected into the aggregator.
//!
//! The aggregator only needs two capabilities from a collection: look a
//! record up by exact key, and write a record back. [`Repository`] captures
//! exactly that. [`MemoryRepository`] is the in-process implementation used
//! as the hot working set; it also remembers which keys were written since
//! the last drain so the pipeline can flush only what changed.

use std::collections::{BTreeMap, BTreeSet};

/// Get/put access to one keyed entity collection.
pub trait Repository<K, V> {
    /// Return a copy of the record stored at `key`, if any.
    fn get(&self, key: &K) -> Option<V>;

    /// Store `value` at `key`, replacing any previous record.
    fn put(&mut self, key: K, value: V);
}

/// Fetch the record at `key`, or build a fresh one with `default`.
///
/// The returned record is detached: mutate it and [`Repository::put`] it
/// back to persist the change.
pub fn get_or_create<K, V, R>(repo: &R, key: &K, default: impl FnOnce(&K) -> V) -> V
where
    R: Repository<K, V> + ?Sized,
{
    repo.get(key).unwrap_or_else(|| default(key))
}

/// `BTreeMap`-backed repository with dirty-key tracking.
#[derive(Debug, Clone)]
pub struct MemoryRepository<K, V> {
    records: BTreeMap<K, V>,
    dirty: BTreeSet<K>,
}

impl<K: Ord, V> Default for MemoryRepository<K, V> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }
}

impl<K: Ord + Clone, V: Clone> MemoryRepository<K, V> {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Borrow the record at `key` without cloning.
    pub fn get_ref(&self, key: &K) -> Option<&V> {
        self.records.get(key)
    }

    /// Iterate over `(key, record)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.records.iter()
    }

    /// Iterate over records in key order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.records.values()
    }

    /// Insert a record without marking it dirty (used when hydrating from
    /// storage). Returns the displaced record, if any.
    pub fn load(&mut self, key: K, value: V) -> Option<V> {
        self.records.insert(key, value)
    }

    /// Number of keys written since the last drain.
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Take the current value of every key written since the last drain.
    pub fn drain_dirty(&mut self) -> Vec<(K, V)> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .filter_map(|key| self.records.get(&key).cloned().map(|value| (key, value)))
            .collect()
    }

    /// Mark keys dirty again, e.g. after a failed flush.
    pub fn mark_dirty(&mut self, keys: impl IntoIterator<Item = K>) {
        for key in keys {
            if self.records.contains_key(&key) {
                self.dirty.insert(key);
            }
        }
    }
}

impl<K: Ord + Clone, V: Clone> Repository<K, V> for MemoryRepository<K, V> {
    fn get(&self, key: &K) -> Option<V> {
        self.records.get(key).cloned()
    }

    fn put(&mut self, key: K, value: V) {
        self.dirty.insert(key.clone());
        self.records.insert(key, value);
    }
}
