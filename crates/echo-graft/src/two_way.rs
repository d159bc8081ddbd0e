// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Bidirectional and insertion-ordered maps.
use std::hash::Hash;

use rustc_hash::FxHashMap;

/// One-to-one map with reverse lookup.
///
/// Inserting a pair evicts any existing pair that shares either the key or the
/// value, so both directions stay functional.
#[derive(Debug, Clone)]
pub struct TwoWayMap<K, V> {
    forward: FxHashMap<K, V>,
    backward: FxHashMap<V, K>,
}

impl<K, V> Default for TwoWayMap<K, V> {
    fn default() -> Self {
        Self {
            forward: FxHashMap::default(),
            backward: FxHashMap::default(),
        }
    }
}

impl<K, V> TwoWayMap<K, V>
where
    K: Copy + Eq + Hash,
    V: Copy + Eq + Hash,
{
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `key ↔ value`; returns the value previously bound to `key`.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        if let Some(old_key) = self.backward.remove(&value) {
            self.forward.remove(&old_key);
        }
        let old = self.forward.insert(key, value);
        if let Some(old_value) = old {
            if old_value != value {
                self.backward.remove(&old_value);
            }
        }
        self.backward.insert(value, key);
        old
    }

    /// Value bound to `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.forward.get(key).copied()
    }

    /// Key bound to `value`.
    pub fn get_key(&self, value: &V) -> Option<K> {
        self.backward.get(value).copied()
    }

    /// True when `key` is bound.
    pub fn contains_key(&self, key: &K) -> bool {
        self.forward.contains_key(key)
    }

    /// True when `value` is bound.
    pub fn contains_value(&self, value: &V) -> bool {
        self.backward.contains_key(value)
    }

    /// Removes the pair keyed by `key`; returns its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.forward.remove(key)?;
        self.backward.remove(&value);
        Some(value)
    }

    /// Removes the pair whose value is `value`; returns its key.
    pub fn remove_value(&mut self, value: &V) -> Option<K> {
        let key = self.backward.remove(value)?;
        self.forward.remove(&key);
        Some(key)
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.forward.iter().map(|(k, v)| (*k, *v))
    }
}

/// Map that remembers insertion order.
///
/// Re-inserting an existing key updates the value in place without moving it.
#[derive(Debug, Clone)]
pub struct SequentialMap<K, V> {
    entries: Vec<(K, V)>,
    index: FxHashMap<K, usize>,
}

// The index is derived from `entries`; equality is order-sensitive.
impl<K: PartialEq, V: PartialEq> PartialEq for SequentialMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K: Eq, V: Eq> Eq for SequentialMap<K, V> {}

impl<K, V> Default for SequentialMap<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }
}

impl<K, V> SequentialMap<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates; returns the previous value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&i) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.entries[i].1, value));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        None
    }

    /// Value for `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    /// True when `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Removes the most recently inserted entry.
    pub fn pop(&mut self) -> Option<(K, V)> {
        let (k, v) = self.entries.pop()?;
        self.index.remove(&k);
        Some((k, v))
    }

    /// Drops entries beyond the first `len`.
    pub fn truncate(&mut self, len: usize) {
        while self.entries.len() > len {
            self.pop();
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_evicts_conflicting_pairs() {
        let mut m: TwoWayMap<u32, u32> = TwoWayMap::new();
        m.put(1, 10);
        m.put(2, 20);
        m.put(1, 20);
        assert_eq!(m.get(&1), Some(20));
        assert_eq!(m.get(&2), None);
        assert_eq!(m.get_key(&10), None);
        assert_eq!(m.get_key(&20), Some(1));
        assert_eq!(m.len(), 1);
        assert_eq!(m.remove_value(&20), Some(1));
        assert!(m.is_empty());
    }

    #[test]
    fn sequential_map_keeps_first_insertion_slot() {
        let mut m = SequentialMap::new();
        m.insert("b", 1);
        m.insert("a", 2);
        m.insert("b", 3);
        let keys: Vec<_> = m.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(m.get(&"b"), Some(&3));
        m.truncate(1);
        assert!(!m.contains_key(&"a"));
    }

    #[test]
    fn sequential_maps_compare_by_entries_in_order() {
        let mut ab = SequentialMap::new();
        ab.insert("a", 1);
        ab.insert("b", 2);
        let mut ba = SequentialMap::new();
        ba.insert("b", 2);
        ba.insert("a", 1);
        assert_ne!(ab, ba);
        ba.truncate(0);
        ba.insert("a", 1);
        ba.insert("b", 2);
        assert_eq!(ab, ba);
    }
}
