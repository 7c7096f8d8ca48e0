//! Min-heap of clients ordered by last activity
//!
//! The heap stores client keys together with their last-activity timestamp
//! and keeps a reverse index from key to heap slot, so that arbitrary entries
//! can be removed or re-keyed in O(log n) without scanning. The root is
//! always the least recently active client, which is the only candidate the
//! liveness monitor needs to look at.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

#[derive(Debug, Clone)]
struct HeapEntry<K> {
    key: K,
    last_active: Instant,
}

/// Array-backed binary min-heap with a position index
#[derive(Debug)]
pub struct ActivityHeap<K> {
    entries: Vec<HeapEntry<K>>,
    positions: HashMap<K, usize>,
    capacity: usize,
}

impl<K: Copy + Eq + Hash> ActivityHeap<K> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    /// Inserts a key with its activity timestamp
    ///
    /// Returns false without modifying the heap when it is already at
    /// capacity or already tracks the key.
    pub fn insert(&mut self, key: K, last_active: Instant) -> bool {
        if self.entries.len() >= self.capacity || self.positions.contains_key(&key) {
            return false;
        }

        let idx = self.entries.len();
        self.entries.push(HeapEntry { key, last_active });
        self.positions.insert(key, idx);
        self.sift_up(idx);
        true
    }

    /// Removes an arbitrary key, returning whether it was present
    pub fn remove(&mut self, key: &K) -> bool {
        let idx = match self.positions.get(key) {
            Some(&idx) => idx,
            None => return false,
        };

        let last = self.entries.len() - 1;
        if idx != last {
            self.swap(idx, last);
        }
        self.entries.pop();
        self.positions.remove(key);

        // The element moved into the hole may be out of order either way
        if idx < self.entries.len() {
            self.sift_down(idx);
            self.sift_up(idx);
        }
        true
    }

    /// Re-keys an entry after its activity timestamp changed
    pub fn update(&mut self, key: &K, last_active: Instant) -> bool {
        let idx = match self.positions.get(key) {
            Some(&idx) => idx,
            None => return false,
        };

        self.entries[idx].last_active = last_active;
        self.sift_down(idx);
        self.sift_up(idx);
        true
    }

    /// Returns the least recently active key
    pub fn peek(&self) -> Option<K> {
        self.entries.first().map(|entry| entry.key)
    }

    /// Returns the slot currently holding `key`
    pub fn position(&self, key: &K) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.positions.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.entries.swap(i, j);
        self.positions.insert(self.entries[i].key, i);
        self.positions.insert(self.entries[j].key, j);
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.entries[parent].last_active <= self.entries[idx].last_active {
                break;
            }
            self.swap(parent, idx);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let n = self.entries.len();
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut smallest = idx;

            if left < n && self.entries[left].last_active < self.entries[smallest].last_active {
                smallest = left;
            }
            if right < n && self.entries[right].last_active < self.entries[smallest].last_active {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.swap(idx, smallest);
            idx = smallest;
        }
    }

    /// Checks heap order and index consistency
    #[cfg(test)]
    pub(crate) fn is_valid(&self) -> bool {
        if self.positions.len() != self.entries.len() {
            return false;
        }
        for (idx, entry) in self.entries.iter().enumerate() {
            if self.positions.get(&entry.key) != Some(&idx) {
                return false;
            }
            if idx > 0 {
                let parent = (idx - 1) / 2;
                if entry.last_active < self.entries[parent].last_active {
                    return false;
                }
            }
        }
        true
    }
}
