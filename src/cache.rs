use std::collections::{HashMap, VecDeque};

use tracing::trace;

use crate::geo::CacheKey;

pub const DEFAULT_CAPACITY: usize = 50;

/// Bounded address cache. Eviction is strictly by insertion order; reads and
/// overwrites never refresh an entry's position.
#[derive(Debug)]
pub struct AddressCache {
    entries: HashMap<CacheKey, String>,
    order: VecDeque<CacheKey>,
    capacity: usize,
}

impl AddressCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<String> {
        self.entries.get(key).cloned()
    }

    pub fn put(&mut self, key: CacheKey, address: String) {
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = address;
            return;
        }

        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                trace!(evicted = %oldest, "address cache full; evicted oldest entry");
            }
        }

        self.order.push_back(key.clone());
        self.entries.insert(key, address);
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
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
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: usize) -> CacheKey {
        CacheKey::from(format!("{i}.000,0.000").as_str())
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut cache = AddressCache::default();
        for i in 0..200 {
            cache.put(key(i % 73), format!("address {i}"));
            assert!(cache.len() <= DEFAULT_CAPACITY);
        }
    }

    #[test]
    fn evicts_first_inserted_key() {
        let mut cache = AddressCache::default();
        for i in 0..51 {
            cache.put(key(i), format!("address {i}"));
        }
        assert_eq!(cache.len(), 50);
        assert!(!cache.contains(&key(0)));
        for i in 1..51 {
            assert!(cache.contains(&key(i)), "key {i} should survive");
        }
    }

    #[test]
    fn overwrite_keeps_eviction_position() {
        let mut cache = AddressCache::new(3);
        cache.put(key(1), "one".into());
        cache.put(key(2), "two".into());
        cache.put(key(3), "three".into());
        cache.put(key(1), "uno".into());
        assert_eq!(cache.get(&key(1)).as_deref(), Some("uno"));

        cache.put(key(4), "four".into());
        assert!(!cache.contains(&key(1)));
        assert!(cache.contains(&key(2)));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn reads_do_not_refresh_entries() {
        let mut cache = AddressCache::new(2);
        cache.put(key(1), "one".into());
        cache.put(key(2), "two".into());
        assert!(cache.get(&key(1)).is_some());
        cache.put(key(3), "three".into());
        assert!(cache.get(&key(1)).is_none());
        assert!(cache.get(&key(2)).is_some());
    }
}
