//! Size-weighted LRU bookkeeping for cached thumbnails.

use bytes::Bytes;
use lru::LruCache;

/// Entry table ordered by recency, bounded by the summed size of its values.
///
/// The table never rejects an insertion: an artifact larger than the capacity
/// is kept and everything older is evicted, so it survives alone until the
/// next insertion.
pub struct SizedLru {
    entries: LruCache<String, Bytes>,
    cost: usize,
    capacity: usize,
}

impl SizedLru {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            cost: 0,
            capacity,
        }
    }

    /// Look up `key`, promoting it to most recently used.
    pub fn get(&mut self, key: &str) -> Option<Bytes> {
        self.entries.get(key).cloned()
    }

    /// Look up `key` without touching recency.
    pub fn peek(&self, key: &str) -> Option<&Bytes> {
        self.entries.peek(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Insert (or replace) `key` as most recently used, then evict least
    /// recently used entries until the cost fits. Returns the evicted keys,
    /// oldest first.
    pub fn insert(&mut self, key: String, artifact: Bytes) -> Vec<String> {
        self.cost += artifact.len();
        if let Some(previous) = self.entries.put(key, artifact) {
            self.cost -= previous.len();
        }
        self.evict()
    }

    fn evict(&mut self) -> Vec<String> {
        let mut evicted = Vec::new();

        // The newest entry is always the most recently used, so stopping at
        // one entry keeps it.
        while self.cost > self.capacity && self.entries.len() > 1 {
            match self.entries.pop_lru() {
                Some((key, artifact)) => {
                    self.cost -= artifact.len();
                    evicted.push(key);
                }
                None => break,
            }
        }

        evicted
    }

    pub fn cost(&self) -> usize {
        self.cost
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(key, _)| key.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(len: usize) -> Bytes {
        Bytes::from(vec![0u8; len])
    }

    #[test]
    fn test_second_insert_evicts_first() {
        let mut lru = SizedLru::new(1000);
        assert!(lru.insert("A".to_string(), artifact(600)).is_empty());

        let evicted = lru.insert("B".to_string(), artifact(600));
        assert_eq!(evicted, vec!["A".to_string()]);
        assert_eq!(lru.keys(), vec!["B".to_string()]);
        assert_eq!(lru.cost(), 600);
    }

    #[test]
    fn test_read_hit_promotes_recency() {
        let mut lru = SizedLru::new(1000);
        lru.insert("A".to_string(), artifact(300));
        lru.insert("B".to_string(), artifact(300));
        lru.insert("C".to_string(), artifact(300));

        assert!(lru.get("A").is_some());
        let evicted = lru.insert("D".to_string(), artifact(300));

        assert_eq!(evicted, vec!["B".to_string()]);
        assert_eq!(
            lru.keys(),
            vec!["D".to_string(), "A".to_string(), "C".to_string()]
        );
        assert_eq!(lru.cost(), 900);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let mut lru = SizedLru::new(600);
        lru.insert("A".to_string(), artifact(300));
        lru.insert("B".to_string(), artifact(300));

        assert!(lru.peek("A").is_some());
        lru.insert("C".to_string(), artifact(300));
        assert!(!lru.contains("A"));
        assert!(lru.contains("B"));
    }

    #[test]
    fn test_evicts_in_lru_order_until_within_capacity() {
        let mut lru = SizedLru::new(1000);
        for key in ["A", "B", "C", "D"] {
            lru.insert(key.to_string(), artifact(250));
        }
        let evicted = lru.insert("E".to_string(), artifact(600));
        assert_eq!(evicted, vec!["A".to_string(), "B".to_string(), "C".to_string()]);
        assert_eq!(lru.cost(), 850);
        assert!(lru.cost() <= lru.capacity());
    }

    #[test]
    fn test_oversized_artifact_survives_alone() {
        let mut lru = SizedLru::new(1000);
        lru.insert("A".to_string(), artifact(400));
        lru.insert("B".to_string(), artifact(400));

        let evicted = lru.insert("huge".to_string(), artifact(5000));
        assert_eq!(evicted, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(lru.keys(), vec!["huge".to_string()]);
        assert_eq!(lru.cost(), 5000);

        // The next insertion pushes it out.
        let evicted = lru.insert("C".to_string(), artifact(100));
        assert_eq!(evicted, vec!["huge".to_string()]);
        assert_eq!(lru.cost(), 100);
    }

    #[test]
    fn test_replacing_key_adjusts_cost() {
        let mut lru = SizedLru::new(1000);
        lru.insert("A".to_string(), artifact(600));
        lru.insert("A".to_string(), artifact(200));
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.cost(), 200);
    }

    #[test]
    fn test_empty_table() {
        let mut lru = SizedLru::new(10);
        assert!(lru.is_empty());
        assert_eq!(lru.cost(), 0);
        assert!(lru.get("missing").is_none());
    }
}
