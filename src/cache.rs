//! Memoisation of stage results
//!
//! Results are keyed by the stage's inputs and shared as `Arc`s, so asking
//! twice with equal inputs returns the same table without recomputing it.
//! Errors are never stored.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Key of a downloaded feed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedKey {
    pub base_url: String,
    pub date: chrono::NaiveDate,
}

/// Key of a normalised price table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PriceKey {
    pub feed: FeedKey,
    pub country: String,
}

/// Input-keyed memo table
#[derive(Debug)]
pub struct Memo<K, V> {
    entries: HashMap<K, Arc<V>>,
    hits: u64,
    misses: u64,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }
}

impl<K: Hash + Eq, V> Memo<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `key`; counts a hit or a miss
    pub fn get(&mut self, key: &K) -> Option<Arc<V>> {
        match self.entries.get(key) {
            Some(value) => {
                self.hits += 1;
                Some(Arc::clone(value))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.entries.insert(key, Arc::clone(&value));
        value
    }

    /// Return the cached value or compute, store and return it
    ///
    /// A failed computation leaves the memo untouched.
    pub fn get_or_try_insert_with<E, F>(&mut self, key: K, compute: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = compute()?;
        Ok(self.insert(key, value))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<Arc<V>> {
        self.entries.remove(key)
    }

    /// Drop every cached value
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memo_returns_same_arc() {
        let mut memo: Memo<&str, Vec<i32>> = Memo::new();
        let mut calls = 0;

        let first = memo
            .get_or_try_insert_with::<(), _>("a", || {
                calls += 1;
                Ok(vec![1, 2])
            })
            .unwrap();
        let second = memo
            .get_or_try_insert_with::<(), _>("a", || {
                calls += 1;
                Ok(vec![3])
            })
            .unwrap();

        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(memo.hits(), 1);
        assert_eq!(memo.misses(), 1);
    }

    #[test]
    fn test_memo_does_not_store_errors() {
        let mut memo: Memo<u32, u32> = Memo::new();
        let failed: Result<_, &str> = memo.get_or_try_insert_with(1, || Err("offline"));
        assert!(failed.is_err());
        assert!(!memo.contains(&1));

        let ok: Result<_, &str> = memo.get_or_try_insert_with(1, || Ok(7));
        assert_eq!(*ok.unwrap(), 7);
    }

    #[test]
    fn test_memo_invalidate() {
        let mut memo: Memo<u32, u32> = Memo::new();
        memo.insert(1, 10);
        memo.insert(2, 20);
        assert_eq!(memo.len(), 2);

        memo.invalidate();
        assert!(memo.is_empty());
        assert!(memo.get(&1).is_none());
    }

    #[test]
    fn test_keys_distinguish_inputs() {
        let date = chrono::NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let feed = FeedKey {
            base_url: "https://example.com/feed".to_string(),
            date,
        };
        let mut memo: Memo<PriceKey, usize> = Memo::new();
        memo.insert(
            PriceKey {
                feed: feed.clone(),
                country: "AUS".to_string(),
            },
            1,
        );

        assert!(memo.contains(&PriceKey {
            feed: feed.clone(),
            country: "AUS".to_string(),
        }));
        assert!(!memo.contains(&PriceKey {
            feed,
            country: "GB".to_string(),
        }));
    }
}
