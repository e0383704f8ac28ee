//! In-memory blackboard with TTL and LRU eviction.
//!
//! Used by the test suites and by standalone single-process runs. Expiry
//! is lazy: entries are dropped when touched past their deadline or when
//! the store needs room.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{Blackboard, BlackboardError, BlackboardResult};

const DEFAULT_MAX_ENTRIES: usize = 10_000;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
    last_access: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// HashMap-backed blackboard
pub struct MemoryBlackboard {
    entries: Mutex<HashMap<String, Entry>>,
    max_entries: usize,
}

impl MemoryBlackboard {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    /// Bound the store to `max_entries`; the least recently used entry is
    /// evicted when a new key would exceed the bound.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // A poisoned lock only happens after a panic while holding it;
        // the map itself is still structurally intact.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn evict_if_full(entries: &mut HashMap<String, Entry>, max_entries: usize, new_key: &str) {
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));

        while entries.len() >= max_entries && !entries.contains_key(new_key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryBlackboard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Blackboard for MemoryBlackboard {
    async fn get(&self, key: &str) -> BlackboardResult<Option<Vec<u8>>> {
        let mut entries = self.lock();
        let now = Instant::now();

        match entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => {
                entry.last_access = now;
                Ok(Some(entry.value.clone()))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> BlackboardResult<()> {
        let mut entries = self.lock();
        Self::evict_if_full(&mut entries, self.max_entries, key);

        let now = Instant::now();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: ttl.map(|ttl| now + ttl),
                last_access: now,
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> BlackboardResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn delete(&self, key: &str) -> BlackboardResult<()> {
        self.lock().remove(key);
        Ok(())
    }

    async fn atomic_increment(&self, counter: &str) -> BlackboardResult<u64> {
        let mut entries = self.lock();
        let now = Instant::now();

        let current = match entries.get(counter) {
            Some(entry) if !entry.is_expired(now) => std::str::from_utf8(&entry.value)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| {
                    BlackboardError::InvalidValue(format!("counter {} is not an integer", counter))
                })?,
            _ => 0,
        };

        let next = current + 1;
        entries.insert(
            counter.to_string(),
            Entry {
                value: next.to_string().into_bytes(),
                expires_at: None,
                last_access: now,
            },
        );
        Ok(next)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
        ttl: Option<Duration>,
    ) -> BlackboardResult<bool> {
        let mut entries = self.lock();
        let now = Instant::now();

        let current = entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.as_slice());

        if current != expected {
            return Ok(false);
        }

        Self::evict_if_full(&mut entries, self.max_entries, key);
        entries.insert(
            key.to_string(),
            Entry {
                value: new.to_vec(),
                expires_at: ttl.map(|ttl| now + ttl),
                last_access: now,
            },
        );
        Ok(true)
    }

    async fn scan(&self, prefix: &str) -> BlackboardResult<Vec<String>> {
        let entries = self.lock();
        let now = Instant::now();

        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let board = MemoryBlackboard::new();
        board.put("k", b"v", None).await.unwrap();
        assert_eq!(board.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(board.exists("k").await.unwrap());

        board.delete("k").await.unwrap();
        assert_eq!(board.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let board = MemoryBlackboard::new();
        board
            .put("short", b"v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert!(board.exists("short").await.unwrap());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!board.exists("short").await.unwrap());
    }

    #[tokio::test]
    async fn test_atomic_increment_counts_exactly() {
        let board = MemoryBlackboard::new();
        for expected in 1..=5u64 {
            assert_eq!(board.atomic_increment("counter:analysis").await.unwrap(), expected);
        }
        assert_eq!(
            board.get("counter:analysis").await.unwrap(),
            Some(b"5".to_vec())
        );
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let board = MemoryBlackboard::new();

        // Expected absent, key absent: write succeeds
        assert!(board.compare_and_set("k", None, b"v1", None).await.unwrap());
        // Expected absent, key present: write refused
        assert!(!board.compare_and_set("k", None, b"v2", None).await.unwrap());
        // Wrong expected value: refused
        assert!(!board.compare_and_set("k", Some(b"other"), b"v2", None).await.unwrap());
        // Matching expected value: applied
        assert!(board.compare_and_set("k", Some(b"v1"), b"v2", None).await.unwrap());
        assert_eq!(board.get("k").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let board = MemoryBlackboard::with_capacity(2);
        board.put("a", b"1", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        board.put("b", b"2", None).await.unwrap();

        // Touch "a" so "b" becomes the eviction candidate
        tokio::time::sleep(Duration::from_millis(5)).await;
        board.get("a").await.unwrap();

        board.put("c", b"3", None).await.unwrap();
        assert!(board.exists("a").await.unwrap());
        assert!(!board.exists("b").await.unwrap());
        assert!(board.exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_by_prefix() {
        let board = MemoryBlackboard::new();
        board.put("status:Analysis1", b"{}", None).await.unwrap();
        board.put("status:Load1", b"{}", None).await.unwrap();
        board.put("result:Analysis1", b"{}", None).await.unwrap();

        let mut keys = board.scan("status:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["status:Analysis1", "status:Load1"]);
    }
}
