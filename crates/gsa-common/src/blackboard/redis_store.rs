//! Redis-backed blackboard.
//!
//! Uses the async `ConnectionManager` (pooled, auto-reconnecting). TTL
//! maps to native `EXPIRE`, counters to `INCR`, and compare-and-set runs
//! as a small Lua script so the read-compare-write is atomic on the
//! server. A sharded cluster deployment only changes the connection URL.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;

use super::{Blackboard, BlackboardError, BlackboardResult};

const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
local expect_present = ARGV[1] == '1'
local matches
if expect_present then
    matches = current ~= false and current == ARGV[2]
else
    matches = current == false
end
if not matches then
    return 0
end
redis.call('SET', KEYS[1], ARGV[3])
local ttl = tonumber(ARGV[4])
if ttl > 0 then
    redis.call('EXPIRE', KEYS[1], ttl)
end
return 1
"#;

/// Blackboard implementation on a Redis instance or cluster endpoint
pub struct RedisBlackboard {
    manager: ConnectionManager,
    cas: Script,
}

impl RedisBlackboard {
    /// Connect to the Redis endpoint given as a `redis://` URL
    pub async fn connect(url: &str) -> BlackboardResult<Self> {
        let client =
            Client::open(url).map_err(|e| BlackboardError::Connection(e.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| BlackboardError::Connection(e.to_string()))?;

        Ok(Self {
            manager,
            cas: Script::new(CAS_SCRIPT),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn backend(e: redis::RedisError) -> BlackboardError {
    BlackboardError::Backend(e.to_string())
}

#[async_trait]
impl Blackboard for RedisBlackboard {
    async fn get(&self, key: &str) -> BlackboardResult<Option<Vec<u8>>> {
        let mut conn = self.conn();
        conn.get(key).await.map_err(backend)
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> BlackboardResult<()> {
        let mut conn = self.conn();
        match ttl {
            Some(ttl) if ttl.as_secs() > 0 => conn
                .set_ex(key, value, ttl.as_secs())
                .await
                .map_err(backend),
            _ => conn.set(key, value).await.map_err(backend),
        }
    }

    async fn exists(&self, key: &str) -> BlackboardResult<bool> {
        let mut conn = self.conn();
        conn.exists(key).await.map_err(backend)
    }

    async fn delete(&self, key: &str) -> BlackboardResult<()> {
        let mut conn = self.conn();
        conn.del(key).await.map_err(backend)
    }

    async fn atomic_increment(&self, counter: &str) -> BlackboardResult<u64> {
        let mut conn = self.conn();
        conn.incr(counter, 1u64).await.map_err(backend)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
        ttl: Option<Duration>,
    ) -> BlackboardResult<bool> {
        let mut conn = self.conn();
        let ttl_secs = ttl.map(|ttl| ttl.as_secs()).unwrap_or(0);

        let applied: i64 = self
            .cas
            .key(key)
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(expected.unwrap_or(&[]))
            .arg(new)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;

        Ok(applied == 1)
    }

    async fn scan(&self, prefix: &str) -> BlackboardResult<Vec<String>> {
        let mut conn = self.conn();
        let pattern = format!("{}*", prefix);

        let mut keys = Vec::new();
        let mut iter: redis::AsyncIter<String> =
            conn.scan_match(pattern).await.map_err(backend)?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }
}
