//! The blackboard: a key/value store with TTL and atomic operations.
//!
//! Sole shared-mutable state in the system. Every status mutation goes
//! through `compare_and_set` so concurrent writers can never roll a record
//! back (see the job registry).
//!
//! Two backends exist: an in-memory store with TTL and LRU eviction for
//! tests and standalone runs, and a Redis-backed store for deployments.
//! A sharded Redis cluster hides behind the same URL-based constructor.

mod memory;
mod redis_store;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryBlackboard;
pub use redis_store::RedisBlackboard;

/// Errors raised by blackboard backends
#[derive(Error, Debug)]
pub enum BlackboardError {
    #[error("Failed to connect to storage backend: {0}")]
    Connection(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Stored value is not valid: {0}")]
    InvalidValue(String),
}

pub type BlackboardResult<T> = std::result::Result<T, BlackboardError>;

/// Narrow capability the services consume the blackboard through
#[async_trait]
pub trait Blackboard: Send + Sync {
    async fn get(&self, key: &str) -> BlackboardResult<Option<Vec<u8>>>;

    /// Store a value, optionally expiring after `ttl`
    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> BlackboardResult<()>;

    async fn exists(&self, key: &str) -> BlackboardResult<bool>;

    async fn delete(&self, key: &str) -> BlackboardResult<()>;

    /// Atomically increment a counter, returning the new value.
    /// Missing counters start at zero.
    async fn atomic_increment(&self, counter: &str) -> BlackboardResult<u64>;

    /// Write `new` only if the current value equals `expected`
    /// (`None` = key must be absent). Returns whether the write happened.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
        ttl: Option<Duration>,
    ) -> BlackboardResult<bool>;

    /// List all keys starting with `prefix`
    async fn scan(&self, prefix: &str) -> BlackboardResult<Vec<String>>;
}

pub type BlackboardRef = Arc<dyn Blackboard>;

/// Blackboard key layout.
///
/// - `counter:{kind}` - monotonic id counters
/// - `status:{job_id}` - analysis and dataset-loading status records
/// - `result:{job_id}` - analysis result blob
/// - `dataset:{dataset_id}` - loaded dataset summary
/// - `dataset:{dataset_id}:data` - loaded dataset matrix blob
/// - `report:{job_id}:status` - report status record
/// - `report:{job_id}:{artifact}` - report artifact blob
pub mod keys {
    pub const STATUS_PREFIX: &str = "status:";
    pub const REPORT_PREFIX: &str = "report:";

    pub fn status(job_id: &str) -> String {
        format!("status:{}", job_id)
    }

    pub fn result(job_id: &str) -> String {
        format!("result:{}", job_id)
    }

    pub fn dataset(dataset_id: &str) -> String {
        format!("dataset:{}", dataset_id)
    }

    pub fn dataset_data(dataset_id: &str) -> String {
        format!("dataset:{}:data", dataset_id)
    }

    pub fn report_status(job_id: &str) -> String {
        format!("report:{}:status", job_id)
    }

    pub fn report_artifact(job_id: &str, artifact: &str) -> String {
        format!("report:{}:{}", job_id, artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(keys::status("Analysis00000001"), "status:Analysis00000001");
        assert_eq!(keys::result("Analysis00000001"), "result:Analysis00000001");
        assert_eq!(keys::dataset_data("dst_ab12"), "dataset:dst_ab12:data");
        assert_eq!(
            keys::report_artifact("Analysis00000001", "XLSX"),
            "report:Analysis00000001:XLSX"
        );
    }
}
