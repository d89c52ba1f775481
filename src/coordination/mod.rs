//! Coordination store access and cross-process breaker statistics.
//!
//! Every process periodically merges its local attempt/success counters into one shared
//! record per service. The store only needs plain read and write; writes are
//! unconditional, so concurrent writers may drop each other's increments.
//!
//! - [`RedisStore`]: Redis-backed store, every operation bounded by the session timeout
//! - [`MemoryStore`]: in-process store for tests and single-process deployments
//! - [`MetricsAggregator`]: the read-merge-write protocol

pub mod aggregator;
pub mod memory;
pub mod redis;

pub use aggregator::{LocalMetrics, MetricsAggregator, MetricsRecord, SUCCESS_METRIC, TOTAL_METRIC};
pub use memory::MemoryStore;
pub use self::redis::RedisStore;

use crate::error::StoreError;
use async_trait::async_trait;
use bytes::Bytes;

/// Expected version meaning "write unconditionally"
pub const ANY_VERSION: i64 = -1;

/// Key-value service shared between processes
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Read the value at `key`, `None` when absent
    async fn read(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Write `value` at `key`. With `expected_version == ANY_VERSION` the write is
    /// unconditional and creates the key when missing.
    async fn write(&self, key: &str, value: Bytes, expected_version: i64)
        -> Result<(), StoreError>;
}
