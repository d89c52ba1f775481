use super::{CoordinationStore, ANY_VERSION};
use crate::error::StoreError;
use bytes::Bytes;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Attempts observed since the last upload
pub const TOTAL_METRIC: &str = "total";
/// Successes observed since the last upload
pub const SUCCESS_METRIC: &str = "success";

/// Metric name to count
pub type MetricsRecord = BTreeMap<String, i64>;

/// Process-local metrics accumulated between uploads
#[derive(Debug, Default)]
pub struct LocalMetrics {
    values: DashMap<String, i64>,
}

impl LocalMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing any previous value
    pub fn record(&self, name: &str, value: i64) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).map(|v| *v)
    }

    pub fn snapshot(&self) -> MetricsRecord {
        self.values
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    pub fn clear(&self) {
        self.values.clear();
    }
}

/// Merges local counts into the shared record for one service
#[derive(Clone)]
pub struct MetricsAggregator {
    store: Arc<dyn CoordinationStore>,
    key: String,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn CoordinationStore>, key_prefix: &str, service: &str) -> Self {
        Self {
            store,
            key: format!("{}{}", key_prefix, service),
        }
    }

    /// Store key of the shared record
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the shared record; an absent key is an empty record
    pub async fn fetch(&self) -> Result<MetricsRecord, StoreError> {
        let remote = self.read_remote().await?;
        Ok(remote
            .iter()
            .filter_map(|(k, v)| numeric(v).map(|n| (k.clone(), n)))
            .collect())
    }

    /// Add `local` into the shared record and write it back unconditionally.
    ///
    /// Keys missing remotely take the local value; present keys take the sum. Another
    /// process writing between the read and the write loses its increments.
    pub async fn merge(&self, local: &MetricsRecord) -> Result<MetricsRecord, StoreError> {
        let mut remote = self.read_remote().await?;

        for (name, value) in local {
            let merged = match remote.get(name) {
                Some(existing) => match numeric(existing) {
                    Some(current) => {
                        current
                            .checked_add(*value)
                            .ok_or_else(|| StoreError::Corrupt {
                                key: self.key.clone(),
                                reason: format!("{} overflows when adding {}", name, value),
                            })?
                    }
                    None => {
                        warn!(
                            key = %self.key,
                            metric = %name,
                            value = %existing,
                            "Non-numeric aggregated metric replaced"
                        );
                        *value
                    }
                },
                None => *value,
            };
            remote.insert(name.clone(), Value::from(merged));
        }

        let payload = serde_json::to_vec(&remote).map_err(|e| StoreError::Corrupt {
            key: self.key.clone(),
            reason: e.to_string(),
        })?;
        self.store
            .write(&self.key, Bytes::from(payload), ANY_VERSION)
            .await?;

        debug!(key = %self.key, local = ?local, "Merged local metrics into shared record");

        Ok(remote
            .iter()
            .filter_map(|(k, v)| numeric(v).map(|n| (k.clone(), n)))
            .collect())
    }

    async fn read_remote(&self) -> Result<Map<String, Value>, StoreError> {
        match self.store.read(&self.key).await? {
            None => Ok(Map::new()),
            Some(bytes) if bytes.is_empty() => Ok(Map::new()),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                key: self.key.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Counts may be stored as JSON numbers or numeric strings
fn numeric(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::MemoryStore;
    use serde_json::json;

    fn record(entries: &[(&str, i64)]) -> MetricsRecord {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_local_metrics_snapshot_and_clear() {
        let local = LocalMetrics::new();
        local.record(TOTAL_METRIC, 4);
        local.record(SUCCESS_METRIC, 1);
        local.record(SUCCESS_METRIC, 2);

        assert_eq!(
            local.snapshot(),
            record(&[(TOTAL_METRIC, 4), (SUCCESS_METRIC, 2)])
        );

        local.clear();
        assert!(local.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_merge_into_absent_record() {
        let store = Arc::new(MemoryStore::new());
        let aggregator = MetricsAggregator::new(store.clone(), "metrics:", "demo.Service");

        let merged = aggregator
            .merge(&record(&[(TOTAL_METRIC, 5)]))
            .await
            .unwrap();
        assert_eq!(merged, record(&[(TOTAL_METRIC, 5)]));
        assert_eq!(aggregator.key(), "metrics:demo.Service");
    }

    #[tokio::test]
    async fn test_merge_sums_existing_counts() {
        let store = Arc::new(MemoryStore::new());
        let aggregator = MetricsAggregator::new(store.clone(), "metrics:", "demo.Service");

        aggregator
            .merge(&record(&[(TOTAL_METRIC, 5)]))
            .await
            .unwrap();
        aggregator
            .merge(&record(&[(TOTAL_METRIC, 3), (SUCCESS_METRIC, 2)]))
            .await
            .unwrap();

        assert_eq!(
            aggregator.fetch().await.unwrap(),
            record(&[(TOTAL_METRIC, 8), (SUCCESS_METRIC, 2)])
        );
    }

    #[tokio::test]
    async fn test_merge_accepts_string_counts_and_keeps_unknown_keys() {
        let store = Arc::new(MemoryStore::new());
        store
            .write(
                "metrics:demo",
                Bytes::from(json!({"total": "7", "owner": "ops"}).to_string()),
                ANY_VERSION,
            )
            .await
            .unwrap();

        let aggregator = MetricsAggregator::new(store.clone(), "metrics:", "demo");
        aggregator
            .merge(&record(&[(TOTAL_METRIC, 1)]))
            .await
            .unwrap();

        let raw = store.read("metrics:demo").await.unwrap().unwrap();
        let value: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value, json!({"total": 8, "owner": "ops"}));
    }

    #[tokio::test]
    async fn test_overflowing_count_is_reported_and_left_untouched() {
        let store = Arc::new(MemoryStore::new());
        store
            .write(
                "metrics:demo",
                Bytes::from(json!({"total": i64::MAX}).to_string()),
                ANY_VERSION,
            )
            .await
            .unwrap();

        let aggregator = MetricsAggregator::new(store.clone(), "metrics:", "demo");
        let err = aggregator
            .merge(&record(&[(TOTAL_METRIC, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));

        let raw = store.read("metrics:demo").await.unwrap().unwrap();
        let value: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value, json!({"total": i64::MAX}));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store
            .write("metrics:demo", Bytes::from_static(b"not json"), ANY_VERSION)
            .await
            .unwrap();

        let aggregator = MetricsAggregator::new(store, "metrics:", "demo");
        let err = aggregator
            .merge(&record(&[(TOTAL_METRIC, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
