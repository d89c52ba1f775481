use super::{CoordinationStore, ANY_VERSION};
use crate::error::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::RedisResult;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Redis-backed coordination store.
///
/// Every operation is bounded by the session timeout; exceeding it fails only that
/// operation. Conditional writes are not supported.
#[derive(Clone)]
pub struct RedisStore {
    /// Redis connection manager
    connection: ConnectionManager,
    /// Endpoint the connection was established to
    endpoint: String,
    /// Bound applied to connect, read and write
    session_timeout: Duration,
}

impl RedisStore {
    /// Connect to the first reachable endpoint, in order
    pub async fn connect(endpoints: &[String], session_timeout: Duration) -> Result<Self, StoreError> {
        let mut last_error = StoreError::Connection("no coordination endpoints configured".to_string());

        for endpoint in endpoints {
            match Self::connect_one(endpoint, session_timeout).await {
                Ok(connection) => {
                    info!(endpoint = %endpoint, "Connected to coordination store");
                    return Ok(Self {
                        connection,
                        endpoint: endpoint.clone(),
                        session_timeout,
                    });
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "Coordination endpoint unreachable");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn connect_one(
        endpoint: &str,
        session_timeout: Duration,
    ) -> Result<ConnectionManager, StoreError> {
        let client = redis::Client::open(endpoint)?;
        bounded(session_timeout, ConnectionManager::new(client)).await
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Test Redis connection
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        bounded(
            self.session_timeout,
            redis::cmd("PING").query_async::<_, ()>(&mut connection),
        )
        .await
    }
}

async fn bounded<T>(
    limit: Duration,
    operation: impl Future<Output = RedisResult<T>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
        .map_err(StoreError::from)
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn read(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut connection = self.connection.clone();
        let value = bounded(
            self.session_timeout,
            redis::cmd("GET")
                .arg(key)
                .query_async::<_, Option<Vec<u8>>>(&mut connection),
        )
        .await?;

        debug!(key, present = value.is_some(), "Read coordination record");
        Ok(value.map(Bytes::from))
    }

    async fn write(
        &self,
        key: &str,
        value: Bytes,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        if expected_version != ANY_VERSION {
            return Err(StoreError::Unsupported(
                "redis store only supports unconditional writes".to_string(),
            ));
        }

        let mut connection = self.connection.clone();
        bounded(
            self.session_timeout,
            redis::cmd("SET")
                .arg(key)
                .arg(value.as_ref())
                .query_async::<_, ()>(&mut connection),
        )
        .await?;

        debug!(key, bytes = value.len(), "Wrote coordination record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a running Redis instance
    // They are ignored by default. Run with: cargo test -- --ignored

    async fn create_test_store() -> RedisStore {
        RedisStore::connect(
            &["redis://127.0.0.1:6379".to_string()],
            Duration::from_secs(5),
        )
        .await
        .expect("Failed to connect to Redis")
    }

    #[tokio::test]
    async fn test_connect_without_endpoints_fails() {
        let result = RedisStore::connect(&[], Duration::from_secs(1)).await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_read_write() {
        let store = create_test_store().await;
        let key = format!("mock-cluster:test:{}", rand::random::<u32>());

        assert!(store.read(&key).await.unwrap().is_none());
        store
            .write(&key, Bytes::from_static(b"{\"total\":1}"), ANY_VERSION)
            .await
            .unwrap();
        assert_eq!(
            store.read(&key).await.unwrap(),
            Some(Bytes::from_static(b"{\"total\":1}"))
        );
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_rejects_conditional_write() {
        let store = create_test_store().await;
        let err = store
            .write("mock-cluster:test:conditional", Bytes::new(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_connection() {
        let store = create_test_store().await;
        assert!(store.ping().await.is_ok());
    }
}
