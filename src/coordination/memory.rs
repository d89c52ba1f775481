use super::{CoordinationStore, ANY_VERSION};
use crate::error::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone)]
struct Versioned {
    version: i64,
    data: Bytes,
}

/// In-process coordination store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Versioned>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a connection error until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    /// Version of the value at `key`; the first write creates version 0
    pub fn version(&self, key: &str) -> Option<i64> {
        self.entries.get(key).map(|e| e.version)
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::Acquire) {
            Err(StoreError::Connection("memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.check_online()?;
        Ok(self.entries.get(key).map(|e| e.data.clone()))
    }

    async fn write(
        &self,
        key: &str,
        value: Bytes,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        self.check_online()?;

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get_mut();
                if expected_version != ANY_VERSION && expected_version != current.version {
                    return Err(StoreError::VersionConflict {
                        key: key.to_string(),
                        expected: expected_version,
                        actual: current.version,
                    });
                }
                current.version += 1;
                current.data = value;
            }
            Entry::Vacant(vacant) => {
                if expected_version != ANY_VERSION {
                    return Err(StoreError::VersionConflict {
                        key: key.to_string(),
                        expected: expected_version,
                        actual: ANY_VERSION,
                    });
                }
                vacant.insert(Versioned {
                    version: 0,
                    data: value,
                });
            }
        }
        Ok(())
    }
}
