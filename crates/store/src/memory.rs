use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::repository::{Filter, Repository};
use crate::{Record, Result, StoreError, Version, Versioned};

/// In-memory repository.
///
/// Provides the same guarantees as a database-backed store would: inserts
/// reject duplicate keys and updates are version-checked under the write lock.
pub struct InMemoryRepository<R: Record> {
    records: Arc<RwLock<HashMap<R::Key, Versioned<R>>>>,
    sequence: Arc<AtomicU64>,
    fail_writes: Arc<AtomicBool>,
}

impl<R: Record> Clone for InMemoryRepository<R> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            sequence: Arc::clone(&self.sequence),
            fail_writes: Arc::clone(&self.fail_writes),
        }
    }
}

impl<R: Record> Default for InMemoryRepository<R> {
    fn default() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            sequence: Arc::new(AtomicU64::new(0)),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<R: Record> InMemoryRepository<R> {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with `Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "{} store rejected the write",
                R::record_type()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<R: Record> Repository<R> for InMemoryRepository<R> {
    async fn insert(&self, record: R) -> Result<Versioned<R>> {
        self.check_writable()?;

        let key = record.key();
        let mut records = self.records.write().await;
        if records.contains_key(&key) {
            return Err(StoreError::Duplicate {
                record_type: R::record_type(),
                key: key.to_string(),
            });
        }

        let stored = Versioned::new(record, Version::first());
        records.insert(key, stored.clone());
        Ok(stored)
    }

    async fn get(&self, key: &R::Key) -> Result<Option<Versioned<R>>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn update(&self, record: R, expected: Version) -> Result<Version> {
        self.check_writable()?;

        let key = record.key();
        let mut records = self.records.write().await;
        let current = records.get_mut(&key).ok_or_else(|| StoreError::NotFound {
            record_type: R::record_type(),
            key: key.to_string(),
        })?;

        if current.version != expected {
            tracing::debug!(
                record_type = R::record_type(),
                %key,
                %expected,
                actual = %current.version,
                "rejected stale write"
            );
            return Err(StoreError::ConcurrencyConflict {
                record_type: R::record_type(),
                key: key.to_string(),
                expected,
                actual: current.version,
            });
        }

        let next = current.version.next();
        *current = Versioned::new(record, next);
        Ok(next)
    }

    async fn delete(&self, key: &R::Key) -> Result<bool> {
        self.check_writable()?;
        Ok(self.records.write().await.remove(key).is_some())
    }

    async fn find(&self, filter: Filter<'_, R>) -> Result<Vec<Versioned<R>>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|stored| filter(&stored.record))
            .cloned()
            .collect())
    }

    async fn next_sequence(&self) -> Result<u64> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
