//! In-memory metadata store.
//!
//! Used when no `DATABASE_URL` is configured, and by tests. Records are lost
//! on restart; Telegram keeps the underlying files either way.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::{FileRecord, MetadataStore};

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, FileRecord>,
    /// Insertion order, oldest first.
    order: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn lookup(&self, file_id: &str) -> Result<Option<FileRecord>, StoreError> {
        Ok(self.inner.read().await.records.get(file_id).cloned())
    }

    async fn upsert(&self, record: &FileRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.records.contains_key(&record.file_id) {
            return Ok(());
        }
        inner.order.push(record.file_id.clone());
        inner
            .records
            .insert(record.file_id.clone(), record.clone());
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<FileRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| inner.records.get(id).cloned())
            .collect())
    }
}
