//! Storage ports and the in-memory adapter.
//!
//! The surrounding application supplies durable storage through two
//! traits: [`EntityStore`] is the per-collection data-access contract the
//! engine reads and writes domain records through, and [`SyncStateStore`]
//! persists the engine's own state (outbox, cursors, conflicts) across
//! restarts. [`MemoryStore`] implements both and backs the test suite.

use async_trait::async_trait;
use furrow_core::{EntityId, EntityKind, EntityRecord, SyncState};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from a storage adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("corrupt persisted sync state: {0}")]
    CorruptState(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// The per-entity data-access contract.
///
/// All operations are durable from the caller's perspective. The engine
/// never mutates records behind this trait's back, which is what keeps
/// the sync metadata invariants intact.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetch one record, tombstones included.
    async fn get(&self, kind: EntityKind, id: &str) -> StorageResult<Option<EntityRecord>>;

    /// All records of a kind, tombstones included.
    async fn list(&self, kind: EntityKind) -> StorageResult<Vec<EntityRecord>>;

    /// Insert or replace a record.
    async fn put(&self, record: EntityRecord) -> StorageResult<()>;

    /// Remove a record outright (no tombstone).
    async fn delete(&self, kind: EntityKind, id: &str) -> StorageResult<()>;

    /// Insert or replace many records.
    async fn bulk_put(&self, records: Vec<EntityRecord>) -> StorageResult<()> {
        for record in records {
            self.put(record).await?;
        }
        Ok(())
    }

    /// Remove many records outright.
    async fn bulk_delete(&self, kind: EntityKind, ids: &[EntityId]) -> StorageResult<()> {
        for id in ids {
            self.delete(kind, id).await?;
        }
        Ok(())
    }
}

/// Persistence for the engine's own durable state.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Load the persisted sync state, if any.
    async fn load_sync_state(&self) -> StorageResult<Option<SyncState>>;

    /// Persist the sync state.
    async fn save_sync_state(&self, state: &SyncState) -> StorageResult<()>;
}

/// In-memory storage adapter.
pub struct MemoryStore {
    records: RwLock<HashMap<(EntityKind, EntityId), EntityRecord>>,
    state: RwLock<Option<String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            state: RwLock::new(None),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get(&self, kind: EntityKind, id: &str) -> StorageResult<Option<EntityRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&(kind, id.to_string())).cloned())
    }

    async fn list(&self, kind: EntityKind) -> StorageResult<Vec<EntityRecord>> {
        let records = self.records.read().await;
        let mut out: Vec<EntityRecord> = records
            .values()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn put(&self, record: EntityRecord) -> StorageResult<()> {
        let mut records = self.records.write().await;
        records.insert((record.kind, record.id.clone()), record);
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> StorageResult<()> {
        let mut records = self.records.write().await;
        records.remove(&(kind, id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl SyncStateStore for MemoryStore {
    async fn load_sync_state(&self) -> StorageResult<Option<SyncState>> {
        let state = self.state.read().await;
        match state.as_deref() {
            Some(json) => {
                let parsed = SyncState::from_json(json)
                    .map_err(|e| StorageError::CorruptState(e.to_string()))?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    async fn save_sync_state(&self, state: &SyncState) -> StorageResult<()> {
        let json = state
            .to_json()
            .map_err(|e| StorageError::CorruptState(e.to_string()))?;
        *self.state.write().await = Some(json);
        Ok(())
    }
}
