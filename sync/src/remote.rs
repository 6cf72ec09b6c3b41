//! The remote sync endpoint port.
//!
//! The authoritative store is an out-of-scope collaborator reached through
//! [`RemoteEndpoint`]: a delta pull per entity kind and a single-mutation
//! push. Push requests carry the outbox entry id as an idempotency key;
//! the remote must deduplicate replays of the same `request_id` so that a
//! retried push whose prior acknowledgment was lost applies only once.

use async_trait::async_trait;
use furrow_core::{
    EntityId, EntityKind, OutboxEntry, OutboxEntryId, OutboxOp, RemoteSnapshot, SyncCursor,
    SyncVersion, Timestamp,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of a remote operation, split by retry behavior.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network-level failure; retried per the backoff schedule
    #[error("transient network error: {0}")]
    Transient(String),

    /// The remote refused the mutation (e.g. validation); never retried
    #[error("remote rejected the request: {0}")]
    Rejected(String),
}

/// One changed record in a pull response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    /// Entity identifier
    pub id: EntityId,
    /// Payload; `None` when the record was deleted remotely
    pub payload: Option<serde_json::Value>,
    /// Remote version of this change
    pub version: SyncVersion,
    /// Remote modification time
    pub updated_at: Timestamp,
}

impl RemoteRecord {
    /// View of this record for conflict adjudication.
    pub fn snapshot(&self) -> RemoteSnapshot {
        RemoteSnapshot {
            payload: self.payload.clone(),
            version: self.version,
            updated_at: self.updated_at,
        }
    }
}

/// Remote deltas newer than the requested cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Changed records, oldest first
    pub records: Vec<RemoteRecord>,
    /// Watermark to request from next time
    pub cursor: SyncCursor,
}

/// A single queued mutation on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Outbox entry id; the remote's deduplication key
    pub request_id: OutboxEntryId,
    /// Target collection
    pub kind: EntityKind,
    /// Target entity
    pub entity_id: EntityId,
    /// Mutation type
    pub op: OutboxOp,
    /// Payload; `None` for deletes
    pub payload: Option<serde_json::Value>,
    /// Version the mutation is based on; `None` for creates
    pub base_version: Option<SyncVersion>,
}

impl PushRequest {
    /// Build the wire request for an outbox entry.
    pub fn from_entry(entry: &OutboxEntry) -> Self {
        Self {
            request_id: entry.id.clone(),
            kind: entry.kind,
            entity_id: entry.entity_id.clone(),
            op: entry.op,
            payload: entry.payload.clone(),
            base_version: entry.base_version,
        }
    }
}

/// The remote's answer to a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum PushOutcome {
    /// Applied; the record now has this version
    Ack { new_version: SyncVersion },
    /// The remote version advanced past `base_version`
    Conflict { remote: RemoteRecord },
}

/// The remote sync endpoint.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Fetch records of `kind` changed since `since`.
    async fn pull(&self, kind: EntityKind, since: SyncCursor)
        -> Result<PullResponse, RemoteError>;

    /// Transmit one queued mutation.
    async fn push(&self, request: PushRequest) -> Result<PushOutcome, RemoteError>;

    /// Lightweight reachability check.
    async fn probe(&self) -> bool;
}
