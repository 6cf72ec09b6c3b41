//! Error types for the Furrow sync core.

use crate::{EntityId, OutboxEntryId};
use thiserror::Error;

/// All possible errors from the sync core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unknown entity kind: {0}")]
    UnknownEntityKind(String),

    #[error("outbox entry not found: {0}")]
    EntryNotFound(OutboxEntryId),

    #[error("no unresolved conflict for entity: {0}")]
    ConflictNotFound(EntityId),

    #[error("invalid entry state: {0}")]
    InvalidState(String),

    #[error("invalid sync state snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
