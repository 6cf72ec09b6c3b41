//! Error types for the sync runtime.
//!
//! Network and storage failures are translated into outbox status changes
//! at the engine boundary; the variants here surface only where a caller
//! invoked an operation that could not proceed at all (e.g. resolving a
//! conflict that does not exist).

use crate::store::StorageError;
use thiserror::Error;

/// Errors surfaced by the sync runtime's public operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] furrow_core::Error),

    #[error("record not found: {kind}/{id}")]
    RecordNotFound { kind: furrow_core::EntityKind, id: String },
}

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, SyncError>;
