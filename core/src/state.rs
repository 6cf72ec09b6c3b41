//! Persistable sync state.
//!
//! The engine's durable state — outbox, pull cursors, and conflict log —
//! is bundled into one serializable snapshot. The storage adapter persists
//! it at init/teardown and after each sync cycle.

use crate::{
    conflict::ConflictRecord, cursor::CursorSet, error::Result, outbox::Outbox, Error,
};
use serde::{Deserialize, Serialize};

/// Version of the persisted state format for future compatibility.
pub const STATE_FORMAT_VERSION: u32 = 1;

/// A point-in-time snapshot of everything the engine must not lose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// State format version
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    /// Queued local mutations
    pub outbox: Outbox,
    /// Per-kind pull watermarks
    pub cursors: CursorSet,
    /// Detected conflicts, resolved and unresolved
    pub conflicts: Vec<ConflictRecord>,
}

fn default_format_version() -> u32 {
    STATE_FORMAT_VERSION
}

impl SyncState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self {
            format_version: STATE_FORMAT_VERSION,
            outbox: Outbox::new(),
            cursors: CursorSet::new(),
            conflicts: Vec::new(),
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON, rejecting newer formats.
    pub fn from_json(json: &str) -> Result<Self> {
        let state: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if state.format_version > STATE_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported state format version: {} (max supported: {})",
                state.format_version, STATE_FORMAT_VERSION
            )));
        }

        Ok(state)
    }
}
