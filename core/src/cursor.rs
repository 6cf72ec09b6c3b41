//! Per-kind pull watermarks.
//!
//! Each entity kind keeps one monotonically increasing cursor recording the
//! last remote change successfully pulled. The next pull requests only
//! deltas newer than the cursor.

use crate::{entity::EntityKind, SyncCursor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The set of pull cursors, one per entity kind.
///
/// BTreeMap keeps serialization deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorSet {
    cursors: BTreeMap<EntityKind, SyncCursor>,
}

impl CursorSet {
    /// Create an empty cursor set; every kind starts at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current watermark for a kind.
    pub fn get(&self, kind: EntityKind) -> SyncCursor {
        self.cursors.get(&kind).copied().unwrap_or(0)
    }

    /// Advance a kind's watermark. Regressions are ignored.
    pub fn advance(&mut self, kind: EntityKind, cursor: SyncCursor) {
        let entry = self.cursors.entry(kind).or_insert(0);
        *entry = (*entry).max(cursor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let cursors = CursorSet::new();
        assert_eq!(cursors.get(EntityKind::Plant), 0);
    }

    #[test]
    fn advance_is_monotonic() {
        let mut cursors = CursorSet::new();
        cursors.advance(EntityKind::Zone, 12);
        assert_eq!(cursors.get(EntityKind::Zone), 12);

        cursors.advance(EntityKind::Zone, 7);
        assert_eq!(cursors.get(EntityKind::Zone), 12);

        cursors.advance(EntityKind::Zone, 30);
        assert_eq!(cursors.get(EntityKind::Zone), 30);
    }

    #[test]
    fn kinds_are_independent() {
        let mut cursors = CursorSet::new();
        cursors.advance(EntityKind::Plant, 5);
        assert_eq!(cursors.get(EntityKind::Plant), 5);
        assert_eq!(cursors.get(EntityKind::Harvest), 0);
    }

    #[test]
    fn serialization_roundtrip() {
        let mut cursors = CursorSet::new();
        cursors.advance(EntityKind::WaterEntry, 42);

        let json = serde_json::to_string(&cursors).unwrap();
        let parsed: CursorSet = serde_json::from_str(&json).unwrap();
        assert_eq!(cursors, parsed);
    }
}
