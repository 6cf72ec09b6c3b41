//! Entity records and the fixed set of synced collections.
//!
//! Furrow syncs seven domain collections. The engine treats payloads as
//! opaque JSON; only the sync metadata on each record is interpreted here.

use crate::{EntityId, Error, SyncVersion, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The seven entity collections managed by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Project,
    LandParcel,
    Zone,
    Plant,
    WaterEntry,
    Harvest,
    Alert,
}

impl EntityKind {
    /// All kinds, in the order pull cycles visit them.
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Project,
        EntityKind::LandParcel,
        EntityKind::Zone,
        EntityKind::Plant,
        EntityKind::WaterEntry,
        EntityKind::Harvest,
        EntityKind::Alert,
    ];

    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::LandParcel => "land-parcel",
            EntityKind::Zone => "zone",
            EntityKind::Plant => "plant",
            EntityKind::WaterEntry => "water-entry",
            EntityKind::Harvest => "harvest",
            EntityKind::Alert => "alert",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::UnknownEntityKind(s.to_string()))
    }
}

/// A domain record plus the sync metadata the engine maintains.
///
/// `sync_version` is assigned by the remote store and stays `None` until
/// the record's first successful push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    /// Unique identifier within the collection
    pub id: EntityId,
    /// Collection this record belongs to
    pub kind: EntityKind,
    /// Opaque domain payload
    pub payload: serde_json::Value,
    /// Last local or remote modification time
    pub updated_at: Timestamp,
    /// Server-assigned version, absent until first successful push
    pub sync_version: Option<SyncVersion>,
    /// Soft delete flag (tombstone)
    pub deleted: bool,
}

impl EntityRecord {
    /// Create a record that has never been pushed.
    pub fn new(
        id: impl Into<EntityId>,
        kind: EntityKind,
        payload: serde_json::Value,
        now: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
            updated_at: now,
            sync_version: None,
            deleted: false,
        }
    }

    /// Check if the record is active (not tombstoned).
    pub fn is_active(&self) -> bool {
        !self.deleted
    }

    /// Replace the payload and touch `updated_at`.
    pub fn set_payload(&mut self, payload: serde_json::Value, now: Timestamp) {
        self.payload = payload;
        self.updated_at = now;
    }

    /// Tombstone the record and touch `updated_at`.
    pub fn mark_deleted(&mut self, now: Timestamp) {
        self.deleted = true;
        self.updated_at = now;
    }

    /// Record a successful push acknowledgment.
    pub fn acknowledge(&mut self, version: SyncVersion) {
        self.sync_version = Some(version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn kind_wire_names() {
        assert_eq!(EntityKind::LandParcel.as_str(), "land-parcel");
        assert_eq!(EntityKind::WaterEntry.as_str(), "water-entry");
        assert_eq!(EntityKind::ALL.len(), 7);
    }

    #[test]
    fn kind_from_str_roundtrip() {
        for kind in EntityKind::ALL {
            let parsed: EntityKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("tractor".parse::<EntityKind>().is_err());
    }

    #[test]
    fn kind_serde_uses_kebab_case() {
        let json = serde_json::to_string(&EntityKind::WaterEntry).unwrap();
        assert_eq!(json, "\"water-entry\"");
    }

    #[test]
    fn new_record_has_no_sync_version() {
        let now = Utc::now();
        let record = EntityRecord::new("plant-1", EntityKind::Plant, json!({"species": "tomato"}), now);

        assert_eq!(record.id, "plant-1");
        assert!(record.sync_version.is_none());
        assert!(record.is_active());
        assert_eq!(record.updated_at, now);
    }

    #[test]
    fn set_payload_touches_updated_at() {
        let t0 = Utc::now();
        let mut record = EntityRecord::new("zone-1", EntityKind::Zone, json!({"area": 12}), t0);

        let t1 = t0 + chrono::Duration::seconds(5);
        record.set_payload(json!({"area": 14}), t1);

        assert_eq!(record.payload, json!({"area": 14}));
        assert_eq!(record.updated_at, t1);
    }

    #[test]
    fn tombstone() {
        let t0 = Utc::now();
        let mut record = EntityRecord::new("alert-1", EntityKind::Alert, json!({"level": "frost"}), t0);

        record.mark_deleted(t0 + chrono::Duration::seconds(1));
        assert!(!record.is_active());
    }

    #[test]
    fn acknowledge_sets_version() {
        let mut record =
            EntityRecord::new("h-1", EntityKind::Harvest, json!({"kg": 3.5}), Utc::now());
        record.acknowledge(7);
        assert_eq!(record.sync_version, Some(7));
    }

    #[test]
    fn serialization_roundtrip() {
        let record = EntityRecord::new(
            "parcel-1",
            EntityKind::LandParcel,
            json!({"name": "North field", "hectares": 2.4}),
            Utc::now(),
        );

        let json = serde_json::to_string(&record).unwrap();
        let parsed: EntityRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, parsed);
    }
}
