//! Conflict detection and resolution.
//!
//! When a push or pull finds that the remote version advanced past an
//! outbox entry's base, the divergence is adjudicated with a three-way
//! field comparison against the payload the entry was based on:
//!
//! - the local change turned out to be a no-op → accept remote, settle;
//! - the two sides touched disjoint fields → auto-merge, local on top;
//! - the same field diverged → raise a [`ConflictRecord`] for the user.
//!
//! Resolution is a pure decision function; all IO stays in the engine.

use crate::{
    entity::EntityKind,
    outbox::{OutboxEntry, OutboxOp},
    EntityId, SyncVersion, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// The remote side of an adjudication, as seen at detection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSnapshot {
    /// Remote payload; `None` when the remote record is deleted
    pub payload: Option<Value>,
    /// Remote version at detection time
    pub version: SyncVersion,
    /// Remote modification time
    pub updated_at: Timestamp,
}

/// A divergence awaiting manual resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    /// Collection of the contested entity
    pub kind: EntityKind,
    /// Contested entity
    pub entity_id: EntityId,
    /// What the local edit wanted; `None` for a local delete
    pub local_payload: Option<Value>,
    /// What the remote holds; `None` when the remote deleted the record
    pub remote_payload: Option<Value>,
    /// Common ancestor payload, when known
    pub base_payload: Option<Value>,
    /// Remote version the resolution must be based on
    pub remote_version: SyncVersion,
    /// When the losing local edit was made
    pub local_updated_at: Timestamp,
    /// When the remote record was last modified
    pub remote_updated_at: Timestamp,
    /// When the divergence was detected
    pub detected_at: Timestamp,
    /// Set once the user (or policy) has chosen an outcome
    pub resolved: bool,
}

/// How base/local/remote payloads relate, field by field.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Neither side effectively changed anything
    Unchanged,
    /// Only the local side changed fields
    LocalOnly,
    /// Only the remote side changed fields; the local edit is a no-op
    RemoteOnly,
    /// Both changed, but different fields; `merged` carries local on top
    Disjoint { merged: Value },
    /// Both changed at least one common field to different values
    Overlapping { fields: Vec<String> },
}

/// Verdict for an outbox entry whose remote counterpart advanced.
#[derive(Debug, Clone, PartialEq)]
pub enum Adjudication {
    /// The local change is already reflected remotely; settle the entry
    /// and accept the remote payload.
    LocalNoOp,
    /// Remote advanced without touching the locally changed fields; the
    /// entry is rebased to `merged` (`None` keeps a local delete).
    AutoMerge { merged: Option<Value> },
    /// Manual resolution required.
    Conflict(ConflictRecord),
}

/// User (or policy) choice for resolving a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "choice", content = "payload", rename_all = "camelCase")]
pub enum ResolutionChoice {
    /// Re-enqueue the local payload on top of the remote version
    KeepLocal,
    /// Discard the local edit and accept the remote payload
    KeepRemote,
    /// Enqueue a caller-supplied merged payload
    Merged(Value),
}

/// Effect of a resolution choice, to be executed by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Enqueue a fresh outbox entry rebased onto the remote version.
    Requeue {
        payload: Option<Value>,
        base_version: Option<SyncVersion>,
        base_payload: Option<Value>,
    },
    /// Drop the pending local edit and write the remote payload locally.
    AcceptRemote,
}

/// Keys whose value differs between `base` and `next`, including keys that
/// were added or removed. Non-object payloads compare as one atomic field.
fn changed_keys(base: Option<&Value>, next: &Value) -> BTreeSet<String> {
    match (base.and_then(Value::as_object), next.as_object()) {
        (Some(b), Some(n)) => {
            let mut keys = BTreeSet::new();
            for (k, v) in n {
                if b.get(k) != Some(v) {
                    keys.insert(k.clone());
                }
            }
            for k in b.keys() {
                if !n.contains_key(k) {
                    keys.insert(k.clone());
                }
            }
            keys
        }
        (None, Some(n)) => n.keys().cloned().collect(),
        _ => {
            let mut keys = BTreeSet::new();
            if base != Some(next) {
                keys.insert("$value".to_string());
            }
            keys
        }
    }
}

/// Three-way comparison of a base payload against local and remote edits.
pub fn classify(base: Option<&Value>, local: &Value, remote: &Value) -> Classification {
    if local == remote {
        // Both sides arrived at the same state; nothing to reconcile.
        return if base == Some(local) {
            Classification::Unchanged
        } else {
            Classification::RemoteOnly
        };
    }

    let local_changed = changed_keys(base, local);
    let remote_changed = changed_keys(base, remote);

    if local_changed.is_empty() {
        return Classification::RemoteOnly;
    }
    if remote_changed.is_empty() {
        return Classification::LocalOnly;
    }

    let overlap: Vec<String> = local_changed
        .intersection(&remote_changed)
        .filter(|k| {
            // Same field changed on both sides to the same value is fine.
            let lv = local.get(k.as_str());
            let rv = remote.get(k.as_str());
            lv != rv
        })
        .cloned()
        .collect();

    if !overlap.is_empty() {
        return Classification::Overlapping { fields: overlap };
    }

    // Disjoint: start from remote, then apply the local edits on top.
    let (Some(remote_obj), Some(local_obj)) = (remote.as_object(), local.as_object()) else {
        // Atomic payloads with both sides changed always overlap.
        return Classification::Overlapping {
            fields: vec!["$value".to_string()],
        };
    };
    let mut merged = remote_obj.clone();
    for key in &local_changed {
        match local_obj.get(key) {
            Some(v) => {
                merged.insert(key.clone(), v.clone());
            }
            None => {
                merged.remove(key);
            }
        }
    }
    Classification::Disjoint {
        merged: Value::Object(merged),
    }
}

/// Adjudicate an outbox entry against a remote record that advanced past
/// the entry's base version. Used on both push rejection and pull.
pub fn adjudicate(entry: &OutboxEntry, remote: &RemoteSnapshot, now: Timestamp) -> Adjudication {
    let conflict = |local_payload: Option<Value>| {
        Adjudication::Conflict(ConflictRecord {
            kind: entry.kind,
            entity_id: entry.entity_id.clone(),
            local_payload,
            remote_payload: remote.payload.clone(),
            base_payload: entry.base_payload.clone(),
            remote_version: remote.version,
            local_updated_at: entry.created_at,
            remote_updated_at: remote.updated_at,
            detected_at: now,
            resolved: false,
        })
    };

    let Some(remote_payload) = remote.payload.as_ref() else {
        // Remote deleted the record.
        return if entry.op == OutboxOp::Delete {
            Adjudication::LocalNoOp
        } else {
            conflict(entry.payload.clone())
        };
    };

    if entry.op == OutboxOp::Delete {
        // Delete vs remote edit: only a pure version bump merges cleanly.
        return if entry.base_payload.as_ref() == Some(remote_payload) {
            Adjudication::AutoMerge { merged: None }
        } else {
            conflict(None)
        };
    }

    // Create/update entries always carry a payload; a malformed entry
    // without one has nothing to push and settles as a no-op.
    let Some(local) = entry.payload.as_ref() else {
        return Adjudication::LocalNoOp;
    };

    match classify(entry.base_payload.as_ref(), local, remote_payload) {
        Classification::Unchanged | Classification::RemoteOnly => Adjudication::LocalNoOp,
        Classification::LocalOnly => Adjudication::AutoMerge {
            merged: Some(local.clone()),
        },
        Classification::Disjoint { merged } => Adjudication::AutoMerge {
            merged: Some(merged),
        },
        Classification::Overlapping { .. } => conflict(Some(local.clone())),
    }
}

/// Map a resolution choice onto its effect. Pure; the engine executes it.
pub fn resolve(conflict: &ConflictRecord, choice: ResolutionChoice) -> Resolution {
    match choice {
        ResolutionChoice::KeepLocal => Resolution::Requeue {
            payload: conflict.local_payload.clone(),
            base_version: Some(conflict.remote_version),
            base_payload: conflict.remote_payload.clone(),
        },
        ResolutionChoice::KeepRemote => Resolution::AcceptRemote,
        ResolutionChoice::Merged(payload) => Resolution::Requeue {
            payload: Some(payload),
            base_version: Some(conflict.remote_version),
            base_payload: conflict.remote_payload.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn update_entry(base: Value, local: Value) -> OutboxEntry {
        OutboxEntry::new(
            "e1",
            EntityKind::Zone,
            "z1",
            OutboxOp::Update,
            Some(local),
            Some(1),
            Some(base),
            Utc::now(),
        )
    }

    fn remote(payload: Value) -> RemoteSnapshot {
        RemoteSnapshot {
            payload: Some(payload),
            version: 2,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn classify_unchanged() {
        let base = json!({"a": 1});
        assert_eq!(
            classify(Some(&base), &base, &base),
            Classification::Unchanged
        );
    }

    #[test]
    fn classify_local_only() {
        let base = json!({"a": 1, "b": 2});
        let local = json!({"a": 9, "b": 2});
        assert_eq!(
            classify(Some(&base), &local, &base),
            Classification::LocalOnly
        );
    }

    #[test]
    fn classify_remote_only() {
        let base = json!({"a": 1, "b": 2});
        let remote = json!({"a": 1, "b": 7});
        assert_eq!(
            classify(Some(&base), &base, &remote),
            Classification::RemoteOnly
        );
    }

    #[test]
    fn classify_disjoint_merges_local_on_top() {
        let base = json!({"irrigation": 10, "notes": "", "crop": "maize"});
        let local = json!({"irrigation": 25, "notes": "", "crop": "maize"});
        let remote = json!({"irrigation": 10, "notes": "rained", "crop": "maize"});

        match classify(Some(&base), &local, &remote) {
            Classification::Disjoint { merged } => {
                assert_eq!(
                    merged,
                    json!({"irrigation": 25, "notes": "rained", "crop": "maize"})
                );
            }
            other => panic!("expected disjoint, got {other:?}"),
        }
    }

    #[test]
    fn classify_overlapping_names_the_field() {
        let base = json!({"irrigation": 10});
        let local = json!({"irrigation": 25});
        let remote = json!({"irrigation": 40});

        match classify(Some(&base), &local, &remote) {
            Classification::Overlapping { fields } => {
                assert_eq!(fields, vec!["irrigation".to_string()]);
            }
            other => panic!("expected overlap, got {other:?}"),
        }
    }

    #[test]
    fn classify_same_field_same_value_is_not_a_conflict() {
        let base = json!({"a": 1, "b": 1});
        let local = json!({"a": 2, "b": 5});
        let remote = json!({"a": 1, "b": 5});

        match classify(Some(&base), &local, &remote) {
            Classification::Disjoint { merged } => {
                assert_eq!(merged, json!({"a": 2, "b": 5}));
            }
            other => panic!("expected disjoint, got {other:?}"),
        }
    }

    #[test]
    fn classify_local_field_removal_survives_merge() {
        let base = json!({"a": 1, "note": "old"});
        let local = json!({"a": 1});
        let remote = json!({"a": 1, "note": "old", "b": 2});

        match classify(Some(&base), &local, &remote) {
            Classification::Disjoint { merged } => {
                assert_eq!(merged, json!({"a": 1, "b": 2}));
            }
            other => panic!("expected disjoint, got {other:?}"),
        }
    }

    #[test]
    fn classify_without_base_treats_all_fields_as_changed() {
        let local = json!({"a": 1});
        let remote = json!({"a": 2});
        assert!(matches!(
            classify(None, &local, &remote),
            Classification::Overlapping { .. }
        ));

        let local = json!({"a": 1});
        let remote = json!({"b": 2});
        match classify(None, &local, &remote) {
            Classification::Disjoint { merged } => {
                assert_eq!(merged, json!({"a": 1, "b": 2}));
            }
            other => panic!("expected disjoint, got {other:?}"),
        }
    }

    #[test]
    fn classify_non_object_payloads_are_atomic() {
        let base = json!(1);
        assert!(matches!(
            classify(Some(&base), &json!(2), &json!(3)),
            Classification::Overlapping { .. }
        ));
        assert_eq!(
            classify(Some(&base), &json!(2), &json!(1)),
            Classification::LocalOnly
        );
    }

    #[test]
    fn adjudicate_noop_settles() {
        let base = json!({"a": 1});
        let entry = update_entry(base.clone(), base.clone());
        let verdict = adjudicate(&entry, &remote(json!({"a": 5})), Utc::now());
        assert_eq!(verdict, Adjudication::LocalNoOp);
    }

    #[test]
    fn adjudicate_disjoint_auto_merges() {
        let entry = update_entry(json!({"a": 1, "b": 1}), json!({"a": 2, "b": 1}));
        let verdict = adjudicate(&entry, &remote(json!({"a": 1, "b": 9})), Utc::now());
        assert_eq!(
            verdict,
            Adjudication::AutoMerge {
                merged: Some(json!({"a": 2, "b": 9}))
            }
        );
    }

    #[test]
    fn adjudicate_overlap_raises_conflict() {
        let entry = update_entry(json!({"a": 1}), json!({"a": 2}));
        let verdict = adjudicate(&entry, &remote(json!({"a": 3})), Utc::now());

        match verdict {
            Adjudication::Conflict(c) => {
                assert_eq!(c.kind, EntityKind::Zone);
                assert_eq!(c.entity_id, "z1");
                assert_eq!(c.local_payload, Some(json!({"a": 2})));
                assert_eq!(c.remote_payload, Some(json!({"a": 3})));
                assert_eq!(c.remote_version, 2);
                assert!(!c.resolved);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn adjudicate_delete_vs_remote_edit_conflicts() {
        let entry = OutboxEntry::new(
            "e1",
            EntityKind::Zone,
            "z1",
            OutboxOp::Delete,
            None,
            Some(1),
            Some(json!({"a": 1})),
            Utc::now(),
        );
        let verdict = adjudicate(&entry, &remote(json!({"a": 2})), Utc::now());
        assert!(matches!(verdict, Adjudication::Conflict(_)));
    }

    #[test]
    fn adjudicate_delete_vs_version_bump_merges() {
        let entry = OutboxEntry::new(
            "e1",
            EntityKind::Zone,
            "z1",
            OutboxOp::Delete,
            None,
            Some(1),
            Some(json!({"a": 1})),
            Utc::now(),
        );
        let verdict = adjudicate(&entry, &remote(json!({"a": 1})), Utc::now());
        assert_eq!(verdict, Adjudication::AutoMerge { merged: None });
    }

    #[test]
    fn adjudicate_both_deleted_is_noop() {
        let entry = OutboxEntry::new(
            "e1",
            EntityKind::Zone,
            "z1",
            OutboxOp::Delete,
            None,
            Some(1),
            Some(json!({"a": 1})),
            Utc::now(),
        );
        let gone = RemoteSnapshot {
            payload: None,
            version: 3,
            updated_at: Utc::now(),
        };
        assert_eq!(adjudicate(&entry, &gone, Utc::now()), Adjudication::LocalNoOp);
    }

    #[test]
    fn adjudicate_edit_vs_remote_delete_conflicts() {
        let entry = update_entry(json!({"a": 1}), json!({"a": 2}));
        let gone = RemoteSnapshot {
            payload: None,
            version: 3,
            updated_at: Utc::now(),
        };
        match adjudicate(&entry, &gone, Utc::now()) {
            Adjudication::Conflict(c) => assert!(c.remote_payload.is_none()),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    fn sample_conflict() -> ConflictRecord {
        ConflictRecord {
            kind: EntityKind::Zone,
            entity_id: "z1".into(),
            local_payload: Some(json!({"a": 2})),
            remote_payload: Some(json!({"a": 3})),
            base_payload: Some(json!({"a": 1})),
            remote_version: 7,
            local_updated_at: Utc::now(),
            remote_updated_at: Utc::now(),
            detected_at: Utc::now(),
            resolved: false,
        }
    }

    #[test]
    fn resolve_keep_local_requeues_on_remote_base() {
        let conflict = sample_conflict();
        let resolution = resolve(&conflict, ResolutionChoice::KeepLocal);
        assert_eq!(
            resolution,
            Resolution::Requeue {
                payload: Some(json!({"a": 2})),
                base_version: Some(7),
                base_payload: Some(json!({"a": 3})),
            }
        );
    }

    #[test]
    fn resolve_keep_remote_accepts() {
        let conflict = sample_conflict();
        assert_eq!(
            resolve(&conflict, ResolutionChoice::KeepRemote),
            Resolution::AcceptRemote
        );
    }

    #[test]
    fn resolve_merged_requeues_caller_payload() {
        let conflict = sample_conflict();
        let resolution = resolve(&conflict, ResolutionChoice::Merged(json!({"a": 5})));
        match resolution {
            Resolution::Requeue { payload, base_version, .. } => {
                assert_eq!(payload, Some(json!({"a": 5})));
                assert_eq!(base_version, Some(7));
            }
            other => panic!("expected requeue, got {other:?}"),
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_payload() -> impl Strategy<Value = Value> {
            proptest::collection::btree_map("[a-d]", 0i64..5, 0..4)
                .prop_map(|m| json!(m))
        }

        proptest! {
            #[test]
            fn prop_classify_is_deterministic(
                base in arb_payload(),
                local in arb_payload(),
                remote in arb_payload(),
            ) {
                let first = classify(Some(&base), &local, &remote);
                let second = classify(Some(&base), &local, &remote);
                prop_assert_eq!(first, second);
            }

            #[test]
            fn prop_merge_preserves_local_changes(
                base in arb_payload(),
                local in arb_payload(),
                remote in arb_payload(),
            ) {
                if let Classification::Disjoint { merged } =
                    classify(Some(&base), &local, &remote)
                {
                    for key in changed_keys(Some(&base), &local) {
                        prop_assert_eq!(merged.get(&key), local.get(&key));
                    }
                }
            }
        }
    }
}
