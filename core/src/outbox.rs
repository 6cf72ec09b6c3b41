//! The outbox: an ordered log of local mutations awaiting push.
//!
//! The outbox is independent of the current-value store. A record can be
//! mutated locally many times before any push succeeds; rapid successive
//! edits coalesce into one entry, but entries for the same entity are
//! always pushed in creation order (per-id causal ordering). Entries for
//! different entities may be in flight concurrently.

use crate::{
    entity::EntityKind,
    error::Result,
    retry::{RetryDecision, RetryPolicy},
    EntityId, Error, OutboxEntryId, SyncVersion, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The mutation an outbox entry carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxOp {
    Create,
    Update,
    Delete,
}

/// Lifecycle state of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryStatus {
    /// Waiting to be pushed (or waiting for its retry time)
    Pending,
    /// A push is currently on the wire
    InFlight,
    /// Acknowledged by the remote store; retained until purge
    Complete,
    /// Retries exhausted or remote rejected; needs user attention
    FailedPermanent,
}

/// One queued mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    /// Stable identifier; doubles as the idempotency key sent to the remote
    pub id: OutboxEntryId,
    /// Collection of the target entity
    pub kind: EntityKind,
    /// Target entity
    pub entity_id: EntityId,
    /// Mutation type
    pub op: OutboxOp,
    /// Payload snapshot to push; `None` for deletes
    pub payload: Option<serde_json::Value>,
    /// Remote version this mutation is based on; `None` for creates
    pub base_version: Option<SyncVersion>,
    /// Payload as of enqueue time, for three-way conflict comparison
    pub base_payload: Option<serde_json::Value>,
    /// When the entry was enqueued
    pub created_at: Timestamp,
    /// Failed push attempts so far
    pub attempts: u32,
    /// Earliest time the next attempt may run; `None` means immediately
    pub next_retry_at: Option<Timestamp>,
    /// Lifecycle state
    pub status: EntryStatus,
    /// Message from the most recent failure
    pub last_error: Option<String>,
    /// When the entry reached `Complete`
    pub completed_at: Option<Timestamp>,
}

impl OutboxEntry {
    /// Create a fresh pending entry.
    pub fn new(
        id: impl Into<OutboxEntryId>,
        kind: EntityKind,
        entity_id: impl Into<EntityId>,
        op: OutboxOp,
        payload: Option<serde_json::Value>,
        base_version: Option<SyncVersion>,
        base_payload: Option<serde_json::Value>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            entity_id: entity_id.into(),
            op,
            payload,
            base_version,
            base_payload,
            created_at: now,
            attempts: 0,
            next_retry_at: None,
            status: EntryStatus::Pending,
            last_error: None,
            completed_at: None,
        }
    }

    fn key(&self) -> (EntityKind, &str) {
        (self.kind, self.entity_id.as_str())
    }

    /// Whether this entry may be attempted at `now`.
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.status == EntryStatus::Pending
            && self.next_retry_at.map_or(true, |at| at <= now)
    }
}

/// Outcome of an enqueue, reported for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new entry was appended
    Appended,
    /// The mutation was folded into an existing pending entry
    Coalesced,
    /// A delete met a never-pushed create; both vanished
    Cancelled,
}

/// Outcome of recording a push failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The entry stays pending and retries at the given time
    WillRetry(Timestamp),
    /// Retries exhausted; the entry is now permanently failed
    Permanent,
}

/// The ordered mutation log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outbox {
    entries: Vec<OutboxEntry>,
}

impl Outbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries, preserving order.
    pub fn from_entries(entries: Vec<OutboxEntry>) -> Self {
        Self { entries }
    }

    /// All entries in creation order.
    pub fn entries(&self) -> &[OutboxEntry] {
        &self.entries
    }

    /// Look up an entry by id.
    pub fn get(&self, id: &str) -> Option<&OutboxEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut OutboxEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::EntryNotFound(id.to_string()))
    }

    /// Enqueue a mutation, applying the coalescing rules:
    ///
    /// - a new mutation for an entity with a prior entry still `Pending`
    ///   replaces that entry's payload instead of appending;
    /// - a delete supersedes and removes every prior pending create/update;
    /// - a delete over a pending, never-pushed create cancels both;
    /// - a create over a pending delete folds into one update (the remote
    ///   record still exists) rather than a delete carrying a payload.
    ///
    /// Entries already in flight are never touched; the new mutation chains
    /// behind them.
    pub fn enqueue(&mut self, entry: OutboxEntry) -> EnqueueOutcome {
        if entry.op == OutboxOp::Delete {
            let mut cancelled = false;
            let mut removed = 0;
            self.entries.retain(|e| {
                let superseded = e.key() == entry.key() && e.status == EntryStatus::Pending;
                if superseded {
                    removed += 1;
                    cancelled |= e.op == OutboxOp::Create;
                }
                !superseded
            });
            // A pending create means nothing for this entity ever reached
            // the remote, so the whole lineage vanishes.
            if cancelled {
                return EnqueueOutcome::Cancelled;
            }
            self.entries.push(entry);
            return if removed > 0 {
                EnqueueOutcome::Coalesced
            } else {
                EnqueueOutcome::Appended
            };
        }

        // Coalesce into the newest pending entry. An older pending entry
        // can coexist when an in-flight push fell back to pending after a
        // successor was appended; folding into the older one would push
        // the final payload first and a stale one last.
        let prior = self
            .entries
            .iter()
            .rposition(|e| e.key() == entry.key() && e.status == EntryStatus::Pending);

        match prior {
            Some(idx) => {
                let existing = &mut self.entries[idx];
                if existing.op == OutboxOp::Delete {
                    // Re-creation after an unpushed delete: the remote
                    // record still exists, so this travels as an update on
                    // the delete's base.
                    existing.op = if existing.base_version.is_some() {
                        OutboxOp::Update
                    } else {
                        OutboxOp::Create
                    };
                }
                // Otherwise keep the original op: a create edited before
                // its first push is still a create from the remote's point
                // of view.
                existing.payload = entry.payload;
                EnqueueOutcome::Coalesced
            }
            None => {
                self.entries.push(entry);
                EnqueueOutcome::Appended
            }
        }
    }

    /// The oldest retry-due pending entry whose entity has no earlier
    /// unsettled entry and no unresolved conflict.
    pub fn next_ready<'a>(
        &'a self,
        now: Timestamp,
        blocked: &'a HashSet<(EntityKind, EntityId)>,
    ) -> Option<&'a OutboxEntry> {
        self.ready_iter(now, blocked).next()
    }

    /// Up to `limit` ready entry ids, at most one per entity.
    pub fn ready_batch(
        &self,
        now: Timestamp,
        limit: usize,
        blocked: &HashSet<(EntityKind, EntityId)>,
    ) -> Vec<OutboxEntryId> {
        self.ready_iter(now, blocked)
            .take(limit)
            .map(|e| e.id.clone())
            .collect()
    }

    fn ready_iter<'a>(
        &'a self,
        now: Timestamp,
        blocked: &'a HashSet<(EntityKind, EntityId)>,
    ) -> impl Iterator<Item = &'a OutboxEntry> {
        self.entries.iter().enumerate().filter_map(move |(i, e)| {
            if !e.is_due(now) {
                return None;
            }
            if blocked.contains(&(e.kind, e.entity_id.clone())) {
                return None;
            }
            // Per-id causal order: an earlier entry for the same entity
            // must settle (complete or be abandoned) first.
            let held_back = self.entries[..i].iter().any(|p| {
                p.key() == e.key()
                    && matches!(p.status, EntryStatus::Pending | EntryStatus::InFlight)
            });
            if held_back {
                None
            } else {
                Some(e)
            }
        })
    }

    /// Transition an entry to `InFlight`.
    pub fn mark_in_flight(&mut self, id: &str) -> Result<()> {
        let entry = self.get_mut(id)?;
        if entry.status != EntryStatus::Pending {
            return Err(Error::InvalidState(format!(
                "cannot mark {:?} entry in flight: {}",
                entry.status, entry.id
            )));
        }
        entry.status = EntryStatus::InFlight;
        Ok(())
    }

    /// Transition an entry to `Complete`.
    pub fn mark_complete(&mut self, id: &str, now: Timestamp) -> Result<()> {
        let entry = self.get_mut(id)?;
        entry.status = EntryStatus::Complete;
        entry.completed_at = Some(now);
        entry.next_retry_at = None;
        Ok(())
    }

    /// Record a failed attempt. Increments `attempts` and either schedules
    /// the next retry per the policy or fails the entry permanently.
    pub fn record_failure(
        &mut self,
        id: &str,
        error: impl Into<String>,
        policy: &RetryPolicy,
        now: Timestamp,
    ) -> Result<FailureOutcome> {
        let entry = self.get_mut(id)?;
        entry.attempts += 1;
        entry.last_error = Some(error.into());
        match policy.next_attempt(now, entry.attempts) {
            RetryDecision::RetryAt(at) => {
                entry.status = EntryStatus::Pending;
                entry.next_retry_at = Some(at);
                Ok(FailureOutcome::WillRetry(at))
            }
            RetryDecision::GiveUp => {
                entry.status = EntryStatus::FailedPermanent;
                entry.next_retry_at = None;
                Ok(FailureOutcome::Permanent)
            }
        }
    }

    /// Fail an entry immediately, bypassing the retry schedule. Used for
    /// permanent remote rejections.
    pub fn fail_permanent(&mut self, id: &str, error: impl Into<String>) -> Result<()> {
        let entry = self.get_mut(id)?;
        entry.status = EntryStatus::FailedPermanent;
        entry.last_error = Some(error.into());
        entry.next_retry_at = None;
        Ok(())
    }

    /// Return a single in-flight entry to `Pending` without penalty. Used
    /// when its push was answered with a conflict: the entry is held, not
    /// failed, until the conflict is resolved.
    pub fn mark_pending(&mut self, id: &str) -> Result<()> {
        let entry = self.get_mut(id)?;
        entry.status = EntryStatus::Pending;
        Ok(())
    }

    /// Revert every in-flight entry to `Pending` without penalty. Called
    /// when connectivity drops mid-push.
    pub fn revert_in_flight(&mut self) -> usize {
        let mut reverted = 0;
        for entry in &mut self.entries {
            if entry.status == EntryStatus::InFlight {
                entry.status = EntryStatus::Pending;
                reverted += 1;
            }
        }
        reverted
    }

    /// Replace an entry's payload and base after an auto-merge against a
    /// newer remote version. The entry becomes immediately due again.
    pub fn rebase(
        &mut self,
        id: &str,
        payload: Option<serde_json::Value>,
        base_version: Option<SyncVersion>,
        base_payload: Option<serde_json::Value>,
    ) -> Result<()> {
        let entry = self.get_mut(id)?;
        entry.payload = payload;
        entry.base_version = base_version;
        entry.base_payload = base_payload;
        if entry.op == OutboxOp::Create && base_version.is_some() {
            // The record exists remotely after all.
            entry.op = OutboxOp::Update;
        }
        entry.next_retry_at = None;
        entry.status = EntryStatus::Pending;
        Ok(())
    }

    /// Drop pending entries for an entity (keep-remote resolution).
    pub fn discard_pending_for(&mut self, kind: EntityKind, entity_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| {
            !(e.kind == kind
                && e.entity_id == entity_id
                && matches!(e.status, EntryStatus::Pending | EntryStatus::InFlight))
        });
        before - self.entries.len()
    }

    /// Whether the entity has an unsettled (pending or in-flight) entry.
    pub fn has_pending_for(&self, kind: EntityKind, entity_id: &str) -> bool {
        self.entries.iter().any(|e| {
            e.kind == kind
                && e.entity_id == entity_id
                && matches!(e.status, EntryStatus::Pending | EntryStatus::InFlight)
        })
    }

    /// Latest unsettled entry for an entity, if any.
    pub fn pending_for(&self, kind: EntityKind, entity_id: &str) -> Option<&OutboxEntry> {
        self.entries.iter().rev().find(|e| {
            e.kind == kind
                && e.entity_id == entity_id
                && matches!(e.status, EntryStatus::Pending | EntryStatus::InFlight)
        })
    }

    /// Entries still waiting to reach the remote (pending + in-flight).
    /// Permanently failed entries are excluded; they no longer retry.
    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::Pending | EntryStatus::InFlight))
            .count()
    }

    /// Permanently failed entries needing user attention.
    pub fn failed_count(&self) -> usize {
        self.failed_entries().count()
    }

    /// Permanently failed entries, oldest first, with their last error.
    pub fn failed_entries(&self) -> impl Iterator<Item = &OutboxEntry> {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::FailedPermanent)
    }

    /// Remove completed entries older than `cutoff`. Returns removed count.
    pub fn purge_completed_before(&mut self, cutoff: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| {
            !(e.status == EntryStatus::Complete
                && e.completed_at.map_or(false, |at| at < cutoff))
        });
        before - self.entries.len()
    }
}
