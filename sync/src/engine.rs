//! The sync engine.
//!
//! One engine instance per client process orchestrates the whole cycle:
//! pull remote deltas, merge them into local storage, drain the outbox
//! with bounded fan-out, adjudicate conflicts, retry failures on the
//! backoff schedule, and purge settled history.
//!
//! Triggers (connectivity changes, local mutations, the periodic timer,
//! manual requests) are coalesced: at most one cycle runs at a time, and
//! a trigger arriving mid-cycle schedules exactly one follow-up cycle.
//! Transport and storage failures never escape to the caller of a trigger;
//! they surface only through the [`SyncStatus`] snapshot.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::monitor::OnlineMonitor;
use crate::remote::{PushOutcome, PushRequest, RemoteEndpoint, RemoteError, RemoteRecord};
use crate::store::{EntityStore, SyncStateStore};
use chrono::Utc;
use furrow_core::{
    adjudicate, resolve, Adjudication, ConflictRecord, EntityId, EntityKind, EntityRecord,
    OutboxEntry, OutboxOp, Resolution, ResolutionChoice, SyncState,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Notify};
use uuid::Uuid;

/// Snapshot of the engine for the UI layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Remote reachability, per the online monitor
    pub is_online: bool,
    /// Whether a cycle is currently running
    pub is_syncing: bool,
    /// Mutations still waiting to reach the remote (will retry)
    pub pending_count: usize,
    /// Mutations that exhausted retries or were rejected; need attention
    pub failed_count: usize,
    /// The failed mutations themselves, for manual remediation
    pub failed: Vec<FailedMutation>,
    /// Unresolved conflicts awaiting a [`ResolutionChoice`]
    pub conflicts: Vec<ConflictRecord>,
}

/// A mutation that will never be retried: its entity, what it tried to
/// do, and the error that stopped it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedMutation {
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub op: OutboxOp,
    pub error: Option<String>,
}

/// The single sync orchestrator for a client process.
pub struct SyncEngine<S, R> {
    store: Arc<S>,
    remote: Arc<R>,
    monitor: OnlineMonitor,
    config: SyncConfig,
    /// All mutable sync state, behind one lock. Mutation methods and the
    /// cycle both take it, so queue/version reads around each network
    /// round trip always see concurrent local edits.
    state: Mutex<SyncState>,
    /// Reentrancy guard: at most one cycle at a time
    cycle_guard: Mutex<()>,
    /// A trigger arrived; run (another) cycle
    rerun: AtomicBool,
    wakeup: Notify,
    syncing: AtomicBool,
    status_tx: watch::Sender<SyncStatus>,
}

impl<S, R> SyncEngine<S, R>
where
    S: EntityStore + SyncStateStore,
    R: RemoteEndpoint,
{
    /// Create an engine. Call [`SyncEngine::init`] before use.
    pub fn new(store: Arc<S>, remote: Arc<R>, monitor: OnlineMonitor, config: SyncConfig) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::default());
        Self {
            store,
            remote,
            monitor,
            config,
            state: Mutex::new(SyncState::new()),
            cycle_guard: Mutex::new(()),
            rerun: AtomicBool::new(false),
            wakeup: Notify::new(),
            syncing: AtomicBool::new(false),
            status_tx,
        }
    }

    /// Load persisted sync state and recover from interruptions.
    ///
    /// Entries left in flight by a crashed process are reverted to pending
    /// without penalty (pushes are idempotent via their entry id). Local
    /// records that were written without a matching outbox entry are
    /// logged as integrity warnings and treated as trusted local state;
    /// they are never silently re-pushed.
    pub async fn init(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        if let Some(loaded) = self.store.load_sync_state().await? {
            *state = loaded;
        }

        let reverted = state.outbox.revert_in_flight();
        if reverted > 0 {
            tracing::info!(reverted, "reverted in-flight entries from a previous run");
        }

        for kind in EntityKind::ALL {
            for record in self.store.list(kind).await? {
                if record.sync_version.is_none()
                    && record.is_active()
                    && !state.outbox.has_pending_for(kind, &record.id)
                {
                    tracing::warn!(
                        kind = %kind,
                        id = %record.id,
                        "storage integrity warning: record has neither an \
                         acknowledged version nor an outbox entry; keeping as-is"
                    );
                }
            }
        }

        self.publish(&state);
        Ok(())
    }

    /// Flush sync state to storage. Call before the process exits.
    pub async fn shutdown(&self) -> Result<()> {
        let state = self.state.lock().await;
        self.persist(&state).await
    }

    /// Current status snapshot.
    pub fn status(&self) -> SyncStatus {
        self.status_tx.borrow().clone()
    }

    /// Watch status changes.
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// The engine's online monitor, for feeding platform connectivity
    /// signals and spawning the probe loop.
    pub fn monitor(&self) -> &OnlineMonitor {
        &self.monitor
    }

    /// Create a record locally and queue it for push.
    pub async fn create(
        &self,
        kind: EntityKind,
        id: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        // Re-creating over a tombstone revives the record and keeps its
        // acknowledged version; the outbox folds the mutation into the
        // pending delete so it travels as a single update.
        let record = match self.store.get(kind, id).await? {
            Some(mut existing) => {
                existing.set_payload(payload.clone(), now);
                existing.deleted = false;
                existing
            }
            None => EntityRecord::new(id, kind, payload.clone(), now),
        };
        let base_version = record.sync_version;
        self.store.put(record).await?;

        state.outbox.enqueue(OutboxEntry::new(
            Uuid::new_v4().to_string(),
            kind,
            id,
            OutboxOp::Create,
            Some(payload),
            base_version,
            None,
            now,
        ));

        self.after_mutation(&mut state).await;
        Ok(())
    }

    /// Update a record locally and queue the change for push.
    pub async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let mut record = self
            .store
            .get(kind, id)
            .await?
            .filter(EntityRecord::is_active)
            .ok_or_else(|| SyncError::RecordNotFound {
                kind,
                id: id.to_string(),
            })?;

        let base_payload = record.payload.clone();
        let base_version = record.sync_version;
        record.set_payload(payload.clone(), now);
        self.store.put(record).await?;

        state.outbox.enqueue(OutboxEntry::new(
            Uuid::new_v4().to_string(),
            kind,
            id,
            OutboxOp::Update,
            Some(payload),
            base_version,
            Some(base_payload),
            now,
        ));

        self.after_mutation(&mut state).await;
        Ok(())
    }

    /// Delete a record locally and queue the deletion for push.
    ///
    /// A delete over a never-pushed create cancels both: the record is
    /// erased outright and nothing travels.
    pub async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let mut record = self
            .store
            .get(kind, id)
            .await?
            .filter(EntityRecord::is_active)
            .ok_or_else(|| SyncError::RecordNotFound {
                kind,
                id: id.to_string(),
            })?;

        let outcome = state.outbox.enqueue(OutboxEntry::new(
            Uuid::new_v4().to_string(),
            kind,
            id,
            OutboxOp::Delete,
            None,
            record.sync_version,
            Some(record.payload.clone()),
            now,
        ));

        if outcome == furrow_core::EnqueueOutcome::Cancelled {
            self.store.delete(kind, id).await?;
        } else {
            record.mark_deleted(now);
            self.store.put(record).await?;
        }

        self.after_mutation(&mut state).await;
        Ok(())
    }

    /// Resolve an unresolved conflict for an entity.
    pub async fn resolve_conflict(
        &self,
        kind: EntityKind,
        entity_id: &str,
        choice: ResolutionChoice,
    ) -> Result<()> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let idx = state
            .conflicts
            .iter()
            .position(|c| c.kind == kind && c.entity_id == entity_id && !c.resolved)
            .ok_or_else(|| {
                SyncError::Core(furrow_core::Error::ConflictNotFound(entity_id.to_string()))
            })?;
        let conflict = state.conflicts[idx].clone();

        match resolve(&conflict, choice) {
            Resolution::AcceptRemote => {
                state.outbox.discard_pending_for(kind, entity_id);
                match &conflict.remote_payload {
                    Some(payload) => {
                        self.store
                            .put(EntityRecord {
                                id: entity_id.to_string(),
                                kind,
                                payload: payload.clone(),
                                updated_at: conflict.remote_updated_at,
                                sync_version: Some(conflict.remote_version),
                                deleted: false,
                            })
                            .await?;
                    }
                    None => self.store.delete(kind, entity_id).await?,
                }
            }
            Resolution::Requeue {
                payload,
                base_version,
                base_payload,
            } => {
                state.outbox.discard_pending_for(kind, entity_id);
                let op = match (&payload, base_version) {
                    (None, _) => OutboxOp::Delete,
                    (Some(_), None) => OutboxOp::Create,
                    (Some(_), Some(_)) => OutboxOp::Update,
                };
                state.outbox.enqueue(OutboxEntry::new(
                    Uuid::new_v4().to_string(),
                    kind,
                    entity_id,
                    op,
                    payload.clone(),
                    base_version,
                    base_payload,
                    now,
                ));

                match payload {
                    Some(p) => {
                        self.store
                            .put(EntityRecord {
                                id: entity_id.to_string(),
                                kind,
                                payload: p,
                                updated_at: now,
                                sync_version: base_version,
                                deleted: false,
                            })
                            .await?;
                    }
                    None => {
                        if let Some(mut record) = self.store.get(kind, entity_id).await? {
                            record.mark_deleted(now);
                            self.store.put(record).await?;
                        }
                    }
                }
            }
        }

        state.conflicts[idx].resolved = true;
        tracing::info!(kind = %kind, id = %entity_id, "conflict resolved");

        self.after_mutation(&mut state).await;
        Ok(())
    }

    /// Request a sync cycle. Requests are coalesced into at most one
    /// follow-up run.
    pub fn request_sync(&self) {
        self.rerun.store(true, Ordering::SeqCst);
        self.wakeup.notify_one();
    }

    /// Run one sync cycle now (or fold into a cycle already running),
    /// returning the resulting status. Never fails: transport and storage
    /// errors become outbox status changes.
    pub async fn sync_now(&self) -> SyncStatus {
        loop {
            let Ok(guard) = self.cycle_guard.try_lock() else {
                // A cycle is in progress; it will run once more when done.
                self.rerun.store(true, Ordering::SeqCst);
                return self.status();
            };
            self.rerun.store(false, Ordering::SeqCst);
            self.run_cycle().await;
            drop(guard);

            if !self.rerun.swap(false, Ordering::SeqCst) {
                return self.status();
            }
        }
    }

    /// Event loop: reacts to sync requests, connectivity transitions, and
    /// the periodic timer. Runs until the task is dropped.
    pub async fn run(&self) {
        let mut online_rx = self.monitor.subscribe();
        let mut ticker = tokio::time::interval(self.config.sync_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.wakeup.notified() => {}
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        continue;
                    }
                    let online = *online_rx.borrow_and_update();
                    if !online {
                        // Abort in-flight work and suspend; offline
                        // aborts carry no retry penalty.
                        let mut state = self.state.lock().await;
                        let reverted = state.outbox.revert_in_flight();
                        if reverted > 0 {
                            tracing::info!(reverted, "offline: reverted in-flight pushes");
                        }
                        self.publish(&state);
                        continue;
                    }
                    tracing::debug!("online transition, starting sync cycle");
                }
                _ = ticker.tick() => {}
            }
            self.sync_now().await;
        }
    }

    // ------------------------------------------------------------------
    // Cycle phases
    // ------------------------------------------------------------------

    async fn run_cycle(&self) {
        if !self.monitor.is_online() {
            tracing::debug!("offline: skipping sync cycle");
            return;
        }

        self.syncing.store(true, Ordering::SeqCst);
        {
            let state = self.state.lock().await;
            self.publish(&state);
        }

        if self.pull_phase().await {
            self.push_phase().await;
        }
        self.purge_phase().await;

        let state = self.state.lock().await;
        if let Err(err) = self.persist(&state).await {
            tracing::error!(error = %err, "failed to persist sync state");
        }
        self.syncing.store(false, Ordering::SeqCst);
        self.publish(&state);
    }

    /// Pull remote deltas for every kind. Returns false if the cycle
    /// should stop early (transport failure).
    async fn pull_phase(&self) -> bool {
        for kind in EntityKind::ALL {
            let since = self.state.lock().await.cursors.get(kind);

            let response = match self.remote.pull(kind, since).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(kind = %kind, error = %err, "pull failed; aborting cycle");
                    return false;
                }
            };

            let pulled = response.records.len();
            for record in response.records {
                if let Err(err) = self.apply_remote(kind, record).await {
                    tracing::error!(kind = %kind, error = %err, "failed to apply pulled record");
                    return false;
                }
            }

            let mut state = self.state.lock().await;
            state.cursors.advance(kind, response.cursor);
            if pulled > 0 {
                tracing::debug!(kind = %kind, records = pulled, "pulled remote changes");
            }
        }
        true
    }

    /// Merge one pulled record: blind overwrite when no local change is
    /// pending, three-way adjudication otherwise.
    async fn apply_remote(&self, kind: EntityKind, record: RemoteRecord) -> Result<()> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let Some(entry) = state.outbox.pending_for(kind, &record.id).cloned() else {
            self.write_remote(kind, &record).await?;
            return Ok(());
        };

        match adjudicate(&entry, &record.snapshot(), now) {
            Adjudication::LocalNoOp => {
                state.outbox.discard_pending_for(kind, &record.id);
                self.write_remote(kind, &record).await?;
            }
            Adjudication::AutoMerge { merged } => {
                state.outbox.rebase(
                    &entry.id,
                    merged.clone(),
                    Some(record.version),
                    record.payload.clone(),
                )?;
                if let Some(payload) = merged {
                    self.store
                        .put(EntityRecord {
                            id: record.id.clone(),
                            kind,
                            payload,
                            updated_at: now,
                            sync_version: Some(record.version),
                            deleted: false,
                        })
                        .await?;
                }
                // A rebased delete leaves the local tombstone in place.
            }
            Adjudication::Conflict(conflict) => {
                tracing::warn!(kind = %kind, id = %conflict.entity_id, "conflict detected on pull");
                upsert_conflict(&mut state.conflicts, conflict);
            }
        }
        Ok(())
    }

    /// Drain the outbox with bounded fan-out, one entry per entity at a
    /// time. Completions are reconciled sequentially on this flow.
    async fn push_phase(&self) {
        loop {
            if !self.monitor.is_online() {
                let mut state = self.state.lock().await;
                let reverted = state.outbox.revert_in_flight();
                if reverted > 0 {
                    tracing::info!(reverted, "went offline mid-push; suspending");
                }
                return;
            }

            let now = Utc::now();
            let requests: Vec<PushRequest> = {
                let mut state = self.state.lock().await;
                let blocked = unresolved_keys(&state.conflicts);
                let batch =
                    state
                        .outbox
                        .ready_batch(now, self.config.push_concurrency, &blocked);

                let mut requests = Vec::with_capacity(batch.len());
                for id in &batch {
                    if let Err(err) = state.outbox.mark_in_flight(id) {
                        tracing::error!(error = %err, "skipping unmarkable entry");
                        continue;
                    }
                    if let Some(entry) = state.outbox.get(id) {
                        requests.push(PushRequest::from_entry(entry));
                    }
                }
                requests
            };

            if requests.is_empty() {
                return;
            }

            let results = futures::future::join_all(requests.into_iter().map(|request| {
                let remote = Arc::clone(&self.remote);
                let deadline = self.config.push_timeout;
                async move {
                    let id = request.request_id.clone();
                    let outcome = tokio::time::timeout(deadline, remote.push(request)).await;
                    (id, outcome)
                }
            }))
            .await;

            let offline_now = !self.monitor.is_online();
            let mut state = self.state.lock().await;
            for (id, outcome) in results {
                match outcome {
                    Err(_) => {
                        self.note_push_failure(&mut state, &id, "push timed out", offline_now);
                    }
                    Ok(Err(RemoteError::Transient(message))) => {
                        self.note_push_failure(&mut state, &id, &message, offline_now);
                    }
                    Ok(Err(RemoteError::Rejected(message))) => {
                        tracing::error!(entry = %id, error = %message, "push rejected permanently");
                        if let Err(err) = state.outbox.fail_permanent(&id, &message) {
                            tracing::error!(error = %err, "could not mark entry failed");
                        }
                    }
                    Ok(Ok(PushOutcome::Ack { new_version })) => {
                        self.note_push_ack(&mut state, &id, new_version).await;
                    }
                    Ok(Ok(PushOutcome::Conflict { remote })) => {
                        self.note_push_conflict(&mut state, &id, remote).await;
                    }
                }
            }
            self.publish(&state);
        }
    }

    fn note_push_failure(
        &self,
        state: &mut SyncState,
        id: &str,
        message: &str,
        offline_now: bool,
    ) {
        if offline_now {
            // Offline abort: revert without penalty.
            if state.outbox.mark_pending(id).is_ok() {
                tracing::debug!(entry = %id, "push aborted by offline transition");
            }
            return;
        }
        match state
            .outbox
            .record_failure(id, message, &self.config.retry, Utc::now())
        {
            Ok(furrow_core::FailureOutcome::WillRetry(at)) => {
                tracing::warn!(entry = %id, error = %message, retry_at = %at, "push failed; will retry");
            }
            Ok(furrow_core::FailureOutcome::Permanent) => {
                tracing::error!(entry = %id, error = %message, "push failed permanently; retries exhausted");
            }
            Err(err) => {
                tracing::error!(error = %err, "could not record push failure");
            }
        }
    }

    async fn note_push_ack(&self, state: &mut SyncState, id: &str, new_version: u64) {
        let Some(entry) = state.outbox.get(id).cloned() else {
            return;
        };
        if let Err(err) = state.outbox.mark_complete(id, Utc::now()) {
            tracing::error!(error = %err, "could not mark entry complete");
            return;
        }
        tracing::debug!(
            kind = %entry.kind,
            id = %entry.entity_id,
            version = new_version,
            "push acknowledged"
        );

        let result = if entry.op == OutboxOp::Delete {
            // Drop the tombstone unless the record was re-created behind
            // this entry's back.
            if state.outbox.has_pending_for(entry.kind, &entry.entity_id) {
                Ok(())
            } else {
                self.store.delete(entry.kind, &entry.entity_id).await
            }
        } else {
            match self.store.get(entry.kind, &entry.entity_id).await {
                Ok(Some(mut record)) => {
                    record.acknowledge(new_version);
                    self.store.put(record).await
                }
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            }
        };
        if let Err(err) = result {
            tracing::error!(error = %err, "failed to record push acknowledgment");
        }
    }

    async fn note_push_conflict(&self, state: &mut SyncState, id: &str, remote: RemoteRecord) {
        let Some(entry) = state.outbox.get(id).cloned() else {
            return;
        };

        match adjudicate(&entry, &remote.snapshot(), Utc::now()) {
            Adjudication::LocalNoOp => {
                // The remote already holds what this entry wanted.
                if let Err(err) = state.outbox.mark_complete(id, Utc::now()) {
                    tracing::error!(error = %err, "could not settle no-op entry");
                }
                if let Err(err) = self.write_remote(entry.kind, &remote).await {
                    tracing::error!(error = %err, "failed to accept remote state");
                }
            }
            Adjudication::AutoMerge { merged } => {
                tracing::debug!(kind = %entry.kind, id = %entry.entity_id, "auto-merged past remote change");
                if let Err(err) = state.outbox.rebase(
                    id,
                    merged.clone(),
                    Some(remote.version),
                    remote.payload.clone(),
                ) {
                    tracing::error!(error = %err, "could not rebase entry");
                    return;
                }
                if let Some(payload) = merged {
                    let put = self
                        .store
                        .put(EntityRecord {
                            id: entry.entity_id.clone(),
                            kind: entry.kind,
                            payload,
                            updated_at: Utc::now(),
                            sync_version: Some(remote.version),
                            deleted: false,
                        })
                        .await;
                    if let Err(err) = put {
                        tracing::error!(error = %err, "failed to write merged record");
                    }
                }
            }
            Adjudication::Conflict(conflict) => {
                tracing::warn!(kind = %entry.kind, id = %entry.entity_id, "conflict detected on push");
                if let Err(err) = state.outbox.mark_pending(id) {
                    tracing::error!(error = %err, "could not hold conflicted entry");
                }
                upsert_conflict(&mut state.conflicts, conflict);
            }
        }
    }

    /// Remove settled history older than the retention window.
    async fn purge_phase(&self) {
        let cutoff = Utc::now() - self.config.retention;
        let mut state = self.state.lock().await;

        let purged_entries = state.outbox.purge_completed_before(cutoff);
        let before = state.conflicts.len();
        state
            .conflicts
            .retain(|c| !(c.resolved && c.detected_at < cutoff));
        let purged_conflicts = before - state.conflicts.len();

        if purged_entries + purged_conflicts > 0 {
            tracing::debug!(
                entries = purged_entries,
                conflicts = purged_conflicts,
                "purged settled history"
            );
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Write a pulled remote record into local storage.
    async fn write_remote(&self, kind: EntityKind, record: &RemoteRecord) -> Result<()> {
        match &record.payload {
            Some(payload) => {
                self.store
                    .put(EntityRecord {
                        id: record.id.clone(),
                        kind,
                        payload: payload.clone(),
                        updated_at: record.updated_at,
                        sync_version: Some(record.version),
                        deleted: false,
                    })
                    .await?;
            }
            None => self.store.delete(kind, &record.id).await?,
        }
        Ok(())
    }

    /// Persist, publish, and schedule a cycle after a local mutation.
    async fn after_mutation(&self, state: &mut SyncState) {
        if let Err(err) = self.persist(state).await {
            tracing::error!(error = %err, "failed to persist sync state");
        }
        self.publish(state);
        self.request_sync();
    }

    async fn persist(&self, state: &SyncState) -> Result<()> {
        self.store.save_sync_state(state).await?;
        Ok(())
    }

    fn publish(&self, state: &SyncState) {
        let status = SyncStatus {
            is_online: self.monitor.is_online(),
            is_syncing: self.syncing.load(Ordering::SeqCst),
            pending_count: state.outbox.pending_count(),
            failed_count: state.outbox.failed_count(),
            failed: state
                .outbox
                .failed_entries()
                .map(|e| FailedMutation {
                    kind: e.kind,
                    entity_id: e.entity_id.clone(),
                    op: e.op,
                    error: e.last_error.clone(),
                })
                .collect(),
            conflicts: state
                .conflicts
                .iter()
                .filter(|c| !c.resolved)
                .cloned()
                .collect(),
        };
        self.status_tx.send_replace(status);
    }
}

fn unresolved_keys(conflicts: &[ConflictRecord]) -> HashSet<(EntityKind, EntityId)> {
    conflicts
        .iter()
        .filter(|c| !c.resolved)
        .map(|c| (c.kind, c.entity_id.clone()))
        .collect()
}

fn upsert_conflict(conflicts: &mut Vec<ConflictRecord>, conflict: ConflictRecord) {
    // Keep at most one unresolved conflict per entity; newer detection wins.
    conflicts.retain(|c| {
        !(c.kind == conflict.kind && c.entity_id == conflict.entity_id && !c.resolved)
    });
    conflicts.push(conflict);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::PullResponse;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    /// A remote that never has changes and acknowledges everything.
    struct QuietRemote;

    #[async_trait]
    impl RemoteEndpoint for QuietRemote {
        async fn pull(
            &self,
            _kind: EntityKind,
            since: u64,
        ) -> std::result::Result<PullResponse, RemoteError> {
            Ok(PullResponse {
                records: vec![],
                cursor: since,
            })
        }

        async fn push(
            &self,
            _request: PushRequest,
        ) -> std::result::Result<PushOutcome, RemoteError> {
            Ok(PushOutcome::Ack { new_version: 1 })
        }

        async fn probe(&self) -> bool {
            true
        }
    }

    fn engine(online: bool) -> SyncEngine<MemoryStore, QuietRemote> {
        SyncEngine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(QuietRemote),
            OnlineMonitor::new(online),
            SyncConfig::default(),
        )
    }

    #[tokio::test]
    async fn create_queues_and_counts() {
        let engine = engine(false);
        engine.init().await.unwrap();

        engine
            .create(EntityKind::Plant, "p1", json!({"species": "oat"}))
            .await
            .unwrap();

        let status = engine.status();
        assert_eq!(status.pending_count, 1);
        assert!(!status.is_online);
    }

    #[tokio::test]
    async fn update_requires_existing_record() {
        let engine = engine(false);
        engine.init().await.unwrap();

        let result = engine
            .update(EntityKind::Plant, "ghost", json!({"species": "oat"}))
            .await;
        assert!(matches!(result, Err(SyncError::RecordNotFound { .. })));
    }

    #[tokio::test]
    async fn create_then_delete_leaves_nothing() {
        let engine = engine(false);
        engine.init().await.unwrap();

        engine
            .create(EntityKind::Plant, "p1", json!({"species": "oat"}))
            .await
            .unwrap();
        engine.delete(EntityKind::Plant, "p1").await.unwrap();

        assert_eq!(engine.status().pending_count, 0);
        assert!(engine
            .store
            .get(EntityKind::Plant, "p1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn offline_cycle_is_a_noop() {
        let engine = engine(false);
        engine.init().await.unwrap();
        engine
            .create(EntityKind::Zone, "z1", json!({"area": 3}))
            .await
            .unwrap();

        let status = engine.sync_now().await;
        assert_eq!(status.pending_count, 1);
        assert!(!status.is_syncing);
    }

    #[tokio::test]
    async fn online_cycle_drains_outbox() {
        let engine = engine(true);
        engine.init().await.unwrap();
        engine
            .create(EntityKind::Zone, "z1", json!({"area": 3}))
            .await
            .unwrap();

        let status = engine.sync_now().await;
        assert_eq!(status.pending_count, 0);

        let record = engine
            .store
            .get(EntityKind::Zone, "z1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.sync_version, Some(1));
    }

    #[tokio::test]
    async fn state_survives_restart() {
        let store = Arc::new(MemoryStore::new());
        {
            let engine = SyncEngine::new(
                Arc::clone(&store),
                Arc::new(QuietRemote),
                OnlineMonitor::new(false),
                SyncConfig::default(),
            );
            engine.init().await.unwrap();
            engine
                .create(EntityKind::Harvest, "h1", json!({"kg": 12}))
                .await
                .unwrap();
            engine.shutdown().await.unwrap();
        }

        let engine = SyncEngine::new(
            store,
            Arc::new(QuietRemote),
            OnlineMonitor::new(false),
            SyncConfig::default(),
        );
        engine.init().await.unwrap();
        assert_eq!(engine.status().pending_count, 1);
    }
}
