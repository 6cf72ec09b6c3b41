//! # Furrow Core
//!
//! Deterministic sync primitives for Furrow's offline-first planner.
//!
//! This crate holds the pure logic of the synchronization subsystem:
//! entity records with sync metadata, the outbox of queued mutations,
//! conflict classification and resolution, the retry/backoff policy, and
//! per-kind pull cursors. It performs no IO — storage and networking live
//! in `furrow-sync` — so every rule here is testable without mocks.
//!
//! ## Core Concepts
//!
//! ### Entity records
//!
//! Seven domain collections (projects, land parcels, zones, plants, water
//! entries, harvests, alerts) share one record shape: an opaque JSON
//! payload plus sync metadata — `updated_at`, an optional server-assigned
//! `sync_version`, and a tombstone flag.
//!
//! ### The outbox
//!
//! Local mutations are not pushed directly; they are appended to the
//! [`Outbox`], a durable-format log that coalesces rapid successive edits
//! to the same entity and enforces per-id causal ordering when entries
//! are drained.
//!
//! ### Conflicts
//!
//! When the remote version advances past an entry's base, a three-way
//! field comparison ([`classify`]) decides between settling the entry,
//! auto-merging disjoint edits, and raising a [`ConflictRecord`] for
//! manual resolution via the pure [`resolve`] decision function.
//!
//! ### Retries
//!
//! Failed pushes follow a fixed backoff schedule ([`RetryPolicy`],
//! 1s → 5s → 30s → 2min → 5min) and fail permanently once the attempt cap
//! is reached.
//!
//! ## Persistence
//!
//! [`SyncState`] bundles the outbox, cursors, and conflict log into one
//! serializable snapshot with a format version check.

pub mod conflict;
pub mod cursor;
pub mod entity;
pub mod error;
pub mod outbox;
pub mod retry;
pub mod state;

// Re-export main types at crate root
pub use conflict::{
    adjudicate, classify, resolve, Adjudication, Classification, ConflictRecord, RemoteSnapshot,
    Resolution, ResolutionChoice,
};
pub use cursor::CursorSet;
pub use entity::{EntityKind, EntityRecord};
pub use error::Error;
pub use outbox::{
    EnqueueOutcome, EntryStatus, FailureOutcome, Outbox, OutboxEntry, OutboxOp,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use state::{SyncState, STATE_FORMAT_VERSION};

/// Type aliases for clarity
pub type EntityId = String;
pub type OutboxEntryId = String;
pub type SyncVersion = u64;
pub type SyncCursor = u64;
pub type Timestamp = chrono::DateTime<chrono::Utc>;
