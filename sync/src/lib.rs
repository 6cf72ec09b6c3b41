//! Furrow sync runtime.
//!
//! Async runtime around [`furrow_core`]: it owns the durable sync state,
//! talks to storage and the remote endpoint through ports the embedding
//! application implements, and turns connectivity signals, local
//! mutations, and timers into coalesced sync cycles.
//!
//! The pieces:
//!
//! - [`SyncEngine`] orchestrates pull, push, conflict adjudication,
//!   retries, and retention.
//! - [`OnlineMonitor`] tracks remote reachability and deduplicates
//!   transitions.
//! - [`EntityStore`] and [`SyncStateStore`] are the storage ports;
//!   [`MemoryStore`] is the in-memory adapter.
//! - [`RemoteEndpoint`] is the port to the authoritative store.

pub mod config;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod remote;
pub mod store;

pub use config::{ConfigError, SyncConfig};
pub use engine::{FailedMutation, SyncEngine, SyncStatus};
pub use error::{Result, SyncError};
pub use monitor::OnlineMonitor;
pub use remote::{PullResponse, PushOutcome, PushRequest, RemoteEndpoint, RemoteError, RemoteRecord};
pub use store::{EntityStore, MemoryStore, StorageError, StorageResult, SyncStateStore};
