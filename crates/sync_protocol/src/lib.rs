//! Synchronization Protocol
//!
//! Keeps disconnected field devices eventually consistent with the
//! server's authoritative state:
//!
//! - opaque checkpoint tokens; any undecodable token forces a bootstrap,
//! - versioned, explicitly tagged entity payloads and tombstones,
//! - bootstrap (the client's working set: recent cycles, active
//!   assignments, approved readings, unresolved conflicts) and delta
//!   assembly over an [`AuthoritativeView`],
//! - a sequential client upload queue with bounded retry bookkeeping,
//! - server-wins merge that preserves not-yet-uploaded local mutations.
//!
//! Uploads never touch authoritative state here: they enter the server
//! through the same validation path as interactive captures.

pub mod checkpoint;
pub mod error;
pub mod feed;
pub mod merge;
pub mod payload;
pub mod queue;

pub use checkpoint::Checkpoint;
pub use error::SyncError;
pub use feed::{bootstrap, delta, AuthoritativeView, BOOTSTRAP_CYCLE_WINDOW};
pub use merge::LocalCache;
pub use payload::{
    BootstrapResponse, DeltaResponse, EntityKind, EntityPayload, Tombstone, TombstoneReason,
    SCHEMA_VERSION,
};
pub use queue::{QueueOperation, SyncQueue, SyncQueueItem};
