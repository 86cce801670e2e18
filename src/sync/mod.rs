//! Replay of the offline queue against the remote store.

/// Per-pass replay and its result types.
mod coordinator;

pub use coordinator::{MutationFailure, ReplayError, SyncCoordinator, SyncFailure, SyncResult};
