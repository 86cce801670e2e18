//! Runtime event stream payloads.

use crate::types::MutationId;

/// Events emitted from the controller loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Connectivity flipped.
    ConnectivityChanged {
        /// New connectivity.
        online: bool,
    },
    /// A replay pass started.
    ReplayStarted {
        /// Queue depth when the pass was scheduled.
        pending: usize,
    },
    /// One mutation failed during a pass and stays queued.
    MutationFailed {
        /// Failed mutation.
        id: MutationId,
        /// Its target resource.
        resource: String,
        /// Rendered failure.
        error: String,
    },
    /// A replay pass completed.
    ReplayFinished {
        /// Mutations applied.
        success_count: usize,
        /// Mutations left queued.
        fail_count: usize,
    },
    /// A replay could not run at all.
    ReplayAborted {
        /// Rendered reason.
        reason: String,
    },
    /// The queue depth changed.
    PendingChanged {
        /// New depth.
        count: usize,
    },
}
