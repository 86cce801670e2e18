//! Remote resource API consumed by the replay coordinator.
//!
//! The remote is a generic key-addressed CRUD store: rows live in named
//! resources and are addressed by [`RowId`]. Its consistency model is its
//! own business; the coordinator only needs a success/failure per call.

mod memory;

pub use memory::{MemoryRemote, RemoteCall};

use async_trait::async_trait;

use crate::types::{Fields, RowId};

/// Failure of one remote call. Every variant is retried on a later pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Transport-level failure.
    #[error("network failure: {0}")]
    Network(String),
    /// The call-level timeout elapsed.
    #[error("remote call timed out")]
    Timeout,
    /// The store answered with an application-level error.
    #[error("rejected by remote ({code}): {message}")]
    Rejected {
        /// Store-specific error code.
        code: String,
        /// Human-readable detail.
        message: String,
    },
}

/// Key-addressed CRUD store that queued mutations are replayed against.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Creates a row in `resource` from `fields`.
    async fn insert(&self, resource: &str, fields: &Fields) -> Result<(), RemoteError>;

    /// Overwrites `fields` on the row `id` of `resource`.
    async fn update(&self, resource: &str, id: &RowId, fields: &Fields) -> Result<(), RemoteError>;

    /// Removes the row `id` from `resource`.
    async fn delete(&self, resource: &str, id: &RowId) -> Result<(), RemoteError>;
}
