use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::{
    mutation::{Mutation, MutationRecord},
    queue::QueueStore,
    remote::{RemoteError, RemoteStore},
    runtime::connectivity::Connectivity,
    types::MutationId,
};

/// Why a single queued mutation is still queued after a pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationFailure {
    /// The remote call failed or timed out.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// The remote accepted the write but the queue could not drop the record.
    #[error("applied remotely but not dequeued: {0}")]
    Dequeue(String),
}

/// One mutation that did not make it through a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncFailure {
    /// The record, still queued.
    pub record: MutationRecord,
    /// What went wrong.
    pub error: MutationFailure,
}

/// Aggregate outcome of one replay pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncResult {
    /// Mutations applied and dequeued.
    pub success_count: usize,
    /// Mutations left queued.
    pub fail_count: usize,
    /// Per-mutation detail for every failure, in replay order.
    pub errors: Vec<SyncFailure>,
}

impl SyncResult {
    /// True when the pass left nothing behind.
    pub fn is_clean(&self) -> bool {
        self.fail_count == 0
    }

    /// Ids of the mutations that failed, in replay order.
    pub fn failed_ids(&self) -> Vec<MutationId> {
        self.errors.iter().map(|f| f.record.id()).collect()
    }

    fn record_success(&mut self) {
        self.success_count += 1;
    }

    fn record_failure(&mut self, record: MutationRecord, error: MutationFailure) {
        self.fail_count += 1;
        self.errors.push(SyncFailure { record, error });
    }
}

/// Reasons a pass did not run at all.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// Connectivity reports offline.
    #[error("refusing to replay while offline")]
    Offline,
    /// A blocking queue task panicked or was cancelled.
    #[error("queue task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Replays the queue against the remote, oldest first, one call per record.
///
/// Successes are dequeued as soon as the remote confirms them, so a crash
/// mid-pass leaves exactly the unconfirmed records behind. A failure is
/// recorded and the pass moves on to the next record.
pub struct SyncCoordinator {
    queue: Arc<QueueStore>,
    remote: Arc<dyn RemoteStore>,
    online: Option<watch::Receiver<bool>>,
    call_timeout: Option<Duration>,
}

impl SyncCoordinator {
    /// Coordinator with a 10s call timeout and no connectivity check.
    pub fn new(queue: Arc<QueueStore>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            queue,
            remote,
            online: None,
            call_timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Refuse to run while `connectivity` reports offline.
    pub fn with_connectivity(mut self, connectivity: &Connectivity) -> Self {
        self.online = Some(connectivity.watch());
        self
    }

    /// Bound on each remote call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Lets remote calls run as long as the store takes.
    pub fn without_call_timeout(mut self) -> Self {
        self.call_timeout = None;
        self
    }

    /// The queue being drained.
    pub fn queue(&self) -> &Arc<QueueStore> {
        &self.queue
    }

    /// Runs one pass over a snapshot of the queue taken at call time.
    ///
    /// Records enqueued while the pass runs wait for the next one.
    pub async fn replay(&self) -> Result<SyncResult, ReplayError> {
        if let Some(online) = &self.online {
            if !*online.borrow() {
                return Err(ReplayError::Offline);
            }
        }

        let queue = Arc::clone(&self.queue);
        let snapshot = tokio::task::spawn_blocking(move || queue.list()).await?;
        tracing::info!(pending = snapshot.len(), "replay starting");

        let mut result = SyncResult::default();
        for record in snapshot {
            if let Err(err) = self.dispatch(record.mutation()).await {
                tracing::warn!(
                    mutation_id = %record.id(),
                    resource = record.resource(),
                    action = %record.action(),
                    error = %err,
                    "replay of mutation failed, keeping it queued"
                );
                result.record_failure(record, err.into());
                continue;
            }

            let queue = Arc::clone(&self.queue);
            let id = record.id();
            let dequeued = tokio::task::spawn_blocking(move || queue.dequeue(id))
                .await
                .map_err(|e| e.to_string())
                .and_then(|r| r.map_err(|e| e.to_string()));

            match dequeued {
                Ok(()) => {
                    tracing::debug!(
                        mutation_id = %id,
                        resource = record.resource(),
                        action = %record.action(),
                        "mutation replayed"
                    );
                    result.record_success();
                }
                Err(msg) => {
                    tracing::warn!(mutation_id = %id, error = %msg, "replayed mutation could not be dequeued");
                    result.record_failure(record, MutationFailure::Dequeue(msg));
                }
            }
        }

        tracing::info!(
            success = result.success_count,
            failed = result.fail_count,
            "replay finished"
        );
        Ok(result)
    }

    async fn dispatch(&self, mutation: &Mutation) -> Result<(), RemoteError> {
        let call = async {
            match mutation {
                Mutation::Insert { resource, fields } => self.remote.insert(resource, fields).await,
                Mutation::Update {
                    resource,
                    id,
                    fields,
                } => self.remote.update(resource, id, fields).await,
                Mutation::Delete { resource, id } => self.remote.delete(resource, id).await,
            }
        };

        let Some(limit) = self.call_timeout else {
            return call.await;
        };
        match tokio::time::timeout(limit, call).await {
            Ok(res) => res,
            Err(_) => Err(RemoteError::Timeout),
        }
    }
}
