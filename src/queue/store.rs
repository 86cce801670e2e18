use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::{
    mutation::{Mutation, MutationError, MutationRecord},
    persist::{PersistError, QueueMedium},
    state::SyncState,
    types::{Action, Fields, MutationId, Timestamp},
};

use super::codec::{decode_records, encode_records};

/// Medium key holding the ordered mutation list.
pub const QUEUE_KEY: &str = "fitsync-offline-mutations";
/// Medium key holding the last fully successful replay time.
pub const LAST_SYNC_KEY: &str = "fitsync-last-sync-at";

/// Failures surfaced by queue writes.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The durable medium could not be read or written.
    #[error("storage unavailable: {0}")]
    Storage(#[from] PersistError),
    /// The queue could not be encoded.
    #[error("queue serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The untyped payload did not describe a valid mutation.
    #[error("invalid mutation: {0}")]
    Mutation(#[from] MutationError),
}

/// Result alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Durable FIFO of pending mutations.
///
/// Every call re-reads the medium, so the medium stays the single source of
/// truth. Read-modify-write cycles hold an internal lock, which makes
/// concurrent `enqueue` and `dequeue` calls safe against lost updates.
/// Calls block on the medium; async callers on a hot path should move them
/// onto `spawn_blocking`.
pub struct QueueStore {
    medium: Mutex<Box<dyn QueueMedium>>,
    state: Option<Arc<SyncState>>,
}

impl QueueStore {
    /// Wraps `medium` without publishing pending counts anywhere.
    pub fn new(medium: impl QueueMedium + 'static) -> Self {
        Self {
            medium: Mutex::new(Box::new(medium)),
            state: None,
        }
    }

    /// Wraps `medium` and refreshes `state.pending_count` after each write.
    pub fn with_state(medium: impl QueueMedium + 'static, state: Arc<SyncState>) -> Self {
        Self {
            medium: Mutex::new(Box::new(medium)),
            state: Some(state),
        }
    }

    /// Appends `mutation` and persists the queue before returning.
    ///
    /// The mutation is normalized first; one that would not decode back
    /// (empty resource) is refused with [`QueueError::Mutation`].
    pub fn enqueue(&self, mutation: Mutation) -> QueueResult<MutationRecord> {
        let mutation = mutation.normalize()?;
        let mut medium = self.lock();
        let mut records = read_records(&mut medium)?;

        let mut record = MutationRecord::new(mutation);
        while records.iter().any(|r| r.id() == record.id()) {
            record = record.with_fresh_id();
        }
        records.push(record.clone());
        write_records(&mut medium, &records)?;
        drop(medium);

        tracing::debug!(
            mutation_id = %record.id(),
            resource = record.resource(),
            action = %record.action(),
            pending = records.len(),
            "mutation queued"
        );
        self.publish(records.len());
        Ok(record)
    }

    /// Builds the mutation from an untyped triple, then enqueues it.
    pub fn enqueue_payload(
        &self,
        resource: impl Into<String>,
        action: Action,
        payload: Fields,
    ) -> QueueResult<MutationRecord> {
        let mutation = Mutation::from_payload(resource, action, payload)?;
        self.enqueue(mutation)
    }

    /// Removes the record with `id`. Absent ids are a no-op.
    pub fn dequeue(&self, id: MutationId) -> QueueResult<()> {
        let mut medium = self.lock();
        let mut records = read_records(&mut medium)?;

        let Some(pos) = records.iter().position(|r| r.id() == id) else {
            return Ok(());
        };
        records.remove(pos);
        write_records(&mut medium, &records)?;
        drop(medium);

        self.publish(records.len());
        Ok(())
    }

    /// Current contents, oldest first. Never fails: an unreadable medium
    /// reads as an empty queue.
    pub fn list(&self) -> Vec<MutationRecord> {
        let mut medium = self.lock();
        match read_records(&mut medium) {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(error = %err, "offline queue read failed, treating as empty");
                Vec::new()
            }
        }
    }

    /// Empties the queue unconditionally.
    pub fn clear(&self) -> QueueResult<()> {
        self.lock().remove(QUEUE_KEY)?;
        self.publish(0);
        Ok(())
    }

    /// Number of queued records.
    pub fn size(&self) -> usize {
        self.list().len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Persisted time of the last replay that finished without failures.
    pub fn last_sync_at(&self) -> Option<Timestamp> {
        let raw = match self.lock().read(LAST_SYNC_KEY) {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::warn!(error = %err, "last sync marker unreadable");
                return None;
            }
        };
        let text = String::from_utf8(raw).ok()?;
        DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Persists `at` as the last fully successful replay time.
    pub fn mark_synced(&self, at: Timestamp) -> QueueResult<()> {
        self.lock()
            .write(LAST_SYNC_KEY, at.to_rfc3339().as_bytes())?;
        Ok(())
    }

    fn publish(&self, pending: usize) {
        if let Some(state) = &self.state {
            state.set_pending(pending);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn QueueMedium>> {
        self.medium.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_records(medium: &mut Box<dyn QueueMedium>) -> Result<Vec<MutationRecord>, PersistError> {
    Ok(medium
        .read(QUEUE_KEY)?
        .map(|raw| decode_records(&raw))
        .unwrap_or_default())
}

fn write_records(medium: &mut Box<dyn QueueMedium>, records: &[MutationRecord]) -> QueueResult<()> {
    let raw = encode_records(records)?;
    medium.write(QUEUE_KEY, &raw)?;
    Ok(())
}
