//! In-memory remote with last-write-wins tables.
//!
//! Useful as a local stand-in for the real backend and as the fault-injecting
//! double in tests: calls are recorded in order, failures can be scripted per
//! row or per call, and a gate can hold calls in flight.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::{Notify, Semaphore};

use crate::{
    mutation::ROW_ID_FIELD,
    types::{Fields, RowId},
};

use super::{RemoteError, RemoteStore};

/// One call as observed by [`MemoryRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    /// `insert(resource, fields)`.
    Insert {
        /// Target resource.
        resource: String,
        /// Row contents.
        fields: Fields,
    },
    /// `update(resource, id, fields)`.
    Update {
        /// Target resource.
        resource: String,
        /// Target row.
        id: RowId,
        /// Overwritten fields.
        fields: Fields,
    },
    /// `delete(resource, id)`.
    Delete {
        /// Target resource.
        resource: String,
        /// Target row.
        id: RowId,
    },
}

impl RemoteCall {
    /// Resource the call addressed.
    pub fn resource(&self) -> &str {
        match self {
            Self::Insert { resource, .. }
            | Self::Update { resource, .. }
            | Self::Delete { resource, .. } => resource,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, HashMap<RowId, Fields>>,
    calls: Vec<RemoteCall>,
    failing_rows: HashMap<(String, RowId), RemoteError>,
    failing_resources: HashMap<String, RemoteError>,
    fail_next: VecDeque<RemoteError>,
    next_row_id: i64,
    gate: Option<Arc<Semaphore>>,
}

/// In-memory [`RemoteStore`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Mutex<Inner>>,
    call_started: Arc<Notify>,
}

impl MemoryRemote {
    /// Creates an empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call received so far, in arrival order. Failed calls included.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    /// Current contents of row `id` in `resource`.
    pub fn row(&self, resource: &str, id: &RowId) -> Option<Fields> {
        self.lock()
            .tables
            .get(resource)
            .and_then(|rows| rows.get(id))
            .cloned()
    }

    /// Number of rows in `resource`.
    pub fn row_count(&self, resource: &str) -> usize {
        self.lock().tables.get(resource).map_or(0, HashMap::len)
    }

    /// Fails every update/delete of `id` in `resource` with `error`.
    pub fn fail_row(&self, resource: &str, id: impl Into<RowId>, error: RemoteError) {
        self.lock()
            .failing_rows
            .insert((resource.to_string(), id.into()), error);
    }

    /// Fails every call against `resource` with `error`.
    pub fn fail_resource(&self, resource: &str, error: RemoteError) {
        self.lock()
            .failing_resources
            .insert(resource.to_string(), error);
    }

    /// Fails the next call, whatever it is, with `error`. Stacks FIFO.
    pub fn fail_next(&self, error: RemoteError) {
        self.lock().fail_next.push_back(error);
    }

    /// Drops every scripted failure.
    pub fn heal(&self) {
        let mut inner = self.lock();
        inner.failing_rows.clear();
        inner.failing_resources.clear();
        inner.fail_next.clear();
    }

    /// Holds subsequent calls until [`MemoryRemote::release`] or
    /// [`MemoryRemote::open`].
    pub fn hold(&self) {
        self.lock().gate = Some(Arc::new(Semaphore::new(0)));
    }

    /// Lets `n` held calls through.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.lock().gate {
            gate.add_permits(n);
        }
    }

    /// Removes the gate and lets every held call through.
    pub fn open(&self) {
        if let Some(gate) = self.lock().gate.take() {
            gate.close();
        }
    }

    /// Resolves once at least `n` calls have arrived.
    pub async fn wait_for_calls(&self, n: usize) {
        loop {
            let notified = self.call_started.notified();
            if self.lock().calls.len() >= n {
                return;
            }
            notified.await;
        }
    }

    async fn admit(&self, call: RemoteCall) -> Result<(), RemoteError> {
        let gate = {
            let mut inner = self.lock();
            inner.calls.push(call.clone());
            inner.gate.clone()
        };
        self.call_started.notify_waiters();

        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let mut inner = self.lock();
        if let Some(err) = inner.fail_next.pop_front() {
            return Err(err);
        }
        if let Some(err) = inner.failing_resources.get(call.resource()) {
            return Err(err.clone());
        }
        let row_key = match &call {
            RemoteCall::Insert { fields, .. } => fields.get(ROW_ID_FIELD).and_then(RowId::from_value),
            RemoteCall::Update { id, .. } | RemoteCall::Delete { id, .. } => Some(id.clone()),
        };
        if let Some(id) = row_key {
            if let Some(err) = inner
                .failing_rows
                .get(&(call.resource().to_string(), id))
            {
                return Err(err.clone());
            }
        }

        apply(&mut inner, call);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn apply(inner: &mut Inner, call: RemoteCall) {
    match call {
        RemoteCall::Insert { resource, fields } => {
            let id = match fields.get(ROW_ID_FIELD).and_then(RowId::from_value) {
                Some(id) => id,
                None => {
                    inner.next_row_id += 1;
                    RowId::Int(inner.next_row_id)
                }
            };
            inner.tables.entry(resource).or_default().insert(id, fields);
        }
        RemoteCall::Update { resource, id, fields } => {
            if let Some(row) = inner
                .tables
                .get_mut(&resource)
                .and_then(|rows| rows.get_mut(&id))
            {
                for (key, value) in fields {
                    row.insert(key, value);
                }
            }
        }
        RemoteCall::Delete { resource, id } => {
            if let Some(rows) = inner.tables.get_mut(&resource) {
                rows.remove(&id);
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn insert(&self, resource: &str, fields: &Fields) -> Result<(), RemoteError> {
        self.admit(RemoteCall::Insert {
            resource: resource.to_string(),
            fields: fields.clone(),
        })
        .await
    }

    async fn update(&self, resource: &str, id: &RowId, fields: &Fields) -> Result<(), RemoteError> {
        self.admit(RemoteCall::Update {
            resource: resource.to_string(),
            id: id.clone(),
            fields: fields.clone(),
        })
        .await
    }

    async fn delete(&self, resource: &str, id: &RowId) -> Result<(), RemoteError> {
        self.admit(RemoteCall::Delete {
            resource: resource.to_string(),
            id: id.clone(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn last_write_wins_per_row() {
        let remote = MemoryRemote::new();
        remote
            .insert("profiles", &fields(json!({"id": 5, "name": "Ana", "age": 30})))
            .await
            .unwrap();
        remote
            .update("profiles", &RowId::Int(5), &fields(json!({"name": "Luc"})))
            .await
            .unwrap();
        remote
            .update("profiles", &RowId::Int(5), &fields(json!({"name": "Zoe"})))
            .await
            .unwrap();

        let row = remote.row("profiles", &RowId::Int(5)).unwrap();
        assert_eq!(row["name"], "Zoe");
        assert_eq!(row["age"], 30);
    }

    #[tokio::test]
    async fn delete_of_missing_row_succeeds() {
        let remote = MemoryRemote::new();
        remote.delete("foods", &RowId::Int(9)).await.unwrap();
        assert_eq!(remote.row_count("foods"), 0);
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test]
    async fn scripted_failures_apply_and_heal() {
        let remote = MemoryRemote::new();
        remote.fail_row("profiles", 5, RemoteError::Network("reset".to_string()));
        remote.fail_next(RemoteError::Timeout);

        let err = remote
            .insert("workouts", &fields(json!({"kind": "run"})))
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::Timeout);

        let err = remote
            .delete("profiles", &RowId::Int(5))
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::Network("reset".to_string()));

        remote.heal();
        remote.delete("profiles", &RowId::Int(5)).await.unwrap();
        assert_eq!(remote.row_count("workouts"), 0);
    }
}
