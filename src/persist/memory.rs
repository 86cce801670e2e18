//! Process-local medium, mostly for tests and ephemeral sessions.

use std::sync::{Arc, Mutex, PoisonError};

use hashbrown::HashMap;

use super::{PersistError, PersistResult, QueueMedium};

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Vec<u8>>,
    fail_reads: bool,
    fail_writes: Option<String>,
}

/// In-memory [`QueueMedium`].
///
/// Clones share the same entries, so a test can keep one clone to corrupt
/// data or inject write failures while the queue owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryMedium {
    /// Creates an empty medium.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw bytes under `key`, bypassing any injected write failure.
    pub fn put_raw(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.lock().entries.insert(key.to_string(), value.into());
    }

    /// Raw bytes stored under `key`.
    pub fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().entries.get(key).cloned()
    }

    /// Makes every read fail until reset.
    pub fn fail_reads(&self, on: bool) {
        self.lock().fail_reads = on;
    }

    /// Makes every write and remove fail with `message` until cleared with `None`.
    pub fn fail_writes(&self, message: Option<&str>) {
        self.lock().fail_writes = message.map(str::to_string);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueueMedium for MemoryMedium {
    fn read(&mut self, key: &str) -> PersistResult<Option<Vec<u8>>> {
        let inner = self.lock();
        if inner.fail_reads {
            return Err(PersistError::Message("medium unreadable".to_string()));
        }
        Ok(inner.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &[u8]) -> PersistResult<()> {
        let mut inner = self.lock();
        if let Some(msg) = &inner.fail_writes {
            return Err(PersistError::Message(msg.clone()));
        }
        inner.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> PersistResult<()> {
        let mut inner = self.lock();
        if let Some(msg) = &inner.fail_writes {
            return Err(PersistError::Message(msg.clone()));
        }
        inner.entries.remove(key);
        Ok(())
    }
}
