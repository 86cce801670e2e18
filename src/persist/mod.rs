/// In-process medium with fault injection.
pub mod memory;
/// SQLite-backed medium.
pub mod sqlite;

/// Durable-medium failures. Reads that hit one degrade to empty; writes
/// surface it to the caller.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// SQLite rejected the statement or could not be opened.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Filesystem-level failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Anything else, including injected faults.
    #[error("{0}")]
    Message(String),
}

/// Result alias for medium operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Keyed byte storage that survives process restarts.
///
/// Each call is atomic on its own; callers needing read-modify-write
/// atomicity serialize around the medium themselves.
pub trait QueueMedium: Send {
    /// Returns the bytes stored under `key`, if any.
    fn read(&mut self, key: &str) -> PersistResult<Option<Vec<u8>>>;
    /// Replaces the bytes stored under `key`.
    fn write(&mut self, key: &str, value: &[u8]) -> PersistResult<()>;
    /// Drops `key`. Missing keys are not an error.
    fn remove(&mut self, key: &str) -> PersistResult<()>;
}

impl<M: QueueMedium + ?Sized> QueueMedium for Box<M> {
    fn read(&mut self, key: &str) -> PersistResult<Option<Vec<u8>>> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, value: &[u8]) -> PersistResult<()> {
        (**self).write(key, value)
    }

    fn remove(&mut self, key: &str) -> PersistResult<()> {
        (**self).remove(key)
    }
}
