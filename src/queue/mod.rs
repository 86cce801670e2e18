//! Durable, ordered queue of pending mutations.

mod codec;
/// Queue store and its error types.
pub mod store;

pub use store::{LAST_SYNC_KEY, QUEUE_KEY, QueueError, QueueResult, QueueStore};
