//! Async controller, connectivity signal and event stream.

/// Host-driven online/offline signal.
pub mod connectivity;
/// Controller task and its handle.
pub mod controller;
/// Event stream types emitted by the controller.
pub mod events;

pub use connectivity::Connectivity;
pub use controller::{ControllerError, SkipReason, SyncHandle, TriggerOutcome, spawn_controller};
pub use events::SyncEvent;
