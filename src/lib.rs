//! Offline-first mutation queue with ordered replay against a remote store.
//!
//! Writes made while offline are appended to a durable FIFO
//! ([`queue::QueueStore`]) and replayed oldest first by a
//! [`sync::SyncCoordinator`] once connectivity returns. Each mutation is
//! dequeued only after the remote confirms it; a failing mutation stays
//! queued without blocking the ones behind it.
//!
//! # Examples
//!
//! Queue and replay by hand:
//! ```
//! use std::sync::Arc;
//!
//! use fitsync::{
//!     mutation::Mutation,
//!     persist::memory::MemoryMedium,
//!     queue::QueueStore,
//!     remote::MemoryRemote,
//!     sync::SyncCoordinator,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let queue = Arc::new(QueueStore::new(MemoryMedium::new()));
//! let fields = json!({"id": 7, "name": "Morning run"}).as_object().cloned().unwrap();
//! queue.enqueue(Mutation::insert("workouts", fields)).unwrap();
//!
//! let remote = MemoryRemote::new();
//! let coordinator = SyncCoordinator::new(Arc::clone(&queue), Arc::new(remote.clone()));
//! let result = coordinator.replay().await.unwrap();
//! assert_eq!(result.success_count, 1);
//! assert!(queue.is_empty());
//! # }
//! ```
//!
//! Running the controller on top of a SQLite-backed queue:
//! ```no_run
//! use std::sync::Arc;
//!
//! use fitsync::{
//!     config::SyncConfig,
//!     persist::sqlite::SqliteMedium,
//!     queue::QueueStore,
//!     remote::MemoryRemote,
//!     runtime::{Connectivity, spawn_controller},
//!     state::SyncState,
//!     sync::SyncCoordinator,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let state = Arc::new(SyncState::new());
//! let medium = SqliteMedium::open("fitsync.db").expect("open sqlite");
//! let queue = Arc::new(QueueStore::with_state(medium, Arc::clone(&state)));
//! let coordinator = SyncCoordinator::new(queue, Arc::new(MemoryRemote::new()));
//!
//! let connectivity = Connectivity::new(false);
//! let handle = spawn_controller(coordinator, state, connectivity.clone(), SyncConfig::default());
//! connectivity.set_online(true);
//! let _ = handle.force_sync().await;
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Runtime tunables.
pub mod config;
/// Mutation model and its queued wire form.
pub mod mutation;
/// Durable key-value media backing the queue.
pub mod persist;
/// Offline mutation queue.
pub mod queue;
/// Remote store abstraction and an in-memory implementation.
pub mod remote;
/// Controller task, connectivity and events.
pub mod runtime;
/// Observable sync snapshot.
pub mod state;
/// Queue replay.
pub mod sync;
/// Shared primitive types and enums.
pub mod types;
