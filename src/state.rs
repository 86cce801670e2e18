//! Observable sync snapshot shared between the controller, the queue, and
//! any number of readers.
//!
//! The state is an explicit object owned by the composition root and passed
//! by `Arc` to writers and observers. Writers are the controller and the
//! queue's mutation wrappers; readers either poll [`SyncState::snapshot`] or
//! await changes on a [`SyncState::subscribe`] receiver.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;

use crate::types::{SyncStatus, Timestamp};

/// Point-in-time view of the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SyncSnapshot {
    /// Last known connectivity.
    pub is_online: bool,
    /// Number of queued mutations.
    pub pending_count: usize,
    /// Replay status.
    pub sync_status: SyncStatus,
    /// Completion time of the most recent replay with zero failures.
    pub last_sync_at: Option<Timestamp>,
}

/// Last-writer-wins holder of the current [`SyncSnapshot`].
#[derive(Debug)]
pub struct SyncState {
    tx: Mutex<Option<watch::Sender<SyncSnapshot>>>,
    rx: watch::Receiver<SyncSnapshot>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncState {
    /// Creates a state holding [`SyncSnapshot::default`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(SyncSnapshot::default());
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Seeds the values that come from durable storage and the connectivity
    /// source. Status is reset to idle.
    pub fn init(&self, pending_count: usize, last_sync_at: Option<Timestamp>, is_online: bool) {
        self.update(|snap| {
            *snap = SyncSnapshot {
                is_online,
                pending_count,
                sync_status: SyncStatus::Idle,
                last_sync_at,
            };
        });
    }

    /// Current value.
    pub fn snapshot(&self) -> SyncSnapshot {
        self.rx.borrow().clone()
    }

    /// Receiver notified on every change after this call.
    ///
    /// After [`SyncState::dispose`] the receiver still reads the final value
    /// but `changed()` returns an error.
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        match self.sender().as_ref() {
            Some(tx) => tx.subscribe(),
            None => self.rx.clone(),
        }
    }

    /// Applies `f` and notifies subscribers if anything changed.
    ///
    /// Returns whether a notification went out. No-op once disposed.
    pub fn update(&self, f: impl FnOnce(&mut SyncSnapshot)) -> bool {
        let guard = self.sender();
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        tx.send_if_modified(|snap| {
            let before = snap.clone();
            f(snap);
            *snap != before
        })
    }

    /// Refreshes the pending count.
    pub fn set_pending(&self, count: usize) -> bool {
        self.update(|snap| snap.pending_count = count)
    }

    /// Sets the replay status.
    pub fn set_status(&self, status: SyncStatus) -> bool {
        self.update(|snap| snap.sync_status = status)
    }

    /// Records connectivity.
    pub fn set_online(&self, online: bool) -> bool {
        self.update(|snap| snap.is_online = online)
    }

    /// Closes the notification channel; later updates are ignored.
    pub fn dispose(&self) {
        self.sender().take();
    }

    /// True after [`SyncState::dispose`].
    pub fn is_disposed(&self) -> bool {
        self.sender().is_none()
    }

    fn sender(&self) -> MutexGuard<'_, Option<watch::Sender<SyncSnapshot>>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_notifies_only_on_change() {
        let state = SyncState::new();
        let mut rx = state.subscribe();

        assert!(state.set_pending(3));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().pending_count, 3);

        assert!(!state.set_pending(3));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn init_resets_status() {
        let state = SyncState::new();
        state.set_status(SyncStatus::Error);
        state.init(2, None, true);

        let snap = state.snapshot();
        assert_eq!(snap.sync_status, SyncStatus::Idle);
        assert_eq!(snap.pending_count, 2);
        assert!(snap.is_online);
    }

    #[test]
    fn dispose_freezes_value_and_closes_subscribers() {
        let state = SyncState::new();
        let rx = state.subscribe();
        state.set_pending(1);
        state.dispose();

        assert!(state.is_disposed());
        assert!(!state.set_pending(9));
        assert_eq!(state.snapshot().pending_count, 1);
        assert!(rx.has_changed().is_err());
        assert!(state.subscribe().has_changed().is_err());
    }
}
