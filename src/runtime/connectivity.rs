//! Online/offline signal shared by the host and the sync runtime.

use tokio::sync::watch;

/// Boolean connectivity source.
///
/// The host flips it from whatever it observes (OS network events, failed
/// requests, a health check); the controller and coordinator read it.
/// Clones drive the same signal.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: watch::Sender<bool>,
}

impl Connectivity {
    /// Starts with the given connectivity.
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    /// Records a connectivity observation. Watchers are only woken when the
    /// value actually changes.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
    }

    /// Current connectivity.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Receiver woken on every transition after this call.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
