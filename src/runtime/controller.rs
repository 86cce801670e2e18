use std::sync::Arc;

use chrono::Utc;
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::{JoinError, JoinHandle},
    time::MissedTickBehavior,
};

use crate::{
    config::SyncConfig,
    state::{SyncSnapshot, SyncState},
    sync::{ReplayError, SyncCoordinator, SyncResult},
    types::SyncStatus,
};

use super::{connectivity::Connectivity, events::SyncEvent};

/// Errors returned by [`SyncHandle`] calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    /// The controller task has stopped.
    #[error("sync controller is not running")]
    ChannelClosed,
}

/// Why a trigger did not start a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A replay is already running.
    InFlight,
    /// Connectivity reports offline.
    Offline,
    /// Nothing is queued.
    QueueEmpty,
}

/// Result of handing a trigger to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A replay pass was scheduled.
    Started {
        /// Queue depth at scheduling time.
        pending: usize,
    },
    /// Nothing was scheduled.
    Skipped(SkipReason),
}

enum Command {
    ForceSync {
        resp: oneshot::Sender<TriggerOutcome>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Cloneable control surface of a running controller.
#[derive(Clone)]
pub struct SyncHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<SyncEvent>,
    state: Arc<SyncState>,
    connectivity: Connectivity,
}

type ReplayTask = JoinHandle<Result<SyncResult, ReplayError>>;

/// Starts the controller task.
///
/// The task owns the single replay slot: connectivity transitions, poll
/// ticks and [`SyncHandle::force_sync`] all funnel through it, and a trigger
/// that arrives while a pass is running is dropped. The task seeds `state`
/// from the queue and `connectivity` before acting on any trigger, so a
/// snapshot read right after this returns may still hold the old values.
///
/// Must be called from within a tokio runtime.
pub fn spawn_controller(
    coordinator: SyncCoordinator,
    state: Arc<SyncState>,
    connectivity: Connectivity,
    config: SyncConfig,
) -> SyncHandle {
    let coordinator = match config.call_timeout() {
        Some(limit) => coordinator.with_call_timeout(limit),
        None => coordinator.without_call_timeout(),
    };
    let coordinator = Arc::new(coordinator.with_connectivity(&connectivity));

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<SyncEvent>(config.event_capacity.max(1));
    let mut online_rx = connectivity.watch();

    let mut worker = Worker {
        coordinator,
        state: Arc::clone(&state),
        events_tx: events_tx.clone(),
        connectivity: connectivity.clone(),
        online: false,
        in_flight: None,
    };

    tokio::spawn(async move {
        worker.seed(&mut online_rx).await;

        let mut poll = tokio::time::interval(config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        poll.tick().await;

        if config.replay_on_start {
            worker.trigger("start").await;
        }

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        break;
                    };
                    match cmd {
                        Command::ForceSync { resp } => {
                            let out = worker.trigger("force").await;
                            let _ = resp.send(out);
                        }
                        Command::Shutdown { resp } => {
                            worker.drain().await;
                            let _ = resp.send(());
                            break;
                        }
                    }
                }
                Ok(()) = online_rx.changed() => {
                    let online = *online_rx.borrow_and_update();
                    worker.connectivity_changed(online).await;
                }
                _ = poll.tick() => {
                    worker.poll(config.replay_on_poll).await;
                }
                joined = join_in_flight(&mut worker.in_flight), if worker.in_flight.is_some() => {
                    worker.in_flight = None;
                    worker.finish(joined).await;
                }
            }
        }

        tracing::debug!("sync controller stopped");
    });

    SyncHandle {
        cmd_tx,
        events_tx,
        state,
        connectivity,
    }
}

impl SyncHandle {
    /// Requests an immediate replay, subject to the single-flight guard.
    ///
    /// Returns once the controller has decided, not when the pass finishes;
    /// watch [`SyncHandle::subscribe`] for completion.
    pub async fn force_sync(&self) -> Result<TriggerOutcome, ControllerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ForceSync { resp: tx })
            .await
            .map_err(|_| ControllerError::ChannelClosed)?;
        rx.await.map_err(|_| ControllerError::ChannelClosed)
    }

    /// Waits for any in-flight pass, then stops the controller.
    pub async fn shutdown(&self) -> Result<(), ControllerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| ControllerError::ChannelClosed)?;
        rx.await.map_err(|_| ControllerError::ChannelClosed)
    }

    /// Current snapshot.
    pub fn status(&self) -> SyncSnapshot {
        self.state.snapshot()
    }

    /// Live connectivity as reported by the host.
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Last published queue depth.
    pub fn pending_count(&self) -> usize {
        self.state.snapshot().pending_count
    }

    /// Last published replay status.
    pub fn sync_status(&self) -> SyncStatus {
        self.state.snapshot().sync_status
    }

    /// Snapshot receiver, woken on every change.
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.state.subscribe()
    }

    /// Event stream, including per-mutation failure detail.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events_tx.subscribe()
    }

    /// Shared state this controller publishes to.
    pub fn state(&self) -> &Arc<SyncState> {
        &self.state
    }
}

struct Worker {
    coordinator: Arc<SyncCoordinator>,
    state: Arc<SyncState>,
    events_tx: broadcast::Sender<SyncEvent>,
    connectivity: Connectivity,
    online: bool,
    in_flight: Option<ReplayTask>,
}

impl Worker {
    async fn seed(&mut self, online_rx: &mut watch::Receiver<bool>) {
        let queue = Arc::clone(self.coordinator.queue());
        let (pending, last_sync_at) =
            match tokio::task::spawn_blocking(move || (queue.size(), queue.last_sync_at())).await {
                Ok(seed) => seed,
                Err(err) => {
                    tracing::warn!(error = %err, "could not read queue at startup");
                    (0, None)
                }
            };
        self.online = *online_rx.borrow_and_update();
        self.state.init(pending, last_sync_at, self.online);
        tracing::debug!(pending, online = self.online, "sync state seeded");
    }

    async fn trigger(&mut self, cause: &'static str) -> TriggerOutcome {
        if self.in_flight.is_some() {
            tracing::debug!(cause, "replay already in flight, trigger ignored");
            return TriggerOutcome::Skipped(SkipReason::InFlight);
        }
        if !self.connectivity.is_online() {
            tracing::debug!(cause, "offline, trigger ignored");
            return TriggerOutcome::Skipped(SkipReason::Offline);
        }

        let pending = self.refresh_pending().await;
        if pending == 0 {
            return TriggerOutcome::Skipped(SkipReason::QueueEmpty);
        }

        tracing::info!(cause, pending, "scheduling replay");
        self.state.set_status(SyncStatus::Syncing);
        self.emit(SyncEvent::ReplayStarted { pending });

        let coordinator = Arc::clone(&self.coordinator);
        self.in_flight = Some(tokio::spawn(async move { coordinator.replay().await }));
        TriggerOutcome::Started { pending }
    }

    async fn connectivity_changed(&mut self, online: bool) {
        // The watch only wakes on a change, so an unchanged value here is a
        // round trip that coalesced before the loop got to it.
        if online == self.online {
            tracing::info!(online, "connectivity flapped");
            self.emit(SyncEvent::ConnectivityChanged { online: !online });
        } else {
            self.online = online;
            self.state.set_online(online);
            tracing::info!(online, "connectivity changed");
        }
        self.emit(SyncEvent::ConnectivityChanged { online });

        if online {
            self.trigger("reconnect").await;
        }
    }

    async fn poll(&mut self, replay_on_poll: bool) {
        let pending = self.refresh_pending().await;
        if replay_on_poll && pending > 0 && self.in_flight.is_none() {
            self.trigger("poll").await;
        }
    }

    async fn finish(&mut self, joined: Result<Result<SyncResult, ReplayError>, JoinError>) {
        match joined {
            Ok(Ok(result)) => {
                for failure in &result.errors {
                    self.emit(SyncEvent::MutationFailed {
                        id: failure.record.id(),
                        resource: failure.record.resource().to_string(),
                        error: failure.error.to_string(),
                    });
                }

                if result.is_clean() {
                    let now = Utc::now();
                    let queue = Arc::clone(self.coordinator.queue());
                    match tokio::task::spawn_blocking(move || queue.mark_synced(now)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => tracing::warn!(error = %err, "could not persist last sync time"),
                        Err(err) => tracing::warn!(error = %err, "could not persist last sync time"),
                    }
                    self.state.update(|snap| {
                        snap.sync_status = SyncStatus::Idle;
                        snap.last_sync_at = Some(now);
                    });
                } else {
                    self.state.set_status(SyncStatus::Error);
                }

                self.emit(SyncEvent::ReplayFinished {
                    success_count: result.success_count,
                    fail_count: result.fail_count,
                });
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "replay did not run");
                self.state.set_status(SyncStatus::Error);
                self.emit(SyncEvent::ReplayAborted {
                    reason: err.to_string(),
                });
            }
            Err(err) => {
                tracing::error!(error = %err, "replay task failed");
                self.state.set_status(SyncStatus::Error);
                self.emit(SyncEvent::ReplayAborted {
                    reason: err.to_string(),
                });
            }
        }

        self.refresh_pending().await;
    }

    async fn drain(&mut self) {
        if let Some(task) = self.in_flight.take() {
            let joined = task.await;
            self.finish(joined).await;
        }
    }

    async fn refresh_pending(&self) -> usize {
        let queue = Arc::clone(self.coordinator.queue());
        let count = match tokio::task::spawn_blocking(move || queue.size()).await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(error = %err, "pending count refresh failed");
                return self.state.snapshot().pending_count;
            }
        };
        if self.state.set_pending(count) {
            self.emit(SyncEvent::PendingChanged { count });
        }
        count
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events_tx.send(event);
    }
}

async fn join_in_flight(slot: &mut Option<ReplayTask>) -> Result<Result<SyncResult, ReplayError>, JoinError> {
    match slot.as_mut() {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}
