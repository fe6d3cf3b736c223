//! Sync reconciler: drains the mutation queue against the server.

use crate::connectivity::{NetworkState, Subscription};
use crate::error::{SyncError, SyncResult};
use crate::gateway::RequestGateway;
use crate::transport::RemoteTransport;
use chrono::{DateTime, Utc};
use mealsync_protocol::{ApiEnvelope, MutationKind, QueuedMutation};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The current state of the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No pass is running.
    Idle,
    /// A pass is draining the queue.
    Syncing,
}

/// Counts reported by one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Mutations accepted by the server and dequeued.
    pub synced: u32,
    /// Mutations dropped after reaching the retry ceiling.
    pub failed: u32,
}

impl SyncOutcome {
    /// Returns true if the pass did nothing.
    pub fn is_empty(&self) -> bool {
        self.synced == 0 && self.failed == 0
    }
}

/// Statistics about sync passes.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Number of passes that ran (not counting skipped ones).
    pub passes_completed: u64,
    /// Total mutations applied.
    pub total_synced: u64,
    /// Total mutations dropped.
    pub total_failed: u64,
    /// End of the last pass.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Last per-mutation error of the last pass.
    pub last_error: Option<String>,
}

#[derive(Default)]
struct Lifecycle {
    subscription: Option<Subscription>,
    ticker: Option<JoinHandle<()>>,
}

struct Inner<T: RemoteTransport> {
    gateway: Arc<RequestGateway<T>>,
    syncing: AtomicBool,
    stats: RwLock<SyncStats>,
    lifecycle: Mutex<Lifecycle>,
}

/// Releases the single-flight flag when the pass ends, however it ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Replays queued mutations when connectivity returns.
///
/// # Invariants
///
/// - At most one pass runs at a time; overlapping calls return an empty outcome
/// - Mutations are replayed oldest-first
/// - A failing mutation never stops the rest of the pass
///
/// Cloning yields another handle to the same reconciler.
pub struct SyncReconciler<T: RemoteTransport + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: RemoteTransport + 'static> Clone for SyncReconciler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: RemoteTransport + 'static> SyncReconciler<T> {
    /// Creates a stopped reconciler.
    pub fn new(gateway: Arc<RequestGateway<T>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                syncing: AtomicBool::new(false),
                stats: RwLock::new(SyncStats::default()),
                lifecycle: Mutex::new(Lifecycle::default()),
            }),
        }
    }

    /// Returns the gateway.
    pub fn gateway(&self) -> &Arc<RequestGateway<T>> {
        &self.inner.gateway
    }

    /// Returns the current state.
    pub fn state(&self) -> SyncState {
        if self.inner.syncing.load(Ordering::Acquire) {
            SyncState::Syncing
        } else {
            SyncState::Idle
        }
    }

    /// Returns the accumulated stats.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.read().clone()
    }

    /// Returns the number of queued mutations.
    pub fn pending_count(&self) -> usize {
        self.inner.gateway.queue().size()
    }

    /// Runs one pass over the queue.
    ///
    /// Returns immediately with an empty outcome when offline or when
    /// another pass is running. Never fails; per-mutation errors end up in
    /// the counts and in [`SyncStats::last_error`].
    pub async fn sync(&self) -> SyncOutcome {
        self.inner.sync().await
    }

    /// Runs one pass and wraps the counts in the API envelope.
    pub async fn sync_queue(&self) -> ApiEnvelope<SyncOutcome> {
        let outcome = self.sync().await;
        ApiEnvelope::ok_with_message(
            outcome,
            format!("Synced {}, failed {}", outcome.synced, outcome.failed),
        )
    }

    /// Starts syncing automatically whenever the backend becomes reachable.
    ///
    /// Also starts the periodic nudge if the configuration has a sync
    /// interval. Like the reconnect trigger, a tick only syncs while the
    /// backend is confirmed reachable, so ticks spent on a connected but
    /// unreachable network do not use up retries. Calling it again while
    /// started does nothing. Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.subscription.is_some() {
            debug!("reconciler already started");
            return;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "no tokio runtime, automatic sync disabled");
                return;
            }
        };

        if let Some(interval) = self.inner.gateway.config().sync_interval {
            let weak = Arc::downgrade(&self.inner);
            lifecycle.ticker = Some(runtime.spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                // the first tick completes immediately
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    if !inner.gateway.connectivity().current_state().is_confirmed_online() {
                        debug!("backend not confirmed reachable, periodic sync skipped");
                        continue;
                    }
                    let outcome = inner.sync().await;
                    debug!(synced = outcome.synced, failed = outcome.failed, "periodic sync done");
                }
            }));
        }

        let weak = Arc::downgrade(&self.inner);
        let subscription = self
            .inner
            .gateway
            .connectivity()
            .subscribe(move |state: &NetworkState| {
                if !state.is_confirmed_online() {
                    return;
                }
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                runtime.spawn(async move {
                    let outcome = inner.sync().await;
                    debug!(synced = outcome.synced, failed = outcome.failed, "reconnect sync done");
                });
            });
        lifecycle.subscription = Some(subscription);
        info!("reconciler started");
    }

    /// Stops automatic syncing. A pass already running completes.
    pub fn stop(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        let was_running = lifecycle.subscription.take().is_some();
        if let Some(ticker) = lifecycle.ticker.take() {
            ticker.abort();
        }
        if was_running {
            info!("reconciler stopped");
        }
    }

    /// Returns true between [`SyncReconciler::start`] and [`SyncReconciler::stop`].
    pub fn is_started(&self) -> bool {
        self.inner.lifecycle.lock().subscription.is_some()
    }
}

impl<T: RemoteTransport + 'static> Inner<T> {
    async fn sync(&self) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();

        if !self.gateway.connectivity().is_online() {
            debug!("offline, sync skipped");
            return outcome;
        }

        let Some(_flight) = FlightGuard::acquire(&self.syncing) else {
            debug!("sync already in progress");
            return outcome;
        };

        let queue = self.gateway.queue();
        let snapshot = queue.get_all();
        if snapshot.is_empty() {
            return outcome;
        }

        info!(pending = snapshot.len(), "sync pass started");
        let mut last_error = None;

        for queued in snapshot {
            // dropped since the snapshot was taken, e.g. a cancelled create
            let Some(mutation) = queue.begin(&queued.id) else {
                continue;
            };

            match self.apply(&mutation).await {
                Ok(()) => outcome.synced += 1,
                Err(e) => {
                    warn!(
                        mutation = %mutation.id,
                        kind = ?mutation.kind,
                        endpoint = %mutation.endpoint,
                        error = %e,
                        "mutation replay failed"
                    );
                    last_error = Some(e.to_string());
                    if queue.get(&mutation.id).is_none() {
                        debug!(mutation = %mutation.id, "mutation cancelled while in flight");
                        continue;
                    }
                    if !queue.increment_retry(&mutation.id) {
                        outcome.failed += 1;
                        let dropped = SyncError::RetryCeilingExceeded {
                            mutation_id: mutation.id.clone(),
                        };
                        last_error = Some(dropped.to_string());
                    }
                }
            }
        }

        info!(synced = outcome.synced, failed = outcome.failed, "sync pass finished");

        let mut stats = self.stats.write();
        stats.passes_completed += 1;
        stats.total_synced += u64::from(outcome.synced);
        stats.total_failed += u64::from(outcome.failed);
        stats.last_sync_time = Some(Utc::now());
        stats.last_error = last_error;

        outcome
    }

    async fn apply(&self, mutation: &QueuedMutation) -> SyncResult<()> {
        let confirmed = self.gateway.replay(mutation).await?;

        match (mutation.kind, confirmed) {
            (MutationKind::Create, confirmed) => self.gateway.settle_create(mutation, confirmed),
            (MutationKind::Update, Some(meal)) => {
                // a meal deleted meanwhile stays deleted
                self.gateway.cache().refresh(meal);
                self.gateway.queue().dequeue(&mutation.id);
            }
            (MutationKind::Update, None) | (MutationKind::Delete, _) => {
                self.gateway.queue().dequeue(&mutation.id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flight_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let first = FlightGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(FlightGuard::acquire(&flag).is_none());

        drop(first);
        assert!(!flag.load(Ordering::SeqCst));
        assert!(FlightGuard::acquire(&flag).is_some());
    }

    #[test]
    fn outcome_wire_shape() {
        let json = serde_json::to_value(SyncOutcome { synced: 2, failed: 1 }).unwrap();
        assert_eq!(json, serde_json::json!({ "synced": 2, "failed": 1 }));
        assert!(SyncOutcome::default().is_empty());
    }
}
