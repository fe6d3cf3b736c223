//! Network reachability tracking.
//!
//! The monitor holds the last known [`NetworkState`] and fans transitions
//! out to subscribers. State is pushed in by the platform layer through
//! [`ConnectivityMonitor::update`], or driven by a heartbeat against a
//! [`ReachabilityProbe`] when no platform signal exists.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A point-in-time snapshot of the device's network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkState {
    /// A network interface is up.
    pub connected: bool,
    /// The backend answered a probe; `None` if not yet known.
    pub reachable: Option<bool>,
    /// Interface kind as reported by the platform (`wifi`, `cellular`, ...).
    pub kind: String,
}

impl NetworkState {
    /// A connected and reachable network.
    pub fn online(kind: impl Into<String>) -> Self {
        Self {
            connected: true,
            reachable: Some(true),
            kind: kind.into(),
        }
    }

    /// No network at all.
    pub fn offline() -> Self {
        Self {
            connected: false,
            reachable: Some(false),
            kind: "none".into(),
        }
    }

    /// Connected, reachability not yet probed.
    pub fn unknown(kind: impl Into<String>) -> Self {
        Self {
            connected: true,
            reachable: None,
            kind: kind.into(),
        }
    }

    /// Optimistic predicate: only an explicit disconnect counts as offline.
    pub fn is_online(&self) -> bool {
        self.connected
    }

    /// True only once the backend is known to be reachable.
    pub fn is_confirmed_online(&self) -> bool {
        self.connected && self.reachable == Some(true)
    }
}

impl Default for NetworkState {
    fn default() -> Self {
        Self::unknown("unknown")
    }
}

/// Checks whether the backend can be reached.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Returns true if the backend answered.
    async fn probe(&self) -> bool;
}

type Listener = Arc<dyn Fn(&NetworkState) + Send + Sync>;

struct MonitorInner {
    state: Mutex<NetworkState>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_id: Mutex<u64>,
}

/// Observes network transitions and notifies subscribers.
///
/// Cloning yields another handle to the same monitor.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectivityMonitor {
    /// Creates a monitor starting from `initial`.
    pub fn new(initial: NetworkState) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                state: Mutex::new(initial),
                listeners: Mutex::new(Vec::new()),
                next_id: Mutex::new(0),
            }),
        }
    }

    /// Returns the current state.
    pub fn current_state(&self) -> NetworkState {
        self.inner.state.lock().clone()
    }

    /// Returns true unless the device is explicitly disconnected.
    pub fn is_online(&self) -> bool {
        self.inner.state.lock().is_online()
    }

    /// Registers `callback`, invoking it immediately with the current state
    /// and again on every transition.
    ///
    /// The callback stays registered until the returned [`Subscription`] is
    /// dropped or unsubscribed.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&NetworkState) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(callback);
        let id = {
            let mut next = self.inner.next_id.lock();
            *next += 1;
            *next
        };
        self.inner.listeners.lock().push((id, listener.clone()));

        let current = self.current_state();
        listener(&current);

        Subscription {
            monitor: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Records a new state and notifies subscribers if it changed.
    ///
    /// Returns true if this was a transition.
    pub fn update(&self, state: NetworkState) -> bool {
        {
            let mut current = self.inner.state.lock();
            if *current == state {
                return false;
            }
            info!(
                connected = state.connected,
                reachable = ?state.reachable,
                kind = %state.kind,
                "network state changed"
            );
            *current = state.clone();
        }

        // listeners may subscribe or unsubscribe from inside the callback
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&state);
        }
        true
    }

    /// Returns the number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Polls `probe` every `interval` and feeds the result into the monitor.
    ///
    /// Must be called from within a tokio runtime. The task ends when the
    /// returned handle is aborted or every monitor handle is dropped.
    pub fn spawn_heartbeat(
        &self,
        probe: Arc<dyn ReachabilityProbe>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let reachable = probe.probe().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("connectivity monitor dropped, heartbeat stopping");
                    break;
                };
                let monitor = ConnectivityMonitor { inner };
                let mut state = monitor.current_state();
                state.connected = reachable;
                state.reachable = Some(reachable);
                if !reachable {
                    state.kind = "none".into();
                } else if state.kind == "none" {
                    state.kind = "unknown".into();
                }
                monitor.update(state);
            }
        })
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(NetworkState::default())
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("state", &self.current_state())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle to a registered callback. Dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    monitor: Weak<MonitorInner>,
    id: u64,
}

impl Subscription {
    /// Removes the callback. Other subscribers are unaffected.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.monitor.upgrade() {
            inner.listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
