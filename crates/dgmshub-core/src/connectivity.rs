//! Network reachability tracking.
//!
//! `ConnectivityMonitor` holds the current reachability and notifies
//! subscribers once per transition. It never polls: a platform adapter
//! reports observations through `report`. On desktop that adapter is
//! `spawn_reachability_check`, which tries a TCP connection to the API host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::listeners::{ListenerRegistry, Subscription};

/// How long a single reachability check may take.
const CHECK_CONNECT_TIMEOUT_SECS: u64 = 3;

/// A reachability transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityChange {
    pub was_reachable: bool,
    pub is_reachable: bool,
}

impl ConnectivityChange {
    /// Unreachable → reachable.
    pub fn is_restored(&self) -> bool {
        !self.was_reachable && self.is_reachable
    }
}

struct MonitorInner {
    reachable: AtomicBool,
    listeners: ListenerRegistry<ConnectivityChange>,
}

/// Current network reachability plus transition notifications.
/// Clone is cheap and every clone observes the same state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

impl Default for ConnectivityMonitor {
    /// Starts out assuming the network is reachable.
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityMonitor {
    pub fn new(initially_reachable: bool) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                reachable: AtomicBool::new(initially_reachable),
                listeners: ListenerRegistry::new(),
            }),
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.inner.reachable.load(Ordering::SeqCst)
    }

    /// Record an observation from the platform. Subscribers are notified only
    /// when it differs from the previous state. Returns whether it did.
    pub fn report(&self, reachable: bool) -> bool {
        let was_reachable = self.inner.reachable.swap(reachable, Ordering::SeqCst);
        if was_reachable == reachable {
            return false;
        }

        info!(online = reachable, "Network status changed");
        self.inner.listeners.notify(&ConnectivityChange {
            was_reachable,
            is_reachable: reachable,
        });
        true
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectivityChange) + Send + Sync + 'static,
    {
        self.inner.listeners.add(listener)
    }

    /// Drop all subscribers. Outstanding subscriptions become no-ops.
    pub fn dispose(&self) {
        self.inner.listeners.dispose();
    }
}

/// `host:port` to check for a base URL, using the scheme's default port.
pub fn check_target(base_url: &str) -> Option<String> {
    let url = Url::parse(base_url).ok()?;
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(format!("{}:{}", host, port))
}

/// One reachability check: can a TCP connection be opened in time?
pub async fn check_once(target: &str) -> bool {
    let connect = TcpStream::connect(target);
    match tokio::time::timeout(Duration::from_secs(CHECK_CONNECT_TIMEOUT_SECS), connect).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(target = target, error = %e, "Reachability check failed");
            false
        }
        Err(_) => {
            debug!(target = target, "Reachability check timed out");
            false
        }
    }
}

/// Spawn the desktop stand-in for a platform network-change primitive.
///
/// The task checks `target` every `interval` and reports to `monitor`;
/// the monitor turns repeated observations into single transitions.
pub fn spawn_reachability_check(
    monitor: ConnectivityMonitor,
    target: String,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reachable = check_once(&target).await;
            monitor.report(reachable);
        }
    })
}
