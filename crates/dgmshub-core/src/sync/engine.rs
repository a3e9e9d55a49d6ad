use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::events::{
    CatalogOrigin, CatalogResult, SkipReason, SyncDiagnostics, SyncEvent, SyncOutcome, SyncState,
};
use super::SyncError;
use crate::api::{ApiError, CatalogSource, IconSource};
use crate::config::Config;
use crate::connectivity::{ConnectivityChange, ConnectivityMonitor};
use crate::listeners::{ListenerRegistry, Subscription};
use crate::models::{parse_applications, CatalogSnapshot};
use crate::store::LocalStore;

/// Longest accepted sync cadence or resync threshold.
const MAX_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Longest accepted bound on a single fetch.
const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(10 * 60);

fn clamp_interval(interval: Duration) -> Duration {
    interval.clamp(Duration::from_secs(1), MAX_INTERVAL)
}

/// Timing knobs for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Periodic sync cadence
    pub sync_interval: Duration,
    /// Bound on a single catalog fetch
    pub request_timeout: Duration,
    /// Age after which the stored snapshot is reported stale
    pub stale_after_minutes: i64,
    /// Age after which `sync_if_stale` fetches again
    pub resync_after: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SyncSettings {
    fn from(config: &Config) -> Self {
        Self {
            sync_interval: clamp_interval(Duration::from_secs(config.sync_interval_secs)),
            request_timeout: Duration::from_secs(config.request_timeout_secs)
                .clamp(Duration::from_secs(1), MAX_REQUEST_TIMEOUT),
            stale_after_minutes: config.stale_after_minutes,
            resync_after: Duration::from_secs(
                u64::try_from(config.resync_after_minutes.max(0))
                    .unwrap_or(0)
                    .saturating_mul(60),
            )
            .min(MAX_INTERVAL),
        }
    }
}

#[derive(Default)]
struct EngineTasks {
    timer: Option<JoinHandle<()>>,
    connectivity: Option<JoinHandle<()>>,
    subscription: Option<Subscription>,
}

impl EngineTasks {
    fn shutdown(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(task) = self.connectivity.take() {
            task.abort();
        }
        if let Some(mut sub) = self.subscription.take() {
            sub.unsubscribe();
        }
    }
}

/// Which fetch-and-persist cycle ran last and how it ended.
#[derive(Debug, Clone, Copy, Default)]
struct CycleLog {
    started: u64,
    /// Id of the last cycle that ran to completion, and whether it stored a snapshot
    finished: Option<(u64, bool)>,
}

impl CycleLog {
    /// Whether the most recently started cycle completed and stored its snapshot.
    fn latest_succeeded(&self) -> bool {
        self.finished == Some((self.started, true))
    }
}

struct EngineInner {
    source: Arc<dyn CatalogSource>,
    icons: Option<Arc<dyn IconSource>>,
    store: LocalStore,
    monitor: ConnectivityMonitor,
    settings: Mutex<SyncSettings>,
    state: Mutex<SyncState>,
    /// Busy flag; `true` while a fetch-and-persist cycle runs
    syncing: watch::Sender<bool>,
    cycles: Mutex<CycleLog>,
    listeners: ListenerRegistry<SyncEvent>,
    tasks: Mutex<EngineTasks>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.tasks
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .shutdown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears the busy flag when dropped, including when the owning future is
/// cancelled mid-fetch.
struct BusyGuard<'a> {
    syncing: &'a watch::Sender<bool>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.syncing.send_replace(false);
    }
}

enum Cycle {
    Synced(CatalogSnapshot),
    /// Fetched fine but the store refused the write
    NotPersisted(CatalogSnapshot),
    Failed(SyncError),
}

/// Keeps the local catalog fresh and serves it, online or not.
/// Clone is cheap; clones share one engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        icons: Option<Arc<dyn IconSource>>,
        store: LocalStore,
        monitor: ConnectivityMonitor,
        settings: SyncSettings,
    ) -> Self {
        let (syncing, _) = watch::channel(false);
        let state = SyncState {
            is_reachable: monitor.is_reachable(),
            ..SyncState::default()
        };

        Self {
            inner: Arc::new(EngineInner {
                source,
                icons,
                store,
                monitor,
                settings: Mutex::new(settings),
                state: Mutex::new(state),
                syncing,
                cycles: Mutex::new(CycleLog::default()),
                listeners: ListenerRegistry::new(),
                tasks: Mutex::new(EngineTasks::default()),
            }),
        }
    }

    fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    fn weak(&self) -> Weak<EngineInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.inner.monitor
    }

    pub fn settings(&self) -> SyncSettings {
        *lock(&self.inner.settings)
    }

    pub fn is_online(&self) -> bool {
        self.inner.monitor.is_reachable()
    }

    pub fn is_syncing(&self) -> bool {
        *self.inner.syncing.borrow()
    }

    pub fn state(&self) -> SyncState {
        let mut state = lock(&self.inner.state).clone();
        state.is_syncing = self.is_syncing();
        state.is_reachable = self.is_online();
        state
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn add_listener<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.add(listener)
    }

    fn emit(&self, event: SyncEvent) {
        debug!(?event, "Sync event");
        self.inner.listeners.notify(&event);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn the periodic timer and the connectivity reaction task.
    /// Calling `start` on a running engine does nothing.
    pub fn start(&self) {
        let mut tasks = lock(&self.inner.tasks);
        if tasks.timer.is_some() {
            return;
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<ConnectivityChange>();
        tasks.subscription = Some(self.inner.monitor.subscribe(move |change| {
            let _ = tx.send(*change);
        }));

        let weak = self.weak();
        tasks.connectivity = Some(tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                SyncEngine::from_inner(inner).on_connectivity_change(change).await;
            }
        }));

        tasks.timer = Some(self.spawn_timer(self.settings().sync_interval));
        info!("Sync engine started");
    }

    /// Abort background tasks. Idempotent.
    pub fn stop(&self) {
        lock(&self.inner.tasks).shutdown();
        info!("Sync engine stopped");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.tasks).timer.is_some()
    }

    /// Change the periodic cadence, restarting the timer if it runs.
    pub fn set_sync_interval(&self, interval: Duration) {
        let interval = clamp_interval(interval);
        lock(&self.inner.settings).sync_interval = interval;

        let mut tasks = lock(&self.inner.tasks);
        if let Some(timer) = tasks.timer.take() {
            timer.abort();
            tasks.timer = Some(self.spawn_timer(interval));
        }
        info!(secs = interval.as_secs(), "Sync interval updated");
    }

    fn spawn_timer(&self, period: Duration) -> JoinHandle<()> {
        let weak = self.weak();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let engine = SyncEngine::from_inner(inner);
                if engine.is_online() && !engine.is_syncing() {
                    engine.sync_now().await;
                }
            }
        })
    }

    async fn on_connectivity_change(&self, change: ConnectivityChange) {
        lock(&self.inner.state).is_reachable = change.is_reachable;
        self.emit(SyncEvent::NetworkChange {
            is_online: change.is_reachable,
        });

        if change.is_restored() {
            info!("Network restored - triggering sync");
            self.sync_now().await;
        }
    }

    // =========================================================================
    // Sync
    // =========================================================================

    fn try_begin(&self) -> Option<BusyGuard<'_>> {
        let mut acquired = false;
        self.inner.syncing.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                acquired = true;
                true
            }
        });
        acquired.then(|| BusyGuard {
            syncing: &self.inner.syncing,
        })
    }

    async fn wait_until_idle(&self) {
        let mut rx = self.inner.syncing.subscribe();
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    async fn fetch_snapshot(&self) -> Result<CatalogSnapshot, SyncError> {
        let timeout = self.settings().request_timeout;
        let payload = match tokio::time::timeout(timeout, self.inner.source.fetch_catalog()).await
        {
            Ok(result) => result?,
            Err(_) => return Err(ApiError::Timeout(timeout).into()),
        };

        let parsed = parse_applications(&payload)?;
        if parsed.dropped > 0 {
            warn!(dropped = parsed.dropped, kept = parsed.entries.len(), "Dropped invalid catalog entries");
        }
        if parsed.entries.is_empty() {
            return Err(SyncError::NoValidEntries);
        }
        Ok(CatalogSnapshot::new(parsed.entries))
    }

    /// One fetch-validate-persist pass. The caller holds the busy guard.
    async fn run_cycle(&self) -> Cycle {
        let id = {
            let mut cycles = lock(&self.inner.cycles);
            cycles.started += 1;
            cycles.started
        };
        let cycle = self.fetch_and_store().await;
        lock(&self.inner.cycles).finished = Some((id, matches!(cycle, Cycle::Synced(_))));
        cycle
    }

    async fn fetch_and_store(&self) -> Cycle {
        info!(source = self.inner.source.label(), "Starting catalog sync");
        self.emit(SyncEvent::SyncStart);

        let snapshot = match self.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.record_failure(&e);
                return Cycle::Failed(e);
            }
        };

        if !self.inner.store.save(&snapshot) {
            self.record_failure(&SyncError::Storage);
            return Cycle::NotPersisted(snapshot);
        }

        let timestamp = snapshot.captured_at.unwrap_or_else(Utc::now);
        {
            let mut state = lock(&self.inner.state);
            state.last_sync = Some(timestamp);
            state.last_error = None;
        }
        self.spawn_icon_caching(&snapshot);

        info!(entries = snapshot.len(), "Catalog sync completed");
        self.emit(SyncEvent::SyncSuccess {
            timestamp,
            entry_count: snapshot.len(),
        });
        Cycle::Synced(snapshot)
    }

    fn record_failure(&self, error: &SyncError) {
        warn!(error = %error, "Catalog sync failed");
        lock(&self.inner.state).last_error = Some(error.to_string());
        self.emit(SyncEvent::SyncError {
            error: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn spawn_icon_caching(&self, snapshot: &CatalogSnapshot) {
        let Some(icons) = self.inner.icons.clone() else { return };
        let store = self.inner.store.clone();
        let snapshot = snapshot.clone();
        tokio::spawn(async move {
            let cached = store.cache_icons(icons.as_ref(), &snapshot).await;
            debug!(cached, total = snapshot.len(), "Icon caching finished");
        });
    }

    /// Fetch and persist now, unless offline or a sync is already running.
    pub async fn sync_now(&self) -> SyncOutcome {
        if !self.is_online() {
            debug!("Offline - skipping sync");
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        let Some(_guard) = self.try_begin() else {
            debug!("Sync already in progress - dropping trigger");
            return SyncOutcome::Skipped(SkipReason::AlreadySyncing);
        };

        match self.run_cycle().await {
            Cycle::Synced(snapshot) => SyncOutcome::Synced {
                timestamp: snapshot.captured_at.unwrap_or_else(Utc::now),
                entry_count: snapshot.len(),
            },
            Cycle::NotPersisted(_) => SyncOutcome::Failed(SyncError::Storage),
            Cycle::Failed(e) => SyncOutcome::Failed(e),
        }
    }

    /// Sync only when the stored catalog is older than the resync threshold,
    /// as on an app returning to the foreground.
    pub async fn sync_if_stale(&self) -> SyncOutcome {
        if !self.is_online() {
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        if self.is_syncing() {
            return SyncOutcome::Skipped(SkipReason::AlreadySyncing);
        }

        let threshold = chrono::Duration::from_std(self.settings().resync_after)
            .unwrap_or_else(|_| chrono::Duration::minutes(10));
        let due = match self.inner.store.last_sync() {
            Some(last) => Utc::now() - last > threshold,
            None => true,
        };

        if due {
            info!("Stored catalog is stale - syncing");
            self.sync_now().await
        } else {
            SyncOutcome::Skipped(SkipReason::Fresh)
        }
    }

    // =========================================================================
    // Catalog access
    // =========================================================================

    /// Get the catalog for display.
    ///
    /// Offline without `force_network`, the store answers immediately.
    /// Otherwise one bounded fetch is attempted, falling back to the store,
    /// then to an empty result. If a sync is already in flight this call
    /// waits for it instead of fetching in parallel.
    pub async fn get_catalog(&self, force_network: bool) -> CatalogResult {
        if !force_network && !self.is_online() {
            return self.cached_catalog();
        }

        let guard = match self.try_begin() {
            Some(guard) => guard,
            None => return self.join_in_flight().await,
        };
        let cycle = self.run_cycle().await;
        drop(guard);

        match cycle {
            Cycle::Synced(snapshot) => CatalogResult {
                message: format!("Loaded {} apps", snapshot.len()),
                snapshot,
                origin: CatalogOrigin::Network,
            },
            Cycle::NotPersisted(snapshot) => CatalogResult {
                message: format!("Loaded {} apps (not saved for offline use)", snapshot.len()),
                snapshot,
                origin: CatalogOrigin::Network,
            },
            Cycle::Failed(e) => self.fallback(&e),
        }
    }

    async fn join_in_flight(&self) -> CatalogResult {
        debug!("Joining in-flight sync");
        self.wait_until_idle().await;

        let cycles = *lock(&self.inner.cycles);
        let snapshot = self.inner.store.load();

        if cycles.latest_succeeded() && !snapshot.is_empty() {
            CatalogResult {
                message: format!("Loaded {} apps", snapshot.len()),
                snapshot,
                origin: CatalogOrigin::Network,
            }
        } else {
            // A cancelled cycle records no outcome
            let completed = cycles.finished.is_some_and(|(id, _)| id == cycles.started);
            let reason = completed
                .then(|| lock(&self.inner.state).last_error.clone())
                .flatten()
                .unwrap_or_else(|| "sync did not complete".to_string());
            Self::fallback_result(snapshot, &reason)
        }
    }

    fn fallback(&self, error: &SyncError) -> CatalogResult {
        Self::fallback_result(self.inner.store.load(), &error.to_string())
    }

    fn fallback_result(cached: CatalogSnapshot, reason: &str) -> CatalogResult {
        if cached.is_empty() {
            CatalogResult {
                snapshot: CatalogSnapshot::empty(),
                origin: CatalogOrigin::ErrorNoData,
                message: format!(
                    "Network error and no offline data available ({}). Please check your internet connection.",
                    reason
                ),
            }
        } else {
            CatalogResult {
                message: format!("Network error. Showing {} cached apps.", cached.len()),
                snapshot: cached,
                origin: CatalogOrigin::Cache,
            }
        }
    }

    /// Serve the local store without touching the network.
    pub fn cached_catalog(&self) -> CatalogResult {
        let snapshot = self.inner.store.load();
        if snapshot.is_empty() {
            CatalogResult {
                snapshot,
                origin: CatalogOrigin::NoDataAvailable,
                message: "No offline data available. Please connect to the internet to download apps."
                    .to_string(),
            }
        } else {
            CatalogResult {
                message: format!("Loaded {} apps from offline cache", snapshot.len()),
                snapshot,
                origin: CatalogOrigin::Cache,
            }
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Wipe the local store. Listeners hear `CacheCleared` on success.
    pub fn clear_cache(&self) -> bool {
        if !self.inner.store.clear() {
            return false;
        }
        lock(&self.inner.state).last_sync = None;
        info!("Cache cleared");
        self.emit(SyncEvent::CacheCleared {
            timestamp: Utc::now(),
        });
        true
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        lock(&self.inner.state)
            .last_sync
            .or_else(|| self.inner.store.last_sync())
    }

    pub fn diagnostics(&self) -> SyncDiagnostics {
        let settings = self.settings();
        let snapshot = self.inner.store.load();
        SyncDiagnostics {
            is_online: self.is_online(),
            is_syncing: self.is_syncing(),
            last_sync: self.last_sync(),
            cache_size_bytes: self.inner.store.size_on_disk(),
            entry_count: snapshot.len(),
            is_stale: snapshot.is_stale_after(settings.stale_after_minutes),
            sync_interval_secs: settings.sync_interval.as_secs(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entry::tests::entry;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Scripted catalog source: queued responses first, then `repeat`.
    struct ScriptedSource {
        queue: Mutex<VecDeque<Result<Value, ApiError>>>,
        repeat: Option<Value>,
        gate: Option<Arc<Notify>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn always(payload: Value) -> Self {
            Self {
                queue: Mutex::new(VecDeque::new()),
                repeat: Some(payload),
                gate: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                queue: Mutex::new(VecDeque::new()),
                repeat: None,
                gate: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CatalogSource for ScriptedSource {
        fn label(&self) -> &str {
            "scripted"
        }

        async fn fetch_catalog(&self) -> Result<Value, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(next) = self.queue.lock().unwrap().pop_front() {
                return next;
            }
            match &self.repeat {
                Some(payload) => Ok(payload.clone()),
                None => Err(ApiError::ServerError("backend down".to_string())),
            }
        }
    }

    fn payload() -> Value {
        json!({
            "success": true,
            "data": { "applications": [
                { "id": "lms", "name": "USchool Online", "url": "https://app.uschoolonline.com", "displayOrder": 7 },
                { "id": "web", "name": "DGMS Main Website", "url": "https://deigratiams.edu.gh/", "displayOrder": 1 },
                { "id": "parent", "name": "Parent Portal", "url": "https://deigratiams.edu.gh/users/parent-login/", "displayOrder": 4 },
                { "id": "lib", "name": "DGMS Library", "url": "https://library.deigratiams.edu.gh", "displayOrder": 4 }
            ]}
        })
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            sync_interval: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(5),
            stale_after_minutes: 60,
            resync_after: Duration::from_secs(600),
        }
    }

    struct StaticIcons;

    #[async_trait]
    impl IconSource for StaticIcons {
        async fn fetch_icon(&self, _url: &str) -> Result<Vec<u8>, ApiError> {
            Ok(vec![7u8; 32])
        }
    }

    fn engine_with(
        source: Arc<ScriptedSource>,
        online: bool,
        settings: SyncSettings,
    ) -> (tempfile::TempDir, SyncEngine) {
        build_engine(source, None, online, settings)
    }

    fn build_engine(
        source: Arc<ScriptedSource>,
        icons: Option<Arc<dyn IconSource>>,
        online: bool,
        settings: SyncSettings,
    ) -> (tempfile::TempDir, SyncEngine) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf()).unwrap();
        let engine = SyncEngine::new(
            source,
            icons,
            store,
            ConnectivityMonitor::new(online),
            settings,
        );
        (dir, engine)
    }

    fn record_events(engine: &SyncEngine) -> Arc<Mutex<Vec<SyncEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        engine.add_listener(move |event| sink.lock().unwrap().push(event.clone()));
        events
    }

    fn ids(result: &CatalogResult) -> Vec<&str> {
        result.snapshot.entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_network_catalog_is_sorted_and_persisted() {
        let source = Arc::new(ScriptedSource::always(payload()));
        let (_dir, engine) = engine_with(source, true, settings());

        let result = engine.get_catalog(true).await;
        assert_eq!(result.origin, CatalogOrigin::Network);
        assert_eq!(ids(&result), vec!["web", "lib", "parent", "lms"]);
        assert_eq!(engine.store().load(), result.snapshot);
        assert!(engine.state().last_sync.is_some());
    }

    #[tokio::test]
    async fn test_invalid_entry_dropped_from_catalog() {
        let source = Arc::new(ScriptedSource::always(json!({
            "success": true,
            "data": { "applications": [
                { "id": "broken", "name": "No URL" },
                { "id": "web", "name": "DGMS Main Website", "url": "https://deigratiams.edu.gh/" }
            ]}
        })));
        let (_dir, engine) = engine_with(source, true, settings());

        let result = engine.get_catalog(true).await;
        assert_eq!(result.snapshot.len(), 1);
        assert_eq!(ids(&result), vec!["web"]);
    }

    #[tokio::test]
    async fn test_network_failure_falls_back_to_cache() {
        let source = Arc::new(ScriptedSource::failing());
        let (_dir, engine) = engine_with(source, true, settings());
        let cached = CatalogSnapshot::new(vec![
            entry("a", "Alpha", 1),
            entry("b", "Beta", 2),
            entry("c", "Gamma", 3),
        ]);
        assert!(engine.store().save(&cached));

        let result = engine.get_catalog(true).await;
        assert!(result.from_cache());
        assert_eq!(result.snapshot, cached);
    }

    #[tokio::test]
    async fn test_network_failure_without_cache_is_error_no_data() {
        let source = Arc::new(ScriptedSource::failing());
        let (_dir, engine) = engine_with(source, true, settings());
        let events = record_events(&engine);

        let result = engine.get_catalog(true).await;
        assert_eq!(result.origin, CatalogOrigin::ErrorNoData);
        assert!(result.snapshot.is_empty());
        assert!(matches!(events.lock().unwrap().last(), Some(SyncEvent::SyncError { .. })));
    }

    #[tokio::test]
    async fn test_offline_reads_are_idempotent_and_skip_network() {
        let source = Arc::new(ScriptedSource::always(payload()));
        let (_dir, engine) = engine_with(Arc::clone(&source), false, settings());
        engine.store().save(&CatalogSnapshot::new(vec![entry("a", "Alpha", 1)]));

        let first = engine.get_catalog(false).await;
        let second = engine.get_catalog(false).await;
        assert_eq!(first, second);
        assert_eq!(first.origin, CatalogOrigin::Cache);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_forced_fetch_while_offline_still_attempts_network() {
        let source = Arc::new(ScriptedSource::always(payload()));
        let (_dir, engine) = engine_with(Arc::clone(&source), false, settings());

        let result = engine.get_catalog(true).await;
        assert_eq!(result.origin, CatalogOrigin::Network);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_sync_triggers_issue_one_fetch() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(ScriptedSource::always(payload()).gated(Arc::clone(&gate)));
        let (_dir, engine) = engine_with(Arc::clone(&source), true, settings());

        let background = engine.clone();
        let first = tokio::spawn(async move { background.sync_now().await });
        while source.calls() == 0 {
            tokio::task::yield_now().await;
        }

        let second = engine.sync_now().await;
        assert!(matches!(second, SyncOutcome::Skipped(SkipReason::AlreadySyncing)));

        gate.notify_one();
        assert!(first.await.unwrap().is_synced());
        assert_eq!(source.calls(), 1);
        assert!(!engine.is_syncing());
    }

    #[tokio::test]
    async fn test_get_catalog_joins_in_flight_sync() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(ScriptedSource::always(payload()).gated(Arc::clone(&gate)));
        let (_dir, engine) = engine_with(Arc::clone(&source), true, settings());

        let background = engine.clone();
        let sync = tokio::spawn(async move { background.sync_now().await });
        while source.calls() == 0 {
            tokio::task::yield_now().await;
        }

        let reader = engine.clone();
        let read = tokio::spawn(async move { reader.get_catalog(true).await });
        while engine.inner.syncing.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        assert!(sync.await.unwrap().is_synced());
        let result = read.await.unwrap();
        assert_eq!(result.origin, CatalogOrigin::Network);
        assert_eq!(result.snapshot.len(), 4);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_sync_keeps_stored_snapshot() {
        let source = Arc::new(ScriptedSource::always(json!({
            "success": true,
            "data": { "applications": [ { "name": "Nameless link" } ] }
        })));
        let (_dir, engine) = engine_with(source, true, settings());
        let good = CatalogSnapshot::new(vec![entry("a", "Alpha", 1)]);
        engine.store().save(&good);
        let events = record_events(&engine);

        let outcome = engine.sync_now().await;
        assert!(matches!(outcome, SyncOutcome::Failed(SyncError::NoValidEntries)));
        assert_eq!(engine.store().load(), good);

        let events = events.lock().unwrap();
        assert_eq!(events[0], SyncEvent::SyncStart);
        assert!(matches!(events[1], SyncEvent::SyncError { .. }));
    }

    #[tokio::test]
    async fn test_timeout_clears_busy_flag() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(ScriptedSource::always(payload()).gated(gate));
        let fast = SyncSettings {
            request_timeout: Duration::from_millis(50),
            ..settings()
        };
        let (_dir, engine) = engine_with(source, true, fast);

        let result = engine.get_catalog(true).await;
        assert_eq!(result.origin, CatalogOrigin::ErrorNoData);
        assert!(!engine.is_syncing());
        assert!(engine.state().last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancelled_fetch_clears_busy_flag() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(ScriptedSource::always(payload()).gated(gate));
        let (_dir, engine) = engine_with(Arc::clone(&source), true, settings());

        let background = engine.clone();
        let task = tokio::spawn(async move { background.get_catalog(true).await });
        while source.calls() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(engine.is_syncing());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!engine.is_syncing());
    }

    #[tokio::test]
    async fn test_sync_skipped_when_offline() {
        let source = Arc::new(ScriptedSource::always(payload()));
        let (_dir, engine) = engine_with(Arc::clone(&source), false, settings());

        assert!(matches!(engine.sync_now().await, SyncOutcome::Skipped(SkipReason::Offline)));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_sync_if_stale() {
        let source = Arc::new(ScriptedSource::always(payload()));
        let (_dir, engine) = engine_with(Arc::clone(&source), true, settings());

        assert!(engine.sync_if_stale().await.is_synced());
        assert!(matches!(engine.sync_if_stale().await, SyncOutcome::Skipped(SkipReason::Fresh)));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_clear_cache_and_diagnostics() {
        let source = Arc::new(ScriptedSource::always(payload()));
        let (_dir, engine) = engine_with(source, true, settings());
        engine.get_catalog(true).await;

        let diagnostics = engine.diagnostics();
        assert!(diagnostics.is_online);
        assert_eq!(diagnostics.entry_count, 4);
        assert!(!diagnostics.is_stale);
        assert!(diagnostics.last_sync.is_some());
        assert_eq!(diagnostics.sync_interval_secs, 3600);

        let events = record_events(&engine);
        assert!(engine.clear_cache());
        let diagnostics = engine.diagnostics();
        assert_eq!(diagnostics.entry_count, 0);
        assert!(diagnostics.last_sync.is_none());
        assert!(diagnostics.is_stale);
        assert!(matches!(events.lock().unwrap()[0], SyncEvent::CacheCleared { .. }));
    }

    #[tokio::test]
    async fn test_offline_start_then_reconnect_populates_cache() {
        let source = Arc::new(ScriptedSource::always(payload()));
        let (_dir, engine) = engine_with(source, false, settings());

        let result = engine.get_catalog(false).await;
        assert_eq!(result.origin, CatalogOrigin::NoDataAvailable);
        assert!(result.snapshot.is_empty());

        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.add_listener(move |event| {
            let _ = tx.send(event.clone());
        });
        engine.start();
        engine.monitor().report(true);

        let mut saw_network_change = false;
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("sync events should arrive")
                .expect("channel open");
            match event {
                SyncEvent::NetworkChange { is_online } => {
                    assert!(is_online);
                    saw_network_change = true;
                }
                SyncEvent::SyncSuccess { entry_count, .. } => {
                    assert_eq!(entry_count, 4);
                    break;
                }
                SyncEvent::SyncError { error, .. } => panic!("sync failed: {}", error),
                _ => {}
            }
        }
        assert!(saw_network_change);

        assert_eq!(engine.cached_catalog().snapshot.len(), 4);
        let result = engine.get_catalog(false).await;
        assert_eq!(result.snapshot.len(), 4);
        engine.stop();
        engine.stop();
    }

    #[tokio::test]
    async fn test_periodic_timer_syncs() {
        let source = Arc::new(ScriptedSource::always(payload()));
        let quick = SyncSettings {
            sync_interval: Duration::from_secs(3600),
            ..settings()
        };
        let (_dir, engine) = engine_with(Arc::clone(&source), true, quick);

        engine.start();
        assert!(engine.is_running());
        engine.set_sync_interval(Duration::from_millis(20));

        let deadline = Instant::now() + Duration::from_secs(5);
        while source.calls() == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        engine.stop();
        assert!(source.calls() >= 1);
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_sync_caches_entry_icons_in_background() {
        let source = Arc::new(ScriptedSource::always(json!({
            "success": true,
            "data": { "applications": [
                { "id": "web", "name": "DGMS Main Website", "url": "https://deigratiams.edu.gh/",
                  "iconUrl": "https://deigratiams.edu.gh/logo.png" }
            ]}
        })));
        let (_dir, engine) = build_engine(source, Some(Arc::new(StaticIcons)), true, settings());

        assert!(engine.sync_now().await.is_synced());
        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.store().local_icon_path("web").is_none() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(engine.store().local_icon_path("web").is_some());
        assert_eq!(engine.store().size_on_disk(), 32);
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_stored_snapshot() {
        let source = Arc::new(ScriptedSource::always(payload()));
        let (dir, engine) = engine_with(source, true, settings());
        let good = CatalogSnapshot::new(vec![entry("a", "Alpha", 1)]);
        assert!(engine.store().save(&good));

        std::fs::create_dir_all(dir.path().join("catalog.tmp").join("occupied")).unwrap();
        let events = record_events(&engine);

        let outcome = engine.sync_now().await;
        assert!(matches!(outcome, SyncOutcome::Failed(SyncError::Storage)));
        assert_eq!(engine.store().load(), good);
        assert!(!events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, SyncEvent::SyncSuccess { .. })));
    }

    #[tokio::test]
    async fn test_joining_after_snapshot_was_captured_reports_network() {
        let source = Arc::new(ScriptedSource::always(payload()));
        let (_dir, engine) = engine_with(source, true, settings());

        // The cycle has finished and stamped its snapshot; the busy flag is still held
        let guard = engine.try_begin().unwrap();
        assert!(matches!(engine.run_cycle().await, Cycle::Synced(_)));
        tokio::time::sleep(Duration::from_millis(5)).await;

        let reader = engine.clone();
        let read = tokio::spawn(async move { reader.get_catalog(true).await });
        while engine.inner.syncing.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }
        drop(guard);

        let result = read.await.unwrap();
        assert_eq!(result.origin, CatalogOrigin::Network);
        assert_eq!(result.message, "Loaded 4 apps");
    }

    #[tokio::test]
    async fn test_joining_a_cancelled_sync_falls_back() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(ScriptedSource::always(payload()).gated(gate));
        let (_dir, engine) = engine_with(Arc::clone(&source), true, settings());

        let background = engine.clone();
        let task = tokio::spawn(async move { background.sync_now().await });
        while source.calls() == 0 {
            tokio::task::yield_now().await;
        }

        let reader = engine.clone();
        let read = tokio::spawn(async move { reader.get_catalog(true).await });
        while engine.inner.syncing.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }
        task.abort();

        let result = read.await.unwrap();
        assert_eq!(result.origin, CatalogOrigin::ErrorNoData);
        assert!(result.message.contains("sync did not complete"));
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_extreme_config_values_are_clamped() {
        let config = Config {
            sync_interval_secs: u64::MAX,
            request_timeout_secs: u64::MAX,
            resync_after_minutes: i64::MAX,
            ..Config::default()
        };
        let settings = SyncSettings::from(&config);
        assert_eq!(settings.sync_interval, MAX_INTERVAL);
        assert_eq!(settings.request_timeout, MAX_REQUEST_TIMEOUT);
        assert_eq!(settings.resync_after, MAX_INTERVAL);

        let config = Config {
            sync_interval_secs: 0,
            resync_after_minutes: -5,
            ..Config::default()
        };
        let settings = SyncSettings::from(&config);
        assert_eq!(settings.sync_interval, Duration::from_secs(1));
        assert_eq!(settings.resync_after, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_set_sync_interval_clamps_huge_values() {
        let source = Arc::new(ScriptedSource::always(payload()));
        let (_dir, engine) = engine_with(source, true, settings());
        engine.start();

        engine.set_sync_interval(Duration::MAX);
        assert_eq!(engine.settings().sync_interval, MAX_INTERVAL);
        assert!(engine.is_running());
        engine.stop();
    }
}
