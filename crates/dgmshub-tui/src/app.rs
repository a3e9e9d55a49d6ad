//! Application state management for the DGMS Hub terminal launcher.
//!
//! This module contains the core `App` struct: the catalog view, UI state,
//! the sync engine handle and the channel that carries background results
//! (catalog loads and sync events) back to the render loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use dgmshub_core::catalog::{resolve_icon, BrowserTarget, CatalogView, IconRef};
use dgmshub_core::connectivity::{check_target, spawn_reachability_check};
use dgmshub_core::repository::{self, RepositorySource};
use dgmshub_core::sync::{CatalogOrigin, CatalogResult, SyncDiagnostics, SyncEvent, SyncSettings};
use dgmshub_core::{
    ApiClient, BackendConfig, CatalogSource, Config, ConnectivityMonitor, IconSource, LocalStore,
    Subscription, SyncEngine,
};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the background message channel.
/// Sync events arrive a handful at a time; catalog loads are one per refresh.
const CHANNEL_BUFFER_SIZE: usize = 32;

/// Maximum length for search input.
const MAX_SEARCH_LENGTH: usize = 64;

/// Sync cadences offered by the diagnostics overlay, in seconds.
const SYNC_INTERVAL_STEPS: [u64; 6] = [60, 5 * 60, 15 * 60, 30 * 60, 60 * 60, 6 * 60 * 60];

// ============================================================================
// UI State Types
// ============================================================================

/// Overall application state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Normal,
    Searching,
    ShowingHelp,
    ShowingDiagnostics,
    ConfirmingClearCache,
    Browsing,
    Quitting,
}

/// Results sent from background tasks and engine listeners to the UI loop.
#[derive(Debug)]
enum BackgroundMessage {
    Catalog(CatalogResult),
    Sync(SyncEvent),
}

// ============================================================================
// Engine wiring
// ============================================================================

/// Build the sync engine for `config`: catalog source from the configured
/// backend, icons from the network, store in the cache directory.
///
/// Returns the engine and, for the remote backend, the reachability check.
pub fn build_engine(config: &Config) -> Result<(SyncEngine, Option<JoinHandle<()>>)> {
    let timeout = Duration::from_secs(config.request_timeout_secs.max(1));
    let api = Arc::new(ApiClient::with_timeout(&config.api_base_url, timeout)?);
    let store = LocalStore::new(config.cache_dir()?)?;
    let monitor = ConnectivityMonitor::default();

    let icons: Arc<dyn IconSource> = api.clone();
    let source: Arc<dyn CatalogSource> = match repository::open(&config.backend)? {
        Some(repo) => Arc::new(RepositorySource::new(repo)),
        None => api,
    };

    let reachability = match (&config.backend, check_target(&config.api_base_url)) {
        (BackendConfig::Remote, Some(target)) => {
            debug!(target = %target, "Starting reachability check");
            Some(spawn_reachability_check(
                monitor.clone(),
                target,
                Duration::from_secs(config.reachability_interval_secs.max(1)),
            ))
        }
        _ => None,
    };

    let engine = SyncEngine::new(
        source,
        Some(icons),
        store,
        monitor,
        SyncSettings::from(config),
    );
    Ok((engine, reachability))
}

// ============================================================================
// Main Application Struct
// ============================================================================

/// Main application state container
pub struct App {
    pub config: Config,
    pub engine: SyncEngine,
    reachability: Option<JoinHandle<()>>,

    // UI State
    pub state: AppState,
    pub view: CatalogView,
    pub selection: usize,
    /// Tiles per row, updated from the terminal width each frame
    pub grid_columns: usize,
    pub browsing: Option<BrowserTarget>,
    pub diagnostics: Option<SyncDiagnostics>,

    // Connectivity / sync indicators
    pub is_online: bool,
    pub is_syncing: bool,
    pub loading: bool,

    // Background channel
    rx: mpsc::Receiver<BackgroundMessage>,
    tx: mpsc::Sender<BackgroundMessage>,
    subscription: Subscription,

    // Status message
    pub status_message: Option<String>,
}

impl App {
    /// Create a new application instance
    pub fn new(config: Config) -> Result<Self> {
        let (engine, reachability) = build_engine(&config)?;
        Ok(Self::with_engine(config, engine, reachability))
    }

    pub fn with_engine(
        config: Config,
        engine: SyncEngine,
        reachability: Option<JoinHandle<()>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        // Listeners run on whatever task emits; hand events to the UI loop
        let listener_tx = tx.clone();
        let subscription = engine.add_listener(move |event| {
            if let Err(e) = listener_tx.try_send(BackgroundMessage::Sync(event.clone())) {
                warn!(error = %e, "Dropped sync event");
            }
        });

        let is_online = engine.is_online();

        Self {
            config,
            engine,
            reachability,

            state: AppState::Normal,
            view: CatalogView::new(),
            selection: 0,
            grid_columns: 1,
            browsing: None,
            diagnostics: None,

            is_online,
            is_syncing: false,
            loading: false,

            rx,
            tx,
            subscription,

            status_message: None,
        }
    }

    /// Show whatever is stored, then start the engine and load in the background.
    pub fn start(&mut self) {
        self.view.apply(self.engine.cached_catalog());
        self.engine.start();
        self.refresh(false);
    }

    /// The terminal regained focus: re-sync if the stored catalog has aged.
    pub fn on_focus_gained(&mut self) {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let outcome = engine.sync_if_stale().await;
            debug!(?outcome, "Focus sync check");
        });
    }

    /// Stop background work before exit.
    pub fn shutdown(&mut self) {
        self.subscription.unsubscribe();
        self.engine.stop();
        if let Some(task) = self.reachability.take() {
            task.abort();
        }
        info!("App shut down");
    }

    // =========================================================================
    // Catalog loading
    // =========================================================================

    /// Load the catalog in the background. `force` always attempts the network.
    pub fn refresh(&mut self, force: bool) {
        let engine = self.engine.clone();
        let tx = self.tx.clone();
        self.loading = true;
        self.status_message = Some(if force {
            "Refreshing...".to_string()
        } else {
            "Loading...".to_string()
        });

        tokio::spawn(async move {
            let result = engine.get_catalog(force).await;
            if tx.send(BackgroundMessage::Catalog(result)).await.is_err() {
                debug!("UI gone before catalog load finished");
            }
        });
    }

    /// Drain background results without blocking.
    pub fn check_background_tasks(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            self.process_message(message);
        }
    }

    fn process_message(&mut self, message: BackgroundMessage) {
        match message {
            BackgroundMessage::Catalog(result) => {
                self.loading = false;
                self.status_message = Some(result.message.clone());
                self.apply_catalog(result);
            }
            BackgroundMessage::Sync(event) => self.process_sync_event(event),
        }
    }

    fn process_sync_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::SyncStart => self.is_syncing = true,
            SyncEvent::SyncSuccess { entry_count, .. } => {
                self.is_syncing = false;
                // A timer or reconnect sync finished; show what it stored
                if !self.loading {
                    self.apply_catalog(CatalogResult {
                        snapshot: self.engine.store().load(),
                        origin: CatalogOrigin::Network,
                        message: format!("Synced {} apps", entry_count),
                    });
                    self.status_message = Some(format!("Synced {} apps", entry_count));
                }
            }
            SyncEvent::SyncError { error, .. } => {
                self.is_syncing = false;
                if !self.loading {
                    self.status_message = Some(format!("Sync failed: {}", error));
                }
            }
            SyncEvent::NetworkChange { is_online } => {
                self.is_online = is_online;
                self.status_message = Some(if is_online {
                    "Back online".to_string()
                } else {
                    "Offline - showing saved apps".to_string()
                });
            }
            SyncEvent::CacheCleared { .. } => {
                self.apply_catalog(self.engine.cached_catalog());
                self.status_message = Some("Offline data cleared".to_string());
            }
        }
    }

    fn apply_catalog(&mut self, result: CatalogResult) {
        self.view.apply(result);
        self.clamp_selection();
    }

    // =========================================================================
    // Selection and filters
    // =========================================================================

    pub fn visible_count(&self) -> usize {
        self.view.visible().len()
    }

    fn clamp_selection(&mut self) {
        let count = self.visible_count();
        if self.selection >= count {
            self.selection = count.saturating_sub(1);
        }
    }

    /// Move the selection by `delta` tiles, stopping at the ends.
    pub fn move_selection(&mut self, delta: isize) {
        let count = self.visible_count();
        if count == 0 {
            self.selection = 0;
            return;
        }
        let next = self.selection as isize + delta;
        self.selection = next.clamp(0, count as isize - 1) as usize;
    }

    pub fn move_row(&mut self, down: bool) {
        let step = self.grid_columns.max(1) as isize;
        self.move_selection(if down { step } else { -step });
    }

    pub fn push_search_char(&mut self, c: char) {
        let mut query = self.view.search().to_string();
        if can_add_search_char(query.chars().count(), c) {
            query.push(c);
            self.view.set_search(query);
            self.selection = 0;
        }
    }

    pub fn pop_search_char(&mut self) {
        let mut query = self.view.search().to_string();
        query.pop();
        self.view.set_search(query);
        self.selection = 0;
    }

    pub fn clear_search(&mut self) {
        self.view.set_search("");
        self.selection = 0;
    }

    pub fn cycle_category(&mut self, forward: bool) {
        self.view.cycle_category(forward);
        self.selection = 0;
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Open the browser view for the selected tile.
    pub fn open_selected(&mut self) {
        if let Some(target) = self.view.target(self.selection) {
            info!(name = %target.name, url = %target.url, "Opening app");
            self.browsing = Some(target);
            self.state = AppState::Browsing;
        }
    }

    pub fn close_browser(&mut self) {
        self.browsing = None;
        self.state = AppState::Normal;
    }

    pub fn show_diagnostics(&mut self) {
        self.diagnostics = Some(self.engine.diagnostics());
        self.state = AppState::ShowingDiagnostics;
    }

    /// Step the periodic sync cadence to the next longer or shorter preset.
    pub fn step_sync_interval(&mut self, longer: bool) {
        let current = self.config.sync_interval_secs;
        let next = if longer {
            SYNC_INTERVAL_STEPS.iter().copied().find(|&s| s > current)
        } else {
            SYNC_INTERVAL_STEPS.iter().rev().copied().find(|&s| s < current)
        };
        let Some(secs) = next else { return };

        self.config.sync_interval_secs = secs;
        self.engine.set_sync_interval(Duration::from_secs(secs));
        self.status_message = Some(format!("Syncing every {}", format_interval(secs)));
        if self.diagnostics.is_some() {
            self.diagnostics = Some(self.engine.diagnostics());
        }
    }

    pub fn clear_cache(&mut self) {
        if !self.engine.clear_cache() {
            self.status_message = Some("Failed to clear offline data".to_string());
        }
        self.state = AppState::Normal;
    }

    pub fn selected_icon(&self) -> Option<IconRef> {
        self.view
            .visible()
            .get(self.selection)
            .map(|e| resolve_icon(self.engine.store(), e))
    }
}

// ============================================================================
// Input validation helpers (exported for use in input.rs)
// ============================================================================

/// `90` -> "1m 30s", `3600` -> "1h".
pub fn format_interval(secs: u64) -> String {
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, s) => format!("{}s", s),
        (0, m, 0) => format!("{}m", m),
        (0, m, s) => format!("{}m {}s", m, s),
        (h, 0, _) => format!("{}h", h),
        (h, m, _) => format!("{}h {}m", h, m),
    }
}

/// Check if a search character should be accepted
pub fn can_add_search_char(current_len: usize, c: char) -> bool {
    current_len < MAX_SEARCH_LENGTH && !c.is_control()
}

// ============================================================================
// Tests
// ============================================================================
