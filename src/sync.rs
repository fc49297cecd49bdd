//! The refresh coordinator.
//!
//! [`SyncManager::refresh`] runs one fetch → diff → notify → persist cycle:
//!
//! 1. If the configured server URL changed since the last cycle, forget
//!    every stored flash (ids are only unique per server).
//! 2. Fetch the server's current flashes, racing the cancellation token.
//! 3. Load the stored set once and walk the fetched flashes.  Unseen ones are
//!    notified and appended; a failure on one flash is reported and skipped.
//! 4. Persist the working set once, if anything was appended.
//!
//! At most one refresh runs at a time.  A second caller gets
//! [`SyncError::AlreadyRefreshing`] instead of queueing behind the first.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::diagnostics::Reporter;
use crate::notify::{Dispatcher, Notifier};
use crate::source::{FetchError, Flash, FlashSource};
use crate::store::{FlashStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("a refresh is already in progress")]
    AlreadyRefreshing,

    #[error("refresh cancelled")]
    Cancelled,

    #[error("an error occurred while trying to receive flashes: {0}")]
    Network(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A flash that was fetched but could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub id: String,
    pub error: String,
}

/// What one refresh did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Display name the server reported.
    pub server_name: String,
    /// How many flashes the server returned.
    pub fetched: usize,
    /// Flashes seen for the first time and now stored.
    pub new_items: Vec<Flash>,
    /// How many of `new_items` produced a notification (zero when disabled).
    pub notified: usize,
    pub failed: Vec<ItemFailure>,
    /// True if the store was wiped because the server URL changed.
    pub cleared: bool,
}

pub struct SyncManager {
    store: FlashStore,
    source: Arc<dyn FlashSource>,
    dispatcher: Dispatcher,
    reporter: Arc<dyn Reporter>,
    config: RwLock<Config>,
    /// Server URL the stored set belongs to.
    loaded_url: Mutex<String>,
    server_name: Mutex<Option<String>>,
    /// Held by a refresh or a clear.
    in_flight: tokio::sync::Mutex<()>,
    /// Set only while a refresh holds `in_flight`.
    refreshing: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the refreshing flag however the refresh ends.
struct Refreshing<'a>(&'a AtomicBool);

impl<'a> Refreshing<'a> {
    fn mark(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for Refreshing<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncManager {
    pub fn new(
        config: Config,
        store: FlashStore,
        source: Arc<dyn FlashSource>,
        notifier: Arc<dyn Notifier>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            loaded_url: Mutex::new(config.server.url.clone()),
            config: RwLock::new(config),
            store,
            source,
            dispatcher: Dispatcher::new(notifier),
            reporter,
            server_name: Mutex::new(None),
            in_flight: tokio::sync::Mutex::new(()),
            refreshing: AtomicBool::new(false),
        }
    }

    /// Wrap in an [`Arc`] and run the cold-start check (see [`bootstrap`]).
    ///
    /// [`bootstrap`]: SyncManager::bootstrap
    pub async fn start(self) -> Arc<Self> {
        let manager = Arc::new(self);
        manager.bootstrap().await;
        manager
    }

    /// Check the store.  If there is none yet, refresh straight away so the
    /// user gets their first flashes without waiting for the timer.
    ///
    /// Never fails: a corrupt store or a failed initial refresh is reported
    /// and otherwise ignored.
    pub async fn bootstrap(&self) -> Option<RefreshReport> {
        match self.store.load_async().await {
            Ok(items) => {
                info!(
                    count = items.len(),
                    max = self.store.max_stored(),
                    path = %self.store.path().display(),
                    "loaded stored flashes"
                );
                None
            }
            Err(StoreError::NotFound(_)) => {
                info!("no stored flashes yet, running initial refresh");
                match self.refresh(&CancellationToken::new()).await {
                    Ok(report) => Some(report),
                    Err(e) => {
                        self.reporter.report(&format!("Initial refresh failed: {e}"));
                        None
                    }
                }
            }
            Err(e) => {
                self.reporter.report(&format!("Unable to read stored flashes: {e}"));
                None
            }
        }
    }

    /// Whether a refresh is running.  A [`clear`](SyncManager::clear) in
    /// progress does not count.
    pub fn state(&self) -> RefreshState {
        if self.refreshing.load(Ordering::Acquire) {
            RefreshState::Refreshing
        } else {
            RefreshState::Idle
        }
    }

    pub fn config(&self) -> Config {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Swap in new settings.  Takes effect at the next refresh; a changed
    /// server URL clears the store then.
    pub fn update_config(&self, config: Config) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Name the server gave in its last successful response.
    pub fn server_name(&self) -> Option<String> {
        lock(&self.server_name).clone()
    }

    pub fn store(&self) -> &FlashStore {
        &self.store
    }

    /// Stored flashes, oldest first.  A missing store is simply empty; any
    /// other failure is reported and also yields an empty list.
    pub async fn stored(&self) -> Vec<Flash> {
        match self.store.load_async().await {
            Ok(items) => items,
            Err(StoreError::NotFound(_)) => Vec::new(),
            Err(e) => {
                self.reporter.report(&format!("Unable to load flashes from storage: {e}"));
                Vec::new()
            }
        }
    }

    /// Forget every stored flash.  Waits for an in-flight refresh to finish.
    pub async fn clear(&self) -> Result<(), SyncError> {
        let _guard = self.in_flight.lock().await;
        self.store.clear_async().await?;
        Ok(())
    }

    /// Run one refresh cycle.  See the module docs for the steps.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<RefreshReport, SyncError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| SyncError::AlreadyRefreshing)?;
        let _refreshing = Refreshing::mark(&self.refreshing);

        let config = self.config();
        let url = config.server.url.as_str();
        let mut report = RefreshReport {
            cleared: self.reset_if_server_changed(url).await,
            ..RefreshReport::default()
        };

        info!(server = %url, "refreshing flashes");
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            result = self.source.fetch(url) => result,
        };
        let batch = match fetched {
            Ok(batch) => batch,
            Err(e) => {
                let err = SyncError::Network(e);
                self.reporter.report(&err.to_string());
                return Err(err);
            }
        };

        *lock(&self.server_name) = Some(batch.server_name.clone());
        report.server_name = batch.server_name;
        report.fetched = batch.items.len();

        let mut stored = match self.store.load_async().await {
            Ok(items) => items,
            Err(StoreError::NotFound(_)) => Vec::new(),
            Err(e) => {
                self.reporter.report(&format!("Unable to load flashes from storage: {e}"));
                return Err(e.into());
            }
        };
        let mut seen: HashSet<String> = stored.iter().map(|f| f.id.clone()).collect();

        for flash in batch.items {
            if cancel.is_cancelled() {
                debug!("cancelled mid-batch, keeping what was delivered");
                break;
            }
            if seen.contains(&flash.id) {
                continue;
            }
            match self.dispatcher.notify(&flash, &config.notifications).await {
                Ok(posted) => {
                    debug!(id = %flash.id, posted, "new flash");
                    if posted {
                        report.notified += 1;
                    }
                    seen.insert(flash.id.clone());
                    stored.push(flash.clone());
                    report.new_items.push(flash);
                }
                Err(e) => {
                    warn!(id = %flash.id, error = %e, "failed to push flash");
                    self.reporter.report(&format!(
                        "Error occurred while trying push notifications: {e}"
                    ));
                    report.failed.push(ItemFailure {
                        id: flash.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !report.new_items.is_empty() {
            if let Err(e) = self.store.save_async(stored).await {
                self.reporter.report(&format!("Unable to save flashes: {e}"));
                return Err(e.into());
            }
        }

        info!(
            fetched = report.fetched,
            new = report.new_items.len(),
            failed = report.failed.len(),
            "refresh finished"
        );
        Ok(report)
    }

    /// Clear the store if `url` is not the server it was filled from.
    /// Best-effort: a failed clear is reported and the refresh carries on.
    /// The new URL is only remembered once the clear succeeds, so the next
    /// refresh tries again.
    async fn reset_if_server_changed(&self, url: &str) -> bool {
        let previous = lock(&self.loaded_url).clone();
        if previous == url {
            return false;
        }
        info!(from = %previous, to = %url, "server changed, forgetting stored flashes");
        match self.store.clear_async().await {
            Ok(()) => {
                *lock(&self.loaded_url) = url.to_string();
                true
            }
            Err(e) => {
                self.reporter.report(&format!("Unable to reset flash storage: {e}"));
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
