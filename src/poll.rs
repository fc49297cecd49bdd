//! Background sync scheduling.
//!
//! Runs as a tokio task that refreshes on a timer and whenever a manual
//! refresh is requested, sending each outcome to the frontend over an
//! [`mpsc`] channel.
//!
//! ## For contributors
//!
//! The scheduler owns no state of its own: everything it knows lives in the
//! [`SyncManager`].  The timer's first tick is one full interval after start,
//! since [`SyncManager::start`] already covers the cold-start fetch.
//!
//! When given a [`ConfigLoader`], the scheduler re-reads the configuration
//! before every refresh, so editing the server URL in the config file takes
//! effect at the next cycle without a restart.  A loader returning `None`
//! (file present but unparsable) leaves the current settings in place.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::sync::{RefreshReport, SyncError, SyncManager};

/// Produces the current configuration, or `None` to keep the previous one.
pub type ConfigLoader = Box<dyn Fn() -> Option<Config> + Send>;

/// Messages sent from the scheduler to the frontend.
#[derive(Debug)]
pub enum PollMsg {
    /// A refresh is starting.
    Started,
    /// A refresh completed.
    Refreshed(RefreshReport),
    /// A refresh failed with this error description.
    Error(String),
}

/// Asks the scheduler for an immediate refresh.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl RefreshTrigger {
    /// Returns false once the scheduler has stopped.
    pub fn request(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Spawn the scheduler task.
///
/// Returns a trigger for manual refreshes and the receiver the frontend
/// should drain.  The task stops when `cancel` fires, when the receiver is
/// dropped, or when every trigger has been dropped.
pub fn spawn(
    manager: Arc<SyncManager>,
    every: Duration,
    reload: Option<ConfigLoader>,
    cancel: CancellationToken,
) -> (RefreshTrigger, mpsc::UnboundedReceiver<PollMsg>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (trigger_tx, mut trigger_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let every = every.max(Duration::from_secs(1));
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => debug!("scheduled refresh"),
                request = trigger_rx.recv() => match request {
                    Some(()) => debug!("manual refresh"),
                    None => return,
                },
            }

            match reload.as_ref().map(|load| load()) {
                Some(Some(config)) => manager.update_config(config),
                Some(None) => debug!("config unreadable, keeping current settings"),
                None => {}
            }
            if tx.send(PollMsg::Started).is_err() {
                return;
            }
            let msg = match manager.refresh(&cancel).await {
                Ok(report) => PollMsg::Refreshed(report),
                Err(SyncError::Cancelled) => return,
                Err(e) => PollMsg::Error(e.to_string()),
            };
            // If the receiver is gone the frontend has exited; stop polling.
            if tx.send(msg).is_err() {
                return;
            }
        }
    });

    (RefreshTrigger { tx: trigger_tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::diagnostics::tests::RecordingReporter;
    use crate::notify::tests::RecordingNotifier;
    use crate::source::make_flash;
    use crate::store::FlashStore;
    use crate::sync::tests::FakeSource;
    use chrono::Utc;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> Arc<SyncManager> {
        let config = Config::default();
        let source = FakeSource::serving(&config.server.url, vec![make_flash("1", Utc::now())]);
        Arc::new(SyncManager::new(
            config,
            FlashStore::new(dir.path().join("flashes.json"), 100),
            Arc::new(source),
            Arc::new(RecordingNotifier::default()),
            Arc::new(RecordingReporter::default()),
        ))
    }

    #[tokio::test]
    async fn manual_trigger_runs_a_refresh() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let (trigger, mut rx) = spawn(manager(&dir), Duration::from_secs(3600), None, cancel.clone());

        assert!(trigger.request());

        assert!(matches!(rx.recv().await, Some(PollMsg::Started)));
        match rx.recv().await {
            Some(PollMsg::Refreshed(report)) => assert_eq!(report.new_items.len(), 1),
            other => panic!("expected a report, got {other:?}"),
        }
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_after_one_interval() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let (_trigger, mut rx) = spawn(manager(&dir), Duration::from_secs(60), None, cancel.clone());

        assert!(rx.try_recv().is_err(), "nothing before the first tick");
        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(matches!(rx.recv().await, Some(PollMsg::Started)));
        cancel.cancel();
    }

    #[tokio::test]
    async fn cancellation_stops_the_task() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let (trigger, mut rx) = spawn(manager(&dir), Duration::from_secs(3600), None, cancel.clone());

        cancel.cancel();

        assert!(rx.recv().await.is_none(), "channel closes when the task exits");
        assert!(!trigger.request());
    }

    #[tokio::test]
    async fn loader_is_applied_before_each_refresh() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let cancel = CancellationToken::new();
        let loader: ConfigLoader = Box::new(|| {
            let mut cfg = Config::default();
            cfg.notifications.enabled = false;
            Some(cfg)
        });
        let (trigger, mut rx) =
            spawn(manager.clone(), Duration::from_secs(3600), Some(loader), cancel.clone());

        trigger.request();
        assert!(matches!(rx.recv().await, Some(PollMsg::Started)));
        match rx.recv().await {
            Some(PollMsg::Refreshed(report)) => assert_eq!(report.notified, 0),
            other => panic!("expected a report, got {other:?}"),
        }
        assert!(!manager.config().notifications.enabled);
        cancel.cancel();
    }

    #[tokio::test]
    async fn broken_config_file_keeps_current_settings() {
        let dir = TempDir::new().unwrap();
        let url = "https://news.example.org/api";
        let mut config = Config::default();
        config.server.url = url.to_string();
        let manager = Arc::new(SyncManager::new(
            config,
            FlashStore::new(dir.path().join("flashes.json"), 100),
            Arc::new(FakeSource::serving(url, vec![make_flash("1", Utc::now())])),
            Arc::new(RecordingNotifier::default()),
            Arc::new(RecordingReporter::default()),
        ));
        manager.store().save(&[make_flash("0", Utc::now())]).unwrap();

        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nurl = \"half-saved").unwrap();
        let loader: ConfigLoader = Box::new(move || Config::reload(Some(&path)));
        let cancel = CancellationToken::new();
        let (trigger, mut rx) =
            spawn(manager.clone(), Duration::from_secs(3600), Some(loader), cancel.clone());

        trigger.request();
        assert!(matches!(rx.recv().await, Some(PollMsg::Started)));
        match rx.recv().await {
            Some(PollMsg::Refreshed(report)) => {
                assert!(!report.cleared);
                assert_eq!(report.new_items.len(), 1);
            }
            other => panic!("expected a report, got {other:?}"),
        }
        assert_eq!(manager.config().server.url, url);
        assert_eq!(manager.stored().await.len(), 2);
        cancel.cancel();
    }
}
