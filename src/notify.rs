//! Turning a flash into a desktop notification.
//!
//! [`Dispatcher`] decides *whether* and *what* to notify; a [`Notifier`]
//! decides *how*.  The desktop implementation shells out to `notify-send`,
//! the log implementation only writes a tracing event.

use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{NotificationsConfig, DEFAULT_SOUND};
use crate::source::Flash;

/// Everything the platform needs to show one flash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Stable key; posting the same id again replaces the earlier bubble.
    pub id: u32,
    pub title: String,
    pub body: String,
    pub sound: String,
    /// Opened when the notification is clicked.
    pub action_url: String,
}

impl Notification {
    pub fn for_flash(flash: &Flash, sound: &str) -> Self {
        Self {
            id: flash.notification_id(),
            title: flash.title(),
            body: flash.text.clone(),
            sound: sound.to_string(),
            action_url: flash.link.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Platform notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Applies the user's notification settings and hands the result to a
/// [`Notifier`].  Failures are returned, never retried.
#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Post a notification for `flash`.
    ///
    /// Returns `Ok(false)` without touching the notifier when notifications
    /// are switched off.
    pub async fn notify(
        &self,
        flash: &Flash,
        settings: &NotificationsConfig,
    ) -> Result<bool, NotifyError> {
        if !settings.enabled {
            return Ok(false);
        }
        let notification = Notification::for_flash(flash, &settings.sound);
        self.notifier.post(&notification).await?;
        debug!(id = %flash.id, notification_id = notification.id, "notification posted");
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// notify-send
// ---------------------------------------------------------------------------

/// How long `notify-send` gets to fail before the bubble counts as shown.
const REJECT_WINDOW: Duration = Duration::from_millis(300);

/// Desktop notifications via `notify-send` (libnotify).
///
/// The notification carries a default action; clicking it opens the flash's
/// link with `xdg-open`.  `notify-send` stays alive until the bubble closes,
/// so only the first `REJECT_WINDOW` is waited on: an exit with a failure
/// status inside it (no notification daemon, unsupported flag) is an error.
/// Waiting for the click happens on a detached task.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    program: String,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self::with_program("notify-send")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    fn args(notification: &Notification) -> Vec<String> {
        let mut args = vec![
            "--app-name".to_string(),
            "LibreNews".to_string(),
            format!("--replace-id={}", notification.id),
            "--action=default=Open".to_string(),
        ];
        if notification.sound != DEFAULT_SOUND && !notification.sound.is_empty() {
            args.push(format!("--hint=string:sound-name:{}", notification.sound));
        }
        args.push(notification.title.clone());
        args.push(notification.body.clone());
        args
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn post(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut child = Command::new(&self.program)
            .args(Self::args(notification))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| NotifyError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        match tokio::time::timeout(REJECT_WINDOW, child.wait()).await {
            Ok(Ok(status)) if !status.success() => {
                return Err(NotifyError::Rejected(format!("{} exited with {status}", self.program)));
            }
            Ok(Err(source)) => {
                return Err(NotifyError::Spawn {
                    program: self.program.clone(),
                    source,
                });
            }
            // Exited cleanly, or still showing the bubble.
            Ok(Ok(_)) | Err(_) => {}
        }

        let url = notification.action_url.clone();
        tokio::spawn(async move {
            let Ok(output) = child.wait_with_output().await else {
                return;
            };
            if output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "default" {
                if let Err(e) = open_link(&url).await {
                    tracing::warn!(error = %e, "could not open flash link");
                }
            }
        });
        Ok(())
    }
}

/// Logs each notification instead of showing it.  Used headless.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn post(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            id = notification.id,
            link = %notification.action_url,
            "{}: {}",
            notification.title,
            notification.body
        );
        Ok(())
    }
}

/// Open `url` in the user's browser.
pub async fn open_link(url: &str) -> Result<(), NotifyError> {
    if url.is_empty() {
        return Err(NotifyError::Rejected("flash has no link".into()));
    }
    let program = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
    Command::new(program)
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .map_err(|source| NotifyError::Spawn {
            program: program.to_string(),
            source,
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
