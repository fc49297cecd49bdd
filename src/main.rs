//! librenews-sync: LibreNews flashes on the desktop.
//!
//! ## Architecture overview
//!
//! ```text
//!                 ┌────────────┐ fetch  ┌────────────┐
//!   poll.rs ────► │  sync.rs   │ ─────► │  source/   │  (LibreNews HTTP)
//!  (timer /       │  refresh   │        └────────────┘
//!   manual)       │coordinator │ notify ┌────────────┐
//!      │          │            │ ─────► │ notify.rs  │  (notify-send)
//!      │          │            │ persist┌────────────┐
//!      │          │            │ ─────► │  store.rs  │  (flashes.json)
//!      ▼          └────────────┘        └────────────┘
//!   PollMsg ──► app.rs ──► ui.rs                ▲
//!                  ▲                            │ errors
//!              input.rs                   diagnostics.rs
//! ```
//!
//! * **`source/`**: the `FlashSource` trait, the `Flash` type and the
//!   LibreNews JSON client.
//! * **`store`**: the bounded, atomically rewritten `flashes.json`.
//! * **`notify`**: settings-aware dispatch to a desktop or log notifier.
//! * **`sync`**: one fetch → diff → notify → persist cycle at a time.
//! * **`poll`**: periodic and on-demand refreshes as a background task.
//! * **`app`** / **`ui`** / **`input`**: the terminal view.
//! * **`main`**: CLI parsing, logging, and wiring.

mod app;
mod config;
mod diagnostics;
mod input;
mod notify;
mod poll;
mod source;
mod store;
mod sync;
mod ui;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{Event, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::App;
use config::Config;
use diagnostics::{ChannelReporter, LogReporter, Reporter};
use input::Action;
use notify::{DesktopNotifier, LogNotifier, Notifier};
use poll::PollMsg;
use source::LibreNewsSource;
use store::{FlashStore, StoreError};
use sync::{RefreshReport, RefreshState, SyncManager};

#[derive(Parser, Debug, Clone)]
#[command(name = "librenews-sync", about = "LibreNews flashes as desktop notifications", version)]
struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// LibreNews server API URL
    #[arg(long, global = true)]
    server: Option<String>,

    /// Location of flashes.json
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Record new flashes without notifying
    #[arg(long, global = true)]
    no_notify: bool,

    /// Log notifications instead of showing desktop bubbles
    #[arg(long, global = true)]
    no_desktop: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Live view of stored flashes with background sync (default)
    Watch,
    /// Refresh once and exit
    Sync,
    /// Headless periodic sync until interrupted
    Daemon,
    /// Print stored flashes, newest first
    List {
        /// Only show this many
        #[arg(long)]
        last: Option<usize>,
    },
    /// Forget every stored flash
    Clear,
    /// Print config file path and effective values
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Watch);
    let cfg = effective_config(&cli);

    let _log_guard = init_logging(command, &cfg)?;

    match command {
        Command::Watch => run_watch(&cli, cfg).await,
        Command::Sync => run_sync(&cli, cfg).await,
        Command::Daemon => run_daemon(&cli, cfg).await,
        Command::List { last } => run_list(&cfg, last),
        Command::Clear => run_clear(&cli, cfg).await,
        Command::Config => {
            run_print_config(&cli, &cfg);
            Ok(())
        }
    }
}

/// Config file values with command-line overrides applied.
fn effective_config(cli: &Cli) -> Config {
    with_overrides(cli, Config::load(cli.config.as_deref()))
}

fn with_overrides(cli: &Cli, mut cfg: Config) -> Config {
    if let Some(server) = &cli.server {
        cfg.server.url = server.clone();
    }
    if let Some(store) = &cli.store {
        cfg.storage.path = Some(store.clone());
    }
    if cli.no_notify {
        cfg.notifications.enabled = false;
    }
    cfg
}

/// Logs go to stderr, except in the terminal view where they would corrupt
/// the screen; there they go to `librenews-sync.log` next to the store.
fn init_logging(command: Command, cfg: &Config) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if command != Command::Watch {
        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_env_filter(filter)
            .init();
        return Ok(None);
    }

    let store_path = cfg.store_path();
    let dir = store_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(
        &dir,
        "librenews-sync.log",
    ));
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();
    Ok(Some(guard))
}

/// Re-reads the config file (with the same command-line overrides) before
/// each background refresh.  A broken file keeps the running settings.
fn config_loader(cli: &Cli) -> poll::ConfigLoader {
    let cli = cli.clone();
    Box::new(move || Config::reload(cli.config.as_deref()).map(|cfg| with_overrides(&cli, cfg)))
}

fn build_manager(cli: &Cli, cfg: Config, reporter: Arc<dyn Reporter>) -> Result<SyncManager> {
    let store = FlashStore::new(cfg.store_path(), cfg.storage.max_stored);
    let source = LibreNewsSource::new(Duration::from_secs(cfg.server.timeout_secs))
        .context("building HTTP client")?;
    let notifier: Arc<dyn Notifier> = if cli.no_desktop {
        Arc::new(LogNotifier)
    } else {
        Arc::new(DesktopNotifier::new())
    };
    Ok(SyncManager::new(cfg, store, Arc::new(source), notifier, reporter))
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, shutting down");
            token.cancel();
        }
    });
}

fn log_report(report: &RefreshReport) {
    info!(
        server = %report.server_name,
        fetched = report.fetched,
        new = report.new_items.len(),
        notified = report.notified,
        failed = report.failed.len(),
        cleared = report.cleared,
        "refresh complete"
    );
}

// ---------------------------------------------------------------------------
// One-shot commands
// ---------------------------------------------------------------------------

async fn run_sync(cli: &Cli, cfg: Config) -> Result<()> {
    let manager = build_manager(cli, cfg, Arc::new(LogReporter))?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let report = manager.refresh(&cancel).await?;
    log_report(&report);
    for flash in &report.new_items {
        println!("{}  {}  {}", flash.date.format("%Y-%m-%d %H:%M"), flash.title(), flash.text);
    }
    for failure in &report.failed {
        eprintln!("failed {}: {}", failure.id, failure.error);
    }
    Ok(())
}

fn run_list(cfg: &Config, last: Option<usize>) -> Result<()> {
    let store = FlashStore::new(cfg.store_path(), cfg.storage.max_stored);
    let mut items = match store.load() {
        Ok(items) => items,
        Err(StoreError::NotFound(_)) => {
            println!("No flashes stored yet.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    items.sort_by(|a, b| b.date.cmp(&a.date));

    for flash in items.iter().take(last.unwrap_or(usize::MAX)) {
        println!("{}  [{}]", flash.date.format("%Y-%m-%d %H:%M"), flash.title());
        println!("    {}", flash.text);
        if !flash.link.is_empty() {
            println!("    {}", flash.link);
        }
    }
    Ok(())
}

async fn run_clear(cli: &Cli, cfg: Config) -> Result<()> {
    let manager = build_manager(cli, cfg, Arc::new(LogReporter))?;
    manager.clear().await?;
    println!("Cleared {}", manager.store().path().display());
    Ok(())
}

fn run_print_config(cli: &Cli, cfg: &Config) {
    let path = cli
        .config
        .clone()
        .or_else(Config::config_path)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(unknown)".to_string());
    println!("Config: {path}");
    println!();
    println!("[server]");
    println!("  url                = {}", cfg.server.url);
    println!("  poll_interval_secs = {}", cfg.server.poll_interval_secs);
    println!("  timeout_secs       = {}", cfg.server.timeout_secs);
    println!();
    println!("[notifications]");
    println!("  enabled = {}", cfg.notifications.enabled);
    println!("  sound   = {}", cfg.notifications.sound);
    println!();
    println!("[storage]");
    println!("  path       = {}", cfg.store_path().display());
    println!("  max_stored = {}", cfg.storage.max_stored);
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

async fn run_daemon(cli: &Cli, cfg: Config) -> Result<()> {
    let every = Duration::from_secs(cfg.server.poll_interval_secs);
    info!(server = %cfg.server.url, interval_secs = every.as_secs(), "daemon starting");

    let manager = build_manager(cli, cfg, Arc::new(LogReporter))?.start().await;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let (_trigger, mut rx) = poll::spawn(manager, every, Some(config_loader(cli)), cancel.clone());

    while let Some(msg) = rx.recv().await {
        match msg {
            PollMsg::Started => debug!("refresh started"),
            PollMsg::Refreshed(report) => log_report(&report),
            PollMsg::Error(e) => warn!(error = %e, "refresh failed"),
        }
    }
    info!("daemon stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Terminal view
// ---------------------------------------------------------------------------

/// Manages terminal raw-mode and alternate-screen lifetime via [`Drop`].
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TerminalGuard {
    fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Restore the terminal before the panic message is printed.
fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(info);
    }));
}

async fn run_watch(cli: &Cli, cfg: Config) -> Result<()> {
    install_panic_hook();

    let every = Duration::from_secs(cfg.server.poll_interval_secs);
    let (reporter, mut diagnostics) = ChannelReporter::new();
    let manager = Arc::new(build_manager(cli, cfg, Arc::new(reporter))?);

    let mut guard = TerminalGuard::new()?;
    let mut app = App::new();
    app.set_items(manager.stored().await);
    app.start_bootstrap(&manager.config().server.url);
    guard.terminal.draw(|f| ui::draw(&mut app, f))?;

    // The cold-start fetch runs behind the first frame.
    let (boot_tx, mut boot_rx) = tokio::sync::oneshot::channel();
    let boot = manager.clone();
    tokio::spawn(async move {
        let _ = boot_tx.send(boot.bootstrap().await);
    });
    let mut booted = false;

    let cancel = CancellationToken::new();
    let (trigger, mut rx) =
        poll::spawn(manager.clone(), every, Some(config_loader(cli)), cancel.clone());

    let mut events = EventStream::new();
    loop {
        guard.terminal.draw(|f| ui::draw(&mut app, f))?;

        tokio::select! {
            result = &mut boot_rx, if !booted => {
                booted = true;
                app.finish_bootstrap(result.ok().flatten(), &manager.config().server.url);
                app.set_items(manager.stored().await);
            }
            Some(msg) = rx.recv() => {
                let reload = matches!(msg, PollMsg::Refreshed(_));
                app.apply(msg);
                if reload {
                    app.set_items(manager.stored().await);
                }
            }
            Some(message) = diagnostics.recv() => app.status = message,
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) => match input::handle_key_event(&mut app, key) {
                    Some(Action::Refresh) => {
                        if !booted || manager.state() == RefreshState::Refreshing {
                            app.status = "Already refreshing…".into();
                        } else if !trigger.request() {
                            app.status = "Sync stopped".into();
                        }
                    }
                    Some(Action::Open(link)) => {
                        if let Err(e) = notify::open_link(&link).await {
                            app.status = format!("Error: {e}");
                        }
                    }
                    None => {}
                },
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
        }

        if app.quit {
            break;
        }
    }

    cancel.cancel();
    // `guard` is dropped here, restoring the terminal.
    Ok(())
}
