use ratatui::widgets::ListState;

use crate::poll::PollMsg;
use crate::source::Flash;
use crate::sync::RefreshReport;

pub struct App {
    /// Stored flashes, newest first.
    pub items: Vec<Flash>,
    /// List selection state for scrolling.
    pub list_state: ListState,
    /// Whether the user has requested to quit.
    pub quit: bool,
    /// Last refresh status or diagnostic message.
    pub status: String,
    /// Display name of the server, once known.
    pub server_name: Option<String>,
    pub refreshing: bool,
}

impl App {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            list_state: ListState::default(),
            quit: false,
            status: "Starting…".into(),
            server_name: None,
            refreshing: false,
        }
    }

    /// Replace the list with a fresh copy of the store, newest first.
    ///
    /// The selection follows the previously selected flash if it is still
    /// present, otherwise it is clamped to the new length.
    pub fn set_items(&mut self, mut items: Vec<Flash>) {
        let selected_id = self.selected().map(|f| f.id.clone());
        items.sort_by(|a, b| b.date.cmp(&a.date));
        self.items = items;

        let last = self.items.len().saturating_sub(1);
        let selection = selected_id.and_then(|id| {
            self.items
                .iter()
                .position(|f| f.id == id)
                .or_else(|| self.list_state.selected().map(|i| i.min(last)))
        });
        if self.items.is_empty() {
            self.list_state.select(None);
        } else {
            self.list_state.select(selection);
        }
    }

    /// Show that the cold-start check against `server_url` is running.
    pub fn start_bootstrap(&mut self, server_url: &str) {
        self.refreshing = true;
        self.status = format!("Connecting to {server_url}…");
    }

    /// Show the outcome of the cold-start check.  Without a report, a
    /// diagnostic that arrived in the meantime stays on screen.
    pub fn finish_bootstrap(&mut self, report: Option<RefreshReport>, server_url: &str) {
        match report {
            Some(report) => self.apply(PollMsg::Refreshed(report)),
            None => {
                self.refreshing = false;
                if self.status.starts_with("Connecting") {
                    self.status = format!("Watching {server_url}");
                }
            }
        }
    }

    /// Fold a scheduler message into the status line.
    pub fn apply(&mut self, msg: PollMsg) {
        match msg {
            PollMsg::Started => {
                self.refreshing = true;
                self.status = "Refreshing…".into();
            }
            PollMsg::Refreshed(report) => {
                self.refreshing = false;
                self.server_name = Some(report.server_name);
                let mut status = match report.new_items.len() {
                    0 => "No new flashes".to_string(),
                    1 => "1 new flash".to_string(),
                    n => format!("{n} new flashes"),
                };
                if !report.failed.is_empty() {
                    status.push_str(&format!(", {} failed", report.failed.len()));
                }
                if report.cleared {
                    status.push_str(" (server changed, history cleared)");
                }
                self.status = status;
            }
            PollMsg::Error(e) => {
                self.refreshing = false;
                self.status = format!("Error: {e}");
            }
        }
    }

    pub fn selected(&self) -> Option<&Flash> {
        self.list_state.selected().and_then(|i| self.items.get(i))
    }

    // -- navigation ----------------------------------------------------------

    pub fn select_next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => (i + 1).min(self.items.len() - 1),
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    pub fn select_previous(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => i.saturating_sub(1),
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    pub fn select_first(&mut self) {
        if !self.items.is_empty() {
            self.list_state.select(Some(0));
        }
    }

    pub fn select_last(&mut self) {
        if !self.items.is_empty() {
            self.list_state.select(Some(self.items.len() - 1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::make_flash;
    use crate::sync::{ItemFailure, RefreshReport};
    use chrono::{TimeZone, Utc};

    fn sample_items() -> Vec<Flash> {
        vec![
            make_flash("1", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            make_flash("3", Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
            make_flash("2", Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()),
        ]
    }

    #[test]
    fn new_app_starts_empty() {
        let app = App::new();
        assert!(app.items.is_empty());
        assert!(!app.quit);
        assert!(app.list_state.selected().is_none());
    }

    #[test]
    fn set_items_sorts_newest_first() {
        let mut app = App::new();
        app.set_items(sample_items());

        let ids: Vec<_> = app.items.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["3", "2", "1"]);
    }

    #[test]
    fn selection_follows_flash_across_reload() {
        let mut app = App::new();
        app.set_items(sample_items());
        app.select_last(); // "1"

        let mut more = sample_items();
        more.push(make_flash("4", Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()));
        app.set_items(more);

        assert_eq!(app.selected().map(|f| f.id.as_str()), Some("1"));
    }

    #[test]
    fn selection_clamps_when_flash_disappears() {
        let mut app = App::new();
        app.set_items(sample_items());
        app.select_last();

        app.set_items(sample_items().into_iter().skip(1).take(1).collect());

        assert_eq!(app.list_state.selected(), Some(0));
    }

    #[test]
    fn selection_cleared_when_list_empties() {
        let mut app = App::new();
        app.set_items(sample_items());
        app.select_first();

        app.set_items(Vec::new());

        assert!(app.list_state.selected().is_none());
    }

    #[test]
    fn apply_summarises_report() {
        let mut app = App::new();
        app.apply(PollMsg::Started);
        assert!(app.refreshing);

        app.apply(PollMsg::Refreshed(RefreshReport {
            server_name: "Central".into(),
            fetched: 3,
            new_items: sample_items(),
            notified: 2,
            failed: vec![ItemFailure { id: "9".into(), error: "boom".into() }],
            cleared: false,
        }));

        assert!(!app.refreshing);
        assert_eq!(app.server_name.as_deref(), Some("Central"));
        assert_eq!(app.status, "3 new flashes, 1 failed");
    }

    #[test]
    fn bootstrap_report_replaces_connecting_status() {
        let mut app = App::new();
        app.start_bootstrap("https://a.example/api");
        assert_eq!(app.status, "Connecting to https://a.example/api…");
        assert!(app.refreshing);

        app.finish_bootstrap(
            Some(RefreshReport {
                server_name: "Central".into(),
                fetched: 2,
                new_items: sample_items().into_iter().take(2).collect(),
                notified: 2,
                ..RefreshReport::default()
            }),
            "https://a.example/api",
        );

        assert!(!app.refreshing);
        assert_eq!(app.status, "2 new flashes");
        assert_eq!(app.server_name.as_deref(), Some("Central"));
    }

    #[test]
    fn bootstrap_without_report_keeps_diagnostics() {
        let mut app = App::new();
        app.start_bootstrap("https://a.example/api");
        app.finish_bootstrap(None, "https://a.example/api");
        assert_eq!(app.status, "Watching https://a.example/api");

        app.start_bootstrap("https://a.example/api");
        app.status = "Initial refresh failed: offline".into();
        app.finish_bootstrap(None, "https://a.example/api");
        assert_eq!(app.status, "Initial refresh failed: offline");
        assert!(!app.refreshing);
    }

    #[test]
    fn apply_shows_errors() {
        let mut app = App::new();
        app.apply(PollMsg::Error("offline".into()));
        assert_eq!(app.status, "Error: offline");
    }

    // -- navigation ----------------------------------------------------------

    #[test]
    fn navigation_on_empty_is_noop() {
        let mut app = App::new();
        app.select_next();
        app.select_previous();
        app.select_first();
        app.select_last();
        assert!(app.list_state.selected().is_none());
    }

    #[test]
    fn select_next_starts_at_zero_then_clamps() {
        let mut app = App::new();
        app.set_items(sample_items());

        app.select_next();
        assert_eq!(app.list_state.selected(), Some(0));
        app.select_next();
        app.select_next();
        app.select_next();
        assert_eq!(app.list_state.selected(), Some(2));
    }

    #[test]
    fn select_previous_clamps_at_zero() {
        let mut app = App::new();
        app.set_items(sample_items());

        app.select_last();
        app.select_previous();
        assert_eq!(app.list_state.selected(), Some(1));
        app.select_first();
        app.select_previous();
        assert_eq!(app.list_state.selected(), Some(0));
    }
}
