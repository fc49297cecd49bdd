//! Terminal UI rendering.
//!
//! All drawing logic lives here, separated from application state ([`App`])
//! and input handling ([`crate::input`]).
//!
//! The layout is a list of stored flashes on top (two lines per flash: date,
//! channel and source, then the headline) and a one-line status bar below.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use crate::app::App;

/// Draw the complete UI for one frame.
pub fn draw(app: &mut App, frame: &mut Frame) {
    let [main_area, status_area] = Layout::vertical([
        Constraint::Min(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    draw_flash_list(app, frame, main_area);
    draw_status_bar(app, frame, status_area);
}

fn draw_flash_list(app: &mut App, frame: &mut Frame, area: Rect) {
    let list_items: Vec<ListItem> = app
        .items
        .iter()
        .map(|flash| {
            let header = Line::from(vec![
                Span::styled(
                    flash.date.format("%Y-%m-%d %H:%M").to_string(),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw("  "),
                Span::styled(flash.title(), Style::default().fg(Color::Cyan)),
            ]);
            let text = Line::from(Span::styled(
                format!("  {}", flash.text),
                Style::default().fg(Color::White),
            ));
            ListItem::new(vec![header, text])
        })
        .collect();

    let title = match &app.server_name {
        Some(name) => format!(" LibreNews · {name} "),
        None => " LibreNews ".to_string(),
    };

    let list = List::new(list_items)
        .block(Block::default().title(title).borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .bg(Color::DarkGray),
        )
        .highlight_symbol("▸ ");

    frame.render_stateful_widget(list, area, &mut app.list_state);
}

/// Render the bottom status bar.
fn draw_status_bar(app: &App, frame: &mut Frame, area: Rect) {
    let status_color = if app.refreshing { Color::Blue } else { Color::Yellow };
    let status = Paragraph::new(Line::from(vec![
        Span::raw(" "),
        Span::styled(&app.status, Style::default().fg(status_color)),
        Span::raw("  "),
        Span::styled(
            format!("{} flashes", app.items.len()),
            Style::default().fg(Color::Green),
        ),
        Span::raw("  q: quit  r: refresh  o: open  ↑/↓: scroll"),
    ]));
    frame.render_widget(status, area);
}
