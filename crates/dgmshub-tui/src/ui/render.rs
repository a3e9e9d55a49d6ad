use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use dgmshub_core::catalog::{IconRef, ALL_CATEGORIES};
use dgmshub_core::sync::CatalogOrigin;
use dgmshub_core::utils::{format_size, format_timestamp, truncate_string};
use dgmshub_core::CatalogEntry;

use crate::app::{format_interval, App, AppState};

use super::styles;

/// Tile footprint in terminal cells
const TILE_WIDTH: u16 = 26;
const TILE_HEIGHT: u16 = 6;

/// How many tiles fit side by side in `width` cells.
pub fn grid_columns(width: u16) -> usize {
    (width / TILE_WIDTH).max(1) as usize
}

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Length(2), // Category tabs
            Constraint::Min(8),    // Tile grid
            Constraint::Length(2), // Status bar
        ])
        .split(frame.area());

    render_title_bar(frame, app, chunks[0]);
    render_categories(frame, app, chunks[1]);
    render_grid(frame, app, chunks[2]);
    render_status_bar(frame, app, chunks[3]);

    // Render overlays
    match app.state {
        AppState::ShowingHelp => render_help_overlay(frame),
        AppState::ShowingDiagnostics => render_diagnostics_overlay(frame, app),
        AppState::ConfirmingClearCache => render_clear_cache_overlay(frame),
        AppState::Browsing => render_browser(frame, app),
        _ => {}
    }
}

fn render_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = "  DGMS Hub";
    let indicator = if app.is_syncing {
        Span::styled("● syncing", styles::highlight_style())
    } else if app.is_online {
        Span::styled("● online", styles::success_style())
    } else {
        Span::styled("● offline", styles::error_style())
    };
    let help_hint = "[?] Help";

    let used = title.len() + indicator.content.chars().count() + help_hint.len() + 6;
    let title_line = Line::from(vec![
        Span::styled(title, styles::title_style()),
        Span::raw(" ".repeat((area.width as usize).saturating_sub(used))),
        indicator,
        Span::raw("   "),
        Span::styled(help_hint, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(title_line).block(block), area);
}

fn render_categories(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::raw(" ")];
    for (i, category) in app.view.categories().iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" | ", styles::muted_style()));
        }
        spans.push(Span::styled(
            category.clone(),
            styles::tab_style(category == app.view.category()),
        ));
    }

    if matches!(app.state, AppState::Searching) || !app.view.search().is_empty() {
        spans.push(Span::raw("    "));
        spans.push(Span::styled("/", styles::help_key_style()));
        let cursor = if matches!(app.state, AppState::Searching) { "▌" } else { "" };
        spans.push(Span::styled(
            format!("{}{}", app.view.search(), cursor),
            styles::search_style(),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_grid(frame: &mut Frame, app: &App, area: Rect) {
    let tiles = app.view.visible();
    if tiles.is_empty() {
        render_empty_state(frame, app, area);
        return;
    }

    let columns = grid_columns(area.width);
    let visible_rows = (area.height / TILE_HEIGHT).max(1) as usize;
    let selected_row = app.selection / columns;
    let first_row = selected_row.saturating_sub(visible_rows - 1);

    for (index, entry) in tiles.iter().enumerate() {
        let row = index / columns;
        if row < first_row || row >= first_row + visible_rows {
            continue;
        }
        let col = index % columns;
        let tile = Rect::new(
            area.x + col as u16 * TILE_WIDTH,
            area.y + (row - first_row) as u16 * TILE_HEIGHT,
            TILE_WIDTH.min(area.width),
            TILE_HEIGHT,
        );
        let icon = if index == app.selection {
            app.selected_icon()
        } else {
            None
        };
        render_tile(frame, entry, icon, index == app.selection, tile);
    }
}

fn render_tile(
    frame: &mut Frame,
    entry: &CatalogEntry,
    icon: Option<IconRef>,
    selected: bool,
    area: Rect,
) {
    let inner_width = area.width.saturating_sub(4) as usize;
    let style = styles::tile_style(
        entry.background_color.as_deref(),
        entry.text_color.as_deref(),
        selected,
    );

    let badge = match icon {
        Some(IconRef::Local(_)) => "▣".to_string(),
        Some(IconRef::Remote(_)) => "◌".to_string(),
        _ => String::new(),
    };
    let lock = if entry.requires_auth { " 🔒" } else { "" };

    let lines = vec![
        Line::from(format!("[{}] {}{}", entry.placeholder_glyph(), badge, lock)),
        Line::from(Span::styled(
            truncate_string(&entry.name, inner_width),
            style.add_modifier(Modifier::BOLD),
        )),
        Line::from(truncate_string(entry.category_label(), inner_width)),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(if selected { BorderType::Thick } else { BorderType::Rounded })
        .border_style(styles::border_style(selected));

    let tile = Paragraph::new(lines).style(style).block(block);
    frame.render_widget(tile, Rect::new(area.x, area.y, area.width.saturating_sub(1), area.height));
}

fn render_empty_state(frame: &mut Frame, app: &App, area: Rect) {
    let headline = if app.loading {
        "Loading apps..."
    } else if !app.view.search().is_empty() || app.view.category() != ALL_CATEGORIES {
        "No apps match the current filter"
    } else {
        match app.view.origin() {
            Some(CatalogOrigin::ErrorNoData) => "Unable to load apps",
            _ => "No apps available",
        }
    };

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(headline, styles::highlight_style())),
        Line::from(""),
        Line::from(Span::styled(app.view.message().to_string(), styles::muted_style())),
        Line::from(""),
        Line::from(vec![
            Span::styled("Press ", styles::muted_style()),
            Span::styled("r", styles::help_key_style()),
            Span::styled(" to retry", styles::muted_style()),
        ]),
    ];

    let paragraph = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let shortcuts = "[/]search [c]ategory [r]efresh [i]nfo [q]uit";

    let left_text = match app.status_message {
        Some(ref msg) => format!(" {} ", msg),
        None => format!(" {} ", app.view.source_label()),
    };
    let right_text = format!(" {} ", shortcuts);

    let width = area.width as usize;
    let padding_len = width
        .saturating_sub(left_text.chars().count())
        .saturating_sub(right_text.len());
    let status_line = Line::from(vec![
        Span::styled(left_text, styles::muted_style()),
        Span::raw(" ".repeat(padding_len)),
        Span::styled(right_text, styles::muted_style()),
    ]);
    frame.render_widget(Paragraph::new(status_line).style(styles::status_bar_style()), area);
}

fn key_line(key: &str, desc: &str) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("  {:<10}", key), styles::help_key_style()),
        Span::styled(desc.to_string(), styles::help_desc_style()),
    ])
}

fn overlay_block() -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default())
}

fn render_help_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(52, 20, frame.area());
    frame.render_widget(Clear, area);

    let version = env!("CARGO_PKG_VERSION");

    let help_text = vec![
        Line::from(Span::styled("  DGMS Hub", styles::title_style())),
        Line::from(Span::styled(format!("  version {}", version), styles::muted_style())),
        Line::from(""),
        Line::from(Span::styled(" Navigation", styles::highlight_style())),
        key_line("←/→ ↑/↓", "Move between tiles"),
        key_line("Enter", "Open the selected app"),
        key_line("Esc", "Go back"),
        Line::from(""),
        Line::from(Span::styled(" Actions", styles::highlight_style())),
        key_line("/", "Search apps by name"),
        key_line("c / C", "Next / previous category"),
        key_line("r", "Refresh from the network"),
        key_line("i", "Offline cache info"),
        key_line("x", "Clear offline data"),
        key_line("q", "Quit"),
        Line::from(""),
        Line::from(vec![
            Span::styled("       Press ", styles::muted_style()),
            Span::styled("?", styles::help_key_style()),
            Span::styled(" or ", styles::muted_style()),
            Span::styled("Esc", styles::help_key_style()),
            Span::styled(" to close", styles::muted_style()),
        ]),
    ];

    frame.render_widget(Paragraph::new(help_text).block(overlay_block()), area);
}

fn render_diagnostics_overlay(frame: &mut Frame, app: &App) {
    let area = centered_rect_fixed(56, 17, frame.area());
    frame.render_widget(Clear, area);

    let row = |label: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("  {:<16}", label), styles::muted_style()),
            Span::styled(value, styles::help_desc_style()),
        ])
    };

    let mut lines = vec![Line::from(Span::styled(" Offline cache", styles::highlight_style()))];
    lines.push(Line::from(""));
    lines.push(row("Backend", app.config.backend.to_string()));
    lines.push(row("API", truncate_string(&app.config.api_base_url, 34)));
    if let Some(ref d) = app.diagnostics {
        lines.push(row("Network", if d.is_online { "online" } else { "offline" }.to_string()));
        lines.push(row("Syncing", if d.is_syncing { "yes" } else { "no" }.to_string()));
        lines.push(row("Last sync", format_timestamp(d.last_sync)));
        lines.push(row("Apps cached", d.entry_count.to_string()));
        lines.push(row("Cache size", format_size(d.cache_size_bytes)));
        lines.push(row("Stale", if d.is_stale { "yes" } else { "no" }.to_string()));
        lines.push(row("Sync every", format_interval(d.sync_interval_secs)));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("  Press ", styles::muted_style()),
        Span::styled("+/-", styles::help_key_style()),
        Span::styled(" to change sync interval, ", styles::muted_style()),
        Span::styled("Esc", styles::help_key_style()),
        Span::styled(" to close", styles::muted_style()),
    ]));

    frame.render_widget(Paragraph::new(lines).block(overlay_block()), area);
}

fn render_clear_cache_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(46, 7, frame.area());
    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "   Delete all offline app data?",
            styles::highlight_style(),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("   Press ", styles::muted_style()),
            Span::styled("[Y]", styles::help_key_style()),
            Span::styled(" to clear, ", styles::muted_style()),
            Span::styled("[N]", styles::help_key_style()),
            Span::styled(" to cancel", styles::muted_style()),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(overlay_block()), area);
}

fn render_browser(frame: &mut Frame, app: &App) {
    let Some(ref target) = app.browsing else { return };
    let area = frame.area();
    frame.render_widget(Clear, area);

    let entry = app.view.visible().get(app.selection).copied();
    let mut lines = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  URL  ", styles::muted_style()),
            Span::styled(target.url.clone(), styles::search_style()),
        ]),
    ];
    if let Some(entry) = entry {
        if let Some(ref description) = entry.description {
            lines.push(Line::from(""));
            lines.push(Line::from(format!("  {}", description)));
        }
        if entry.requires_auth {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "  Sign-in required on the site",
                styles::highlight_style(),
            )));
        }
    }
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("  Press ", styles::muted_style()),
        Span::styled("Esc", styles::help_key_style()),
        Span::styled(" to return to the hub", styles::muted_style()),
    ]));

    let block = Block::default()
        .title(Span::styled(format!(" {} ", target.name), styles::title_style()))
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }).block(block), area);
}

/// Create a centered rectangle with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}
