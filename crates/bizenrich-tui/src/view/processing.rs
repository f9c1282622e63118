use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};

use bizenrich_core::ChannelState;

use crate::app::App;
use crate::view::results::render_table;
use crate::view::{render_footer, render_header, spinner_char};

/// Render the Processing screen.
pub fn render(f: &mut Frame, app: &App) {
    let chunks = Layout::vertical([
        Constraint::Length(1), // header
        Constraint::Length(3), // gauge
        Constraint::Length(1), // connection + advisory
        Constraint::Min(5),    // live results
        Constraint::Length(1), // footer
    ])
    .split(f.area());

    render_header(f, chunks[0], app, "Processing");
    render_gauge(f, chunks[1], app);
    render_status_line(f, chunks[2], app);
    render_table(f, chunks[3], app, "Live results");

    let hints = if app.stuck {
        "No data yet: the batch may already be finished. n:new search  q:quit"
    } else {
        "j/k:nav  Enter:details  s:sort  n:new search  ?:help  q:quit"
    };
    render_footer(f, chunks[4], app, hints);
}

fn render_gauge(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let progress = app.monitor.progress();
    let label = if progress.total > 0 {
        format!(
            "{}/{} businesses ({:.0}%)",
            progress.completed,
            progress.total,
            progress.percentage()
        )
    } else {
        format!("{} businesses, total not known yet", progress.completed)
    };
    let title = match &app.batch_id {
        Some(id) => format!(" Batch {id} "),
        None => " Batch ".to_string(),
    };
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.border_style())
                .title(title),
        )
        .gauge_style(Style::default().fg(theme.gauge))
        .ratio((progress.percentage() / 100.0).clamp(0.0, 1.0))
        .label(label);
    f.render_widget(gauge, area);
}

fn render_status_line(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let state = app.connection.state;
    let mut spans = vec![Span::styled(
        format!(" {} {} ", connection_glyph(state, app.tick), state.label()),
        Style::default()
            .fg(theme.channel_color(state))
            .add_modifier(Modifier::BOLD),
    )];

    if app.fetching_final {
        spans.push(Span::styled(
            format!("{} fetching final results", spinner_char(app.tick)),
            Style::default().fg(theme.active),
        ));
    } else if app.stuck {
        spans.push(Span::styled(
            "No data received. The batch may already be complete.",
            Style::default().fg(theme.partial),
        ));
    } else if let Some(advisory) = &app.advisory {
        spans.push(Span::styled(advisory.as_str(), Style::default().fg(theme.partial)));
    }

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn connection_glyph(state: ChannelState, tick: usize) -> char {
    match state {
        ChannelState::Connecting => spinner_char(tick),
        ChannelState::Live => '●',
        ChannelState::Polling => '↻',
        ChannelState::Completed => '✓',
        ChannelState::Idle => '○',
    }
}
