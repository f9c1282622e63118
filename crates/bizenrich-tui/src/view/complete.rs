use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::App;
use crate::view::results::render_table;
use crate::view::{render_footer, render_header};

/// Render the Complete screen: summary statistics above the final results.
pub fn render(f: &mut Frame, app: &App) {
    let chunks = Layout::vertical([
        Constraint::Length(1), // header
        Constraint::Length(4), // stats
        Constraint::Min(5),    // results
        Constraint::Length(1), // footer
    ])
    .split(f.area());

    render_header(f, chunks[0], app, "Complete");
    render_stats(f, chunks[1], app);
    render_table(f, chunks[2], app, "Results");
    render_footer(
        f,
        chunks[3],
        app,
        "Enter:details  e:server CSV  x:local CSV  J:JSON  n:new search  ?:help  q:quit",
    );
}

fn render_stats(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.theme;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.border_style())
        .title(" Summary ");

    let Some(stats) = &app.stats else {
        f.render_widget(Paragraph::new("").block(block), area);
        return;
    };

    let rate_color = match stats.rating() {
        "Good" => theme.success,
        "Fair" => theme.partial,
        _ => theme.failed,
    };
    let counts = Line::from(vec![
        Span::styled(format!(" {} total  ", stats.total), theme.title_style()),
        Span::styled(format!("✓ {}  ", stats.successful), Style::default().fg(theme.success)),
        Span::styled(format!("◐ {}  ", stats.partial), Style::default().fg(theme.partial)),
        Span::styled(format!("✗ {}  ", stats.failed), Style::default().fg(theme.failed)),
        Span::styled(
            format!("success rate {:.1}% ({})", stats.success_rate(), stats.rating()),
            Style::default().fg(rate_color).add_modifier(Modifier::BOLD),
        ),
    ]);

    let errors = if stats.errors.is_empty() {
        Line::from(Span::styled(" No errors", Style::default().fg(theme.dim)))
    } else {
        let mut spans = vec![Span::styled(" Errors: ", Style::default().fg(theme.dim))];
        for (category, count) in &stats.errors {
            spans.push(Span::styled(
                format!("{} {}  ", category.label(), count),
                Style::default().fg(theme.failed),
            ));
        }
        Line::from(spans)
    };

    f.render_widget(Paragraph::new(vec![counts, errors]).block(block), area);
}
