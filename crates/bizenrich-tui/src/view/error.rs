use ratatui::Frame;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::app::App;
use crate::view::{render_footer, render_header};

/// Render the Error screen.
pub fn render(f: &mut Frame, app: &App) {
    let theme = &app.theme;
    let chunks = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(5),
        Constraint::Length(1),
    ])
    .split(f.area());

    render_header(f, chunks[0], app, "Error");

    let message = app
        .error_message
        .as_deref()
        .unwrap_or("Something went wrong.");
    let lines = vec![
        Line::from(Span::styled(
            message,
            Style::default().fg(theme.failed).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "Press r to start over with a new upload.",
            Style::default().fg(theme.dim),
        )),
    ];
    let panel = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.failed))
                .title(" Upload failed "),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(panel, chunks[1]);

    render_footer(f, chunks[2], app, "r:retry  ?:help  q:quit");
}
