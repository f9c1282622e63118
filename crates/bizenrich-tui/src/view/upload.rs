use ratatui::Frame;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use bizenrich_core::AppStatus;

use crate::app::App;
use crate::view::{render_footer, render_header, spinner_char};

/// Render the Upload screen (idle and uploading).
pub fn render(f: &mut Frame, app: &App) {
    let theme = &app.theme;
    let chunks = Layout::vertical([
        Constraint::Length(1), // header
        Constraint::Length(3), // path input
        Constraint::Min(4),    // instructions
        Constraint::Length(1), // footer
    ])
    .split(f.area());

    render_header(f, chunks[0], app, "New batch");

    let uploading = app.status == AppStatus::Uploading;
    let input_line = if uploading {
        Line::from(vec![
            Span::styled(format!("{} ", spinner_char(app.tick)), Style::default().fg(theme.spinner)),
            Span::styled(app.upload.input.as_str(), Style::default().fg(theme.dim)),
            Span::styled("  uploading…", Style::default().fg(theme.active)),
        ])
    } else {
        Line::from(vec![
            Span::styled(app.upload.input.as_str(), Style::default().fg(theme.text)),
            Span::styled("█", Style::default().fg(theme.active)),
        ])
    };
    let input = Paragraph::new(input_line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if uploading { theme.border } else { theme.active }))
            .title(" CSV file "),
    );
    f.render_widget(input, chunks[1]);

    let mut lines = Vec::new();
    if let Some(error) = &app.upload.error {
        lines.push(Line::from(Span::styled(
            error.as_str(),
            Style::default().fg(theme.failed).add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(""));
    }
    lines.extend([
        Line::from(Span::styled(
            "Type the path of a CSV file with one business per row and press Enter.",
            Style::default().fg(theme.text),
        )),
        Line::from(Span::styled(
            "Expected columns: name, address, city, postal_code.",
            Style::default().fg(theme.dim),
        )),
        Line::from(Span::styled(
            "Progress is saved: if you quit while a batch is processing, it resumes on the next start.",
            Style::default().fg(theme.dim),
        )),
    ]);
    f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), chunks[2]);

    render_footer(f, chunks[3], app, "Enter:upload  F1:help  Esc:quit");
}
