pub mod complete;
pub mod detail;
pub mod error;
pub mod help;
pub mod processing;
pub mod results;
pub mod upload;

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::app::App;

/// Spinner frames for animated progress indication.
const SPINNER_FRAMES: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Get the current spinner character based on a tick counter.
pub fn spinner_char(tick: usize) -> char {
    SPINNER_FRAMES[tick % SPINNER_FRAMES.len()]
}

/// Truncate a string to fit in `max_width` columns, appending "…" if truncated.
pub fn truncate(s: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if s.chars().count() <= max_width {
        return s.to_string();
    }
    let mut truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

/// Title bar shared by all screens: app name, screen title, backend health.
pub fn render_header(f: &mut Frame, area: Rect, app: &App, title: &str) {
    let theme = &app.theme;
    let mut spans = vec![
        Span::styled(" BIZENRICH ", theme.header_style()),
        Span::styled(format!(" {title}"), theme.title_style()),
    ];

    match &app.health {
        Some(health) => {
            spans.push(Span::styled("   ", Style::default()));
            for (name, up) in [
                ("API", health.api),
                ("Redis", health.redis),
                ("Worker", health.worker),
            ] {
                spans.push(Span::styled(
                    format!("{} {name} ", if up { '●' } else { '○' }),
                    Style::default().fg(theme.up_down_color(up)),
                ));
            }
        }
        None => spans.push(Span::styled(
            "   checking backend…",
            Style::default().fg(theme.dim),
        )),
    }

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Footer with the key hints, or the current notice when there is one.
pub fn render_footer(f: &mut Frame, area: Rect, app: &App, hints: &str) {
    let theme = &app.theme;
    let line = match &app.notice {
        Some((message, _)) => Line::from(Span::styled(
            format!(" {message}"),
            Style::default().fg(theme.active),
        )),
        None => Line::from(Span::styled(format!(" {hints}"), theme.footer_style())),
    };
    f.render_widget(Paragraph::new(line), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate("Café Roma", 9), "Café Roma");
        assert_eq!(truncate("Café Roma", 5), "Café…");
        assert_eq!(truncate("abc", 0), "");
    }
}
