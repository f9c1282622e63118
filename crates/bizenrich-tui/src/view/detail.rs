use ratatui::Frame;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use bizenrich_core::model::{ResultRecord, WEEKDAYS};
use bizenrich_reporting::format_hours;

use crate::app::App;
use crate::theme::Theme;
use crate::view::{render_footer, truncate};

/// Render the Business Detail screen for the selected record.
pub fn render(f: &mut Frame, app: &App) {
    let theme = &app.theme;
    let chunks = Layout::vertical([
        Constraint::Length(1), // breadcrumb
        Constraint::Min(5),    // scrollable content
        Constraint::Length(1), // footer
    ])
    .split(f.area());

    let Some(record) = app.detail_record() else {
        // The record vanished (e.g. the final result set replaced it).
        f.render_widget(
            Paragraph::new(Span::styled(" Record no longer available", Style::default().fg(theme.dim))),
            chunks[1],
        );
        render_footer(f, chunks[2], app, "Esc:back  q:quit");
        return;
    };

    let breadcrumb = Line::from(vec![
        Span::styled(" BIZENRICH ", theme.header_style()),
        Span::styled(" > ", Style::default().fg(theme.dim)),
        Span::styled(
            app.batch_id.as_deref().unwrap_or("batch"),
            Style::default().fg(theme.text).add_modifier(Modifier::BOLD),
        ),
        Span::styled(" > ", Style::default().fg(theme.dim)),
        Span::styled(truncate(record.display_name(), 50), Style::default().fg(theme.text)),
    ]);
    f.render_widget(Paragraph::new(breadcrumb), chunks[0]);

    let lines = detail_lines(record, theme);
    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.border_style()),
        )
        .wrap(Wrap { trim: false })
        .scroll((app.detail_scroll, 0));
    f.render_widget(paragraph, chunks[1]);

    render_footer(f, chunks[2], app, "j/k:scroll  Esc:back  ?:help  q:quit");
}

fn detail_lines<'a>(record: &'a ResultRecord, theme: &Theme) -> Vec<Line<'a>> {
    let mut lines = Vec::new();
    let status = record.status();

    section_header(&mut lines, "INPUT", theme);
    labeled_line(&mut lines, "Name", &record.original_data.name, theme);
    if let Some(address) = &record.original_data.address {
        labeled_line(&mut lines, "Address", address, theme);
    }
    if let Some(city) = &record.original_data.city {
        labeled_line(&mut lines, "City", city, theme);
    }
    if let Some(postal) = &record.original_data.postal_code {
        labeled_line(&mut lines, "Postal code", postal, theme);
    }
    lines.push(Line::from(""));

    section_header(&mut lines, "OUTCOME", theme);
    lines.push(Line::from(vec![
        Span::styled(format!("  {:<16}", "Status"), Style::default().fg(theme.dim)),
        Span::styled(
            status.label(),
            Style::default()
                .fg(theme.status_color(status))
                .add_modifier(Modifier::BOLD),
        ),
    ]));
    if let Some(error) = record.error_message() {
        lines.push(Line::from(vec![
            Span::styled(format!("  {:<16}", "Error"), Style::default().fg(theme.dim)),
            Span::styled(error.to_string(), Style::default().fg(theme.failed)),
        ]));
    }
    if let Some(ms) = record.processing_time {
        labeled_line(&mut lines, "Processing time", &format!("{ms:.0} ms"), theme);
    }
    if let Some(worker) = record.worker {
        labeled_line(&mut lines, "Worker", &worker.to_string(), theme);
    }
    if let Some(at) = &record.processed_at {
        labeled_line(&mut lines, "Processed at", at, theme);
    }

    let Some(scraped) = &record.scraped_data else {
        return lines;
    };

    lines.push(Line::from(""));
    section_header(&mut lines, "FOUND", theme);
    let fields = [
        ("Name", scraped.full_name.as_deref()),
        ("Address", scraped.full_address.as_deref()),
        ("Phone", scraped.phone.as_deref()),
        ("Website", scraped.website.as_deref()),
        ("Category", scraped.category.as_deref()),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            labeled_line(&mut lines, label, value, theme);
        }
    }
    if let Some(rating) = scraped.rating {
        let reviews = scraped
            .reviews_count
            .map(|n| format!(" ({n} reviews)"))
            .unwrap_or_default();
        labeled_line(&mut lines, "Rating", &format!("{rating:.1}{reviews}"), theme);
    }
    if let Some(coords) = &scraped.coordinates {
        labeled_line(
            &mut lines,
            "Coordinates",
            &format!("{:.6}, {:.6}", coords.lat, coords.lng),
            theme,
        );
    }

    if let Some(social) = &scraped.social_media {
        let links = social.links();
        if !links.is_empty() {
            lines.push(Line::from(""));
            section_header(&mut lines, "SOCIAL", theme);
            for (network, url) in links {
                labeled_line(&mut lines, network, url, theme);
            }
        }
    }

    if scraped.opening_hours.as_ref().is_some_and(|h| !h.is_empty()) {
        lines.push(Line::from(""));
        section_header(&mut lines, "OPENING HOURS", theme);
        for day in WEEKDAYS {
            let hours = scraped
                .hours_for(day)
                .map(format_hours)
                .unwrap_or_else(|| "—".to_string());
            labeled_line(&mut lines, day, &hours, theme);
        }
    }

    lines
}

fn section_header(lines: &mut Vec<Line<'_>>, title: &'static str, theme: &Theme) {
    lines.push(Line::from(Span::styled(
        format!("  {title}"),
        Style::default()
            .fg(theme.active)
            .add_modifier(Modifier::BOLD),
    )));
}

fn labeled_line(lines: &mut Vec<Line<'_>>, label: &str, value: &str, theme: &Theme) {
    lines.push(Line::from(vec![
        Span::styled(format!("  {label:<16}"), Style::default().fg(theme.dim)),
        Span::styled(value.to_string(), Style::default().fg(theme.text)),
    ]));
}
