use ratatui::Frame;
use ratatui::layout::{Constraint, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Row, Table, TableState};

use crate::app::App;
use crate::view::truncate;

/// Results table used by the processing and complete screens.
pub fn render_table(f: &mut Frame, area: Rect, app: &App, title: &str) {
    let theme = &app.theme;
    let wide = area.width >= 110;

    let header_cells = if wide {
        vec!["#", "Business", "Address", "Phone", "Rating", "Status"]
    } else {
        vec!["#", "Business", "Rating", "Status"]
    };
    let header = Row::new(
        header_cells
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().fg(theme.text).add_modifier(Modifier::BOLD))),
    )
    .height(1);

    let name_width = if wide {
        (area.width as usize).saturating_sub(70) / 2 + 10
    } else {
        (area.width as usize).saturating_sub(30)
    };

    let rows: Vec<Row> = app
        .rows()
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let scraped = record.scraped_data.as_ref();
            let status = record.status();
            let rating = scraped
                .and_then(|s| s.rating)
                .map(|r| format!("{r:.1}"))
                .unwrap_or_else(|| "—".to_string());
            let status_cell = Cell::from(status.label())
                .style(Style::default().fg(theme.status_color(status)));
            let name = truncate(record.display_name(), name_width);

            if wide {
                let address = scraped
                    .and_then(|s| s.full_address.as_deref())
                    .or(record.original_data.address.as_deref())
                    .unwrap_or("");
                let phone = scraped.and_then(|s| s.phone.as_deref()).unwrap_or("");
                Row::new(vec![
                    Cell::from(format!("{}", i + 1)),
                    Cell::from(name),
                    Cell::from(truncate(address, name_width)),
                    Cell::from(phone.to_string()),
                    Cell::from(rating),
                    status_cell,
                ])
            } else {
                Row::new(vec![
                    Cell::from(format!("{}", i + 1)),
                    Cell::from(name),
                    Cell::from(rating),
                    status_cell,
                ])
            }
        })
        .collect();

    let widths = if wide {
        vec![
            Constraint::Length(5),
            Constraint::Min(20),
            Constraint::Min(20),
            Constraint::Length(18),
            Constraint::Length(7),
            Constraint::Length(9),
        ]
    } else {
        vec![
            Constraint::Length(5),
            Constraint::Min(15),
            Constraint::Length(7),
            Constraint::Length(9),
        ]
    };

    let table = Table::new(rows, &widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.border_style())
                .title(format!(" {title} · Sort: {} (s) ", app.sort_order.label())),
        )
        .row_highlight_style(theme.highlight_style());

    let mut state = TableState::default();
    state.select(Some(app.cursor));
    f.render_stateful_widget(table, area, &mut state);
}
