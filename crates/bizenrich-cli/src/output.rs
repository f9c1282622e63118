//! Human-readable terminal output.

use std::fmt::Display;

use owo_colors::{OwoColorize, Style};

use bizenrich_core::model::{BatchStatus, ResultRecord, ScrapeStatus, UploadResponse};
use bizenrich_core::HealthReport;
use bizenrich_reporting::ResultStats;

/// Colours output only when enabled.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    color: bool,
}

impl Palette {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, text: impl Display, style: Style) -> String {
        if self.color {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn good(&self, text: impl Display) -> String {
        self.paint(text, Style::new().green())
    }

    pub fn warn(&self, text: impl Display) -> String {
        self.paint(text, Style::new().yellow())
    }

    pub fn bad(&self, text: impl Display) -> String {
        self.paint(text, Style::new().red())
    }

    pub fn dim(&self, text: impl Display) -> String {
        self.paint(text, Style::new().dimmed())
    }

    pub fn bold(&self, text: impl Display) -> String {
        self.paint(text, Style::new().bold())
    }

    /// `text` in the colour of `status`.
    pub fn status(&self, status: ScrapeStatus, text: impl Display) -> String {
        match status {
            ScrapeStatus::Success => self.good(text),
            ScrapeStatus::Partial => self.warn(text),
            ScrapeStatus::Failed => self.bad(text),
        }
    }
}

pub fn print_upload(p: Palette, resp: &UploadResponse) {
    println!(
        "{} batch {} with {} jobs",
        p.good("Created"),
        p.bold(&resp.batch_id),
        resp.jobs_created
    );
    if !resp.message.is_empty() {
        println!("  {}", p.dim(&resp.message));
    }
}

pub fn print_status(p: Palette, status: &BatchStatus) {
    let progress = &status.progress;
    println!("{} {}", p.bold("Batch"), status.batch_id);
    println!("  State:      {}", status.status.label());
    println!(
        "  Progress:   {}/{} ({:.0}%)",
        progress.completed,
        status.expected_total(),
        progress.percentage
    );
    println!(
        "  Failed:     {}   Processing: {}   Waiting: {}",
        progress.failed, progress.processing, progress.waiting
    );
    if let Some(summary) = &status.summary {
        println!(
            "  Summary:    {} success, {} partial, {} failed of {}",
            summary.successful_scrapes,
            summary.partial_scrapes,
            summary.failed_scrapes,
            summary.total_businesses
        );
    }
    println!("  Results:    {}", status.results.len());
}

/// One line per record, as shown while a batch is followed.
pub fn result_line(p: Palette, record: &ResultRecord) -> String {
    let status = record.status();
    let label = format!("{:<8}", status.label());
    let mut line = format!("  {} {}", p.status(status, label), record.display_name());
    if let Some(error) = record.error_message() {
        line.push_str(&format!("  {}", p.dim(error)));
    }
    line
}

pub fn print_summary(p: Palette, batch_id: &str, records: &[ResultRecord]) {
    let stats = ResultStats::from_records(records);
    let rate = format!("{:.1}%", stats.success_rate());
    let rate = match stats.rating() {
        "Good" => p.good(rate),
        "Fair" => p.warn(rate),
        _ => p.bad(rate),
    };

    println!();
    println!("{} {}", p.bold("Batch complete:"), batch_id);
    println!(
        "  {} total   {} {}   {} {}   {} {}",
        stats.total,
        p.good("success"),
        stats.successful,
        p.warn("partial"),
        stats.partial,
        p.bad("failed"),
        stats.failed
    );
    println!("  Success rate {rate} ({})", stats.rating());

    if !stats.errors.is_empty() {
        println!("  {}", p.bold("Errors"));
        for (category, count) in &stats.errors {
            println!("    {:<22} {count}", category.label());
        }
    }

    let failed: Vec<&ResultRecord> = records
        .iter()
        .filter(|r| r.status() == ScrapeStatus::Failed)
        .collect();
    if !failed.is_empty() {
        println!("  {}", p.bold("Failed businesses"));
        for record in failed {
            println!("  {}", result_line(p, record));
        }
    }
}

pub fn print_health(p: Palette, report: &HealthReport) {
    for (name, up) in [
        ("API", report.api),
        ("Redis", report.redis),
        ("Worker", report.worker),
    ] {
        let state = if up { p.good("up") } else { p.bad("down") };
        println!("  {name:<8} {state}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizenrich_core::model::OriginalData;

    #[test]
    fn plain_palette_adds_no_escapes() {
        let p = Palette::new(false);
        assert_eq!(p.good("ok"), "ok");
        assert_eq!(p.status(ScrapeStatus::Failed, "Failed"), "Failed");
    }

    #[test]
    fn colored_palette_wraps_text() {
        let p = Palette::new(true);
        let painted = p.bad("down");
        assert!(painted.contains("down"));
        assert!(painted.starts_with('\u{1b}'));
    }

    #[test]
    fn result_line_includes_error() {
        let record = ResultRecord {
            job_id: None,
            original_data: OriginalData {
                name: "Bakery".into(),
                ..Default::default()
            },
            scraped_data: None,
            processing_time: None,
            processed_at: None,
            worker: None,
            error: Some("Timeout after 30s".into()),
        };
        let line = result_line(Palette::new(false), &record);
        assert!(line.contains("Failed"));
        assert!(line.contains("Bakery"));
        assert!(line.contains("Timeout after 30s"));
    }
}
