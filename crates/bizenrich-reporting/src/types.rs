use chrono::{DateTime, Local};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode results: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Csv => "CSV",
            Self::Json => "JSON",
        }
    }
}

/// `scraping-results-2024-05-01T14-03-59.csv`
pub fn export_filename(format: ExportFormat, now: DateTime<Local>) -> String {
    bizenrich_core::api::timestamped_filename(format.extension(), now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn filename_has_no_colons() {
        let now = Local.with_ymd_and_hms(2024, 5, 1, 14, 3, 59).unwrap();
        assert_eq!(
            export_filename(ExportFormat::Csv, now),
            "scraping-results-2024-05-01T14-03-59.csv"
        );
        assert!(export_filename(ExportFormat::Json, now).ends_with(".json"));
    }
}
