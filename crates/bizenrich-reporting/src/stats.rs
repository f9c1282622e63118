use bizenrich_core::{ResultRecord, ScrapeStatus};

/// Coarse classification of scrape failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCategory {
    NotFound,
    StrategiesFailed,
    Timeout,
    Other,
}

impl ErrorCategory {
    pub fn classify(message: &str) -> Self {
        if message.contains("No search results") {
            Self::NotFound
        } else if message.contains("All search strategies failed") {
            Self::StrategiesFailed
        } else if message.contains("Timeout") {
            Self::Timeout
        } else {
            Self::Other
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NotFound => "Business not found",
            Self::StrategiesFailed => "All search strategies failed",
            Self::Timeout => "Timeout errors",
            Self::Other => "Other errors",
        }
    }
}

/// Summary of a finished (or in-progress) result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultStats {
    pub total: usize,
    pub successful: usize,
    pub partial: usize,
    pub failed: usize,
    /// Non-zero categories only, in declaration order.
    pub errors: Vec<(ErrorCategory, usize)>,
}

impl ResultStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ResultRecord>) -> Self {
        let mut stats = Self::default();
        let mut counts = [0usize; 4];
        for record in records {
            stats.total += 1;
            match record.status() {
                ScrapeStatus::Success => stats.successful += 1,
                ScrapeStatus::Partial => stats.partial += 1,
                ScrapeStatus::Failed => stats.failed += 1,
            }
            if let Some(message) = record.error_message() {
                counts[ErrorCategory::classify(message) as usize] += 1;
            }
        }
        stats.errors = [
            ErrorCategory::NotFound,
            ErrorCategory::StrategiesFailed,
            ErrorCategory::Timeout,
            ErrorCategory::Other,
        ]
        .into_iter()
        .zip(counts)
        .filter(|(_, n)| *n > 0)
        .collect();
        stats
    }

    /// Share of fully successful records, 0-100.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64 * 100.0
        }
    }

    pub fn rating(&self) -> &'static str {
        match self.success_rate() {
            r if r >= 50.0 => "Good",
            r if r >= 30.0 => "Fair",
            _ => "Low",
        }
    }
}
