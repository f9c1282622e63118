//! Backend payload types for batches and scraped business records.
//!
//! Everything here is validated at the deserialization boundary: unknown
//! scrape statuses or batch states fail to decode instead of being carried
//! around as free-form strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Outcome of scraping one business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeStatus {
    Success,
    Partial,
    Failed,
}

impl ScrapeStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Partial => "Partial",
            Self::Failed => "Failed",
        }
    }
}

/// Input row as supplied in the uploaded CSV.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default, rename = "postal_code", alias = "postalCode")]
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialMedia {
    #[serde(default)]
    pub facebook: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(default)]
    pub twitter: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub youtube: Option<String>,
}

impl SocialMedia {
    /// `(network, url)` pairs for every link that is present and non-empty.
    pub fn links(&self) -> Vec<(&'static str, &str)> {
        [
            ("Facebook", &self.facebook),
            ("Instagram", &self.instagram),
            ("Twitter", &self.twitter),
            ("LinkedIn", &self.linkedin),
            ("YouTube", &self.youtube),
        ]
        .into_iter()
        .filter_map(|(name, url)| {
            url.as_deref()
                .filter(|u| !u.trim().is_empty())
                .map(|u| (name, u))
        })
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude", alias = "lon")]
    pub lng: f64,
}

/// What the scraper found for one input row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedData {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub full_address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub social_media: Option<SocialMedia>,
    /// Keyed by day name as the backend reports it ("Monday", "mon", ...).
    #[serde(default)]
    pub opening_hours: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default, alias = "reviews_count")]
    pub reviews_count: Option<u64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    pub status: ScrapeStatus,
    #[serde(default)]
    pub scraped_at: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Full English day names, Monday first.
pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

impl ScrapedData {
    /// Opening hours for `day` (a full English day name), trying the full,
    /// lower-case and three-letter spellings.
    pub fn hours_for(&self, day: &str) -> Option<&str> {
        let hours = self.opening_hours.as_ref()?;
        let lower = day.to_lowercase();
        let short: String = day.chars().take(3).collect();
        let short_lower = short.to_lowercase();
        [day, lower.as_str(), short.as_str(), short_lower.as_str()]
            .into_iter()
            .find_map(|key| hours.get(key))
            .map(String::as_str)
    }
}

/// One scraped business outcome, as delivered by status polls and `result`
/// stream events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub original_data: OriginalData,
    #[serde(default)]
    pub scraped_data: Option<ScrapedData>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub processed_at: Option<String>,
    #[serde(default)]
    pub worker: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ResultRecord {
    /// Deduplication key: the job id when the backend supplied one, otherwise
    /// the input name, address and city.
    pub fn identity_key(&self) -> String {
        match self.job_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => format!("job:{id}"),
            _ => {
                let o = &self.original_data;
                format!(
                    "row:{}|{}|{}",
                    o.name.trim(),
                    o.address.as_deref().unwrap_or("").trim(),
                    o.city.as_deref().unwrap_or("").trim()
                )
            }
        }
    }

    /// Effective outcome: the scraped status, or `Failed` when nothing was
    /// scraped.
    pub fn status(&self) -> ScrapeStatus {
        self.scraped_data
            .as_ref()
            .map_or(ScrapeStatus::Failed, |s| s.status)
    }

    /// First error message found on the record or its scraped payload.
    pub fn error_message(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.scraped_data.as_ref().and_then(|s| s.error.as_deref()))
            .filter(|e| !e.trim().is_empty())
    }

    /// Best display name: what was found, else what was asked for.
    pub fn display_name(&self) -> &str {
        self.scraped_data
            .as_ref()
            .and_then(|s| s.full_name.as_deref())
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.original_data.name)
    }
}

/// Server-side batch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Queued,
    Processing,
    Completed,
    CompletedWithErrors,
}

impl BatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithErrors)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed with errors",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub processing: u64,
    #[serde(default)]
    pub waiting: u64,
    #[serde(default)]
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    #[serde(default)]
    pub total_businesses: u64,
    #[serde(default)]
    pub successful_scrapes: u64,
    #[serde(default)]
    pub partial_scrapes: u64,
    #[serde(default)]
    pub failed_scrapes: u64,
}

/// Response of the batch status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatus {
    pub batch_id: String,
    pub status: BatchState,
    #[serde(default)]
    pub progress: BatchProgress,
    #[serde(default, deserialize_with = "lenient_records")]
    pub results: Vec<ResultRecord>,
    #[serde(default)]
    pub summary: Option<BatchSummary>,
    /// Older backends report the job count here instead of in `progress`.
    #[serde(default)]
    pub total_jobs: Option<u64>,
}

impl BatchStatus {
    /// Total work items, falling back to `totalJobs` when progress has none.
    pub fn expected_total(&self) -> u64 {
        if self.progress.total > 0 {
            self.progress.total
        } else {
            self.total_jobs.unwrap_or(0)
        }
    }
}

/// Response of the upload endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub batch_id: String,
    #[serde(default)]
    pub jobs_created: u64,
    #[serde(default)]
    pub message: String,
}

/// Decode a result list one element at a time, dropping (and logging) the
/// records that do not match the expected shape.
fn lenient_records<'de, D>(deserializer: D) -> Result<Vec<ResultRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    let raw = raw.unwrap_or_default();
    let total = raw.len();
    let records: Vec<ResultRecord> = raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("quarantined malformed result record: {e}");
                None
            }
        })
        .collect();
    if records.len() < total {
        log::warn!("{} of {} result records dropped", total - records.len(), total);
    }
    Ok(records)
}
