use bizenrich_core::{ResultRecord, ScrapeStatus};

/// Sort order for the results table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Most recent first, as accepted.
    #[default]
    Arrival,
    /// Failed, then partial, then successful.
    Problems,
    Name,
}

impl SortOrder {
    pub fn next(self) -> Self {
        match self {
            Self::Arrival => Self::Problems,
            Self::Problems => Self::Name,
            Self::Name => Self::Arrival,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Arrival => "Arrival",
            Self::Problems => "Problems",
            Self::Name => "Name",
        }
    }
}

fn severity(status: ScrapeStatus) -> u8 {
    match status {
        ScrapeStatus::Failed => 0,
        ScrapeStatus::Partial => 1,
        ScrapeStatus::Success => 2,
    }
}

/// Records in display order. Sorting is stable, so ties keep arrival order.
pub fn sorted<'a>(
    records: impl Iterator<Item = &'a ResultRecord>,
    order: SortOrder,
) -> Vec<&'a ResultRecord> {
    let mut rows: Vec<&ResultRecord> = records.collect();
    match order {
        SortOrder::Arrival => {}
        SortOrder::Problems => rows.sort_by_key(|r| severity(r.status())),
        SortOrder::Name => rows.sort_by_cached_key(|r| r.display_name().to_lowercase()),
    }
    rows
}
