use std::path::PathBuf;

use bizenrich_core::{
    ApiError, BatchStatus, HealthReport, ResumeOutcome, StreamEvent, UploadResponse,
};

/// Events flowing from backend tasks to the TUI.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    /// The CSV upload finished.
    Uploaded(Result<UploadResponse, ApiError>),
    /// Normalized event from the stream client of the batch being monitored.
    Stream(StreamEvent),
    /// Authoritative record set fetched after completion.
    FinalResults {
        batch_id: String,
        result: Result<BatchStatus, ApiError>,
    },
    /// Outcome of resuming the batch persisted by a previous session.
    Resumed(ResumeOutcome),
    /// An export finished; `Ok` carries the written file.
    Exported(Result<PathBuf, String>),
    Health(HealthReport),
}
