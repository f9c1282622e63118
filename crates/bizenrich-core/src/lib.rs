use thiserror::Error;

pub mod api;
pub mod config;
pub mod model;
pub mod reconcile;
pub mod session;
pub mod sse;
pub mod stream;

// Re-export for convenience
pub use api::{ApiClient, ApiError, HealthReport};
pub use config::{Config, ConfigError, TransportPolicy};
pub use model::{
    BatchProgress, BatchState, BatchStatus, BatchSummary, Coordinates, OriginalData,
    ResultRecord, ScrapeStatus, ScrapedData, SocialMedia, UploadResponse,
};
pub use reconcile::{BatchMonitor, Completion, ProgressState, Reconciler, Signal, Timing};
pub use session::{
    AppStatus, FileStore, KeyValueStore, MemoryStore, ResumeOutcome, ResumeTicket, SessionError,
    SessionStore,
};
pub use stream::{
    BatchBackend, ChannelState, ConnectionStatus, EventSink, StreamClient, StreamError,
    StreamErrorKind, StreamEvent,
};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("config file {}: {source}", path.display())]
    ConfigFile {
        path: std::path::PathBuf,
        source: ConfigError,
    },
}
