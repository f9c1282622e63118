pub mod export;
pub mod stats;
pub mod types;

pub use export::{format_hours, to_csv, to_json, write_export};
pub use stats::{ErrorCategory, ResultStats};
pub use types::{ExportError, ExportFormat, export_filename};
