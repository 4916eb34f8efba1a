//! Download module
//!
//! Streaming HTTP transfers with resume, retry and validation, plus the
//! queueing manager that drives them for workshop items.

pub mod files;
pub mod http;
pub mod manager;
pub mod metrics;
pub mod progress;
pub mod validation;

// Re-export main types for convenience
pub use files::{extraction_dir, item_extension, item_filename, part_path};
pub use http::{CancelReason, DownloadControl, HttpClient, retry_with_backoff};
pub use manager::{DownloadManager, ManagerStats, StartOutcome};
pub use metrics::{DownloadMetrics, DownloadMetricsSnapshot};
pub use progress::{
    CompositeProgressReporter, ConsoleProgressReporter, IntoProgressCallback, NullProgressReporter,
    ProgressCallback, ProgressEvent, ProgressReporter, percentage,
};
pub use validation::{FileValidation, xxhash64_hex};
