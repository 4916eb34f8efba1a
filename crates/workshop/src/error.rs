//! Error types for the workshop engine with context and recovery information

use std::error::Error;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the API client, authentication, caches and downloads
#[derive(Error, Debug)]
pub enum WorkshopError {
    /// HTTP transport errors with context
    #[error("HTTP request to '{url}' failed")]
    HttpRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Network timeout with retry suggestion
    #[error("Request to '{url}' timed out after {duration_secs}s (try increasing timeout or check network)")]
    NetworkTimeout {
        url: String,
        duration_secs: u64,
    },

    /// Steam Web API answered with an error status or an unusable body
    #[error("Steam API call '{endpoint}' failed (status {status:?}): {message}")]
    Api {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("Invalid response from '{endpoint}': {message}")]
    InvalidResponse {
        endpoint: String,
        message: String,
    },

    /// Endpoint requires a Web API key that was not configured
    #[error("A Steam Web API key is required for '{endpoint}'")]
    MissingApiKey {
        endpoint: String,
    },

    /// Steam Community login failures
    #[error("Steam authentication failed: {message}")]
    Auth {
        message: String,
    },

    /// File system I/O errors with file context
    #[error("File operation failed on '{path}' while {operation}")]
    FileSystem {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    /// URL parsing errors with helpful suggestions
    #[error("Invalid URL '{url}': {suggestion}")]
    InvalidUrl {
        url: String,
        suggestion: String,
    },

    /// JSON (de)serialization failures
    #[error("JSON error in {context}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// File validation errors with detailed context
    #[error("File validation failed for '{file}': {validation_type} mismatch")]
    ValidationFailed {
        file: PathBuf,
        validation_type: ValidationType,
        expected: String,
        actual: String,
    },

    /// File size validation with helpful context
    #[error("File size mismatch for '{file}': expected {expected} bytes, got {actual} bytes (difference: {diff} bytes)")]
    SizeMismatch {
        file: PathBuf,
        expected: u64,
        actual: u64,
        diff: i64,
    },

    /// Item has neither a direct file URL nor an id to build a fallback from
    #[error("No download URL available for workshop item '{item}'")]
    NoDownloadUrl {
        item: String,
    },

    /// The destination is already being downloaded or waits in the queue
    #[error("'{path}' is already downloading")]
    AlreadyDownloading {
        path: PathBuf,
    },

    /// Archive format not handled by the extractor
    #[error("Unsupported archive '{path}' (supported: .zip, .tar, .tar.gz, .tgz)")]
    UnsupportedArchive {
        path: PathBuf,
    },

    /// Archive could not be read
    #[error("Failed to extract '{path}': {message}")]
    Archive {
        path: PathBuf,
        message: String,
    },

    /// Preview payload is not a usable image
    #[error("Invalid preview image from '{url}': {reason}")]
    InvalidImage {
        url: String,
        reason: String,
    },

    /// Retry exhaustion with context
    #[error("Maximum retry attempts ({max_retries}) exceeded for '{url}': {last_error}")]
    MaxRetriesExceeded {
        url: String,
        max_retries: usize,
        last_error: String,
    },

    /// Configuration errors
    #[error("Invalid configuration: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
        suggestion: Option<String>,
    },

    /// Operation cancelled by user or system
    #[error("Cancelled: {reason}")]
    Cancelled {
        reason: String,
        url: Option<String>,
    },

    /// Download stopped by a pause request; the partial file is kept
    #[error("Download paused at {downloaded} bytes: '{path}'")]
    Paused {
        path: PathBuf,
        downloaded: u64,
    },
}

/// Types of file operations for error context
#[derive(Debug, Clone, PartialEq)]
pub enum FileOperation {
    Read,
    Write,
    Create,
    Delete,
    Move,
    Metadata,
    CreateDir,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Read => write!(f, "reading"),
            FileOperation::Write => write!(f, "writing"),
            FileOperation::Create => write!(f, "creating"),
            FileOperation::Delete => write!(f, "deleting"),
            FileOperation::Move => write!(f, "moving"),
            FileOperation::Metadata => write!(f, "reading metadata"),
            FileOperation::CreateDir => write!(f, "creating directory"),
        }
    }
}

/// Types of validation for error context
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationType {
    XxHash64,
    Size,
}

impl std::fmt::Display for ValidationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationType::XxHash64 => write!(f, "xxHash64"),
            ValidationType::Size => write!(f, "file size"),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkshopError>;

impl WorkshopError {
    /// Shorthand for file system errors that carry their path
    pub fn fs(path: impl Into<PathBuf>, operation: FileOperation, source: std::io::Error) -> Self {
        WorkshopError::FileSystem {
            path: path.into(),
            operation,
            source,
        }
    }

    /// Check if error is recoverable (should retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            WorkshopError::HttpRequest { source, .. } => {
                // Client errors (4xx) will not improve on retry
                source.status().map_or(true, |status| status.is_server_error() || status == 429)
            }
            WorkshopError::NetworkTimeout { .. } => true,
            WorkshopError::Api { status, .. } => {
                matches!(status, Some(s) if *s >= 500 || *s == 429)
            }
            WorkshopError::FileSystem { source, .. } => {
                matches!(source.kind(),
                    std::io::ErrorKind::Interrupted |
                    std::io::ErrorKind::TimedOut |
                    std::io::ErrorKind::WouldBlock
                )
            }
            WorkshopError::InvalidResponse { .. }
            | WorkshopError::MissingApiKey { .. }
            | WorkshopError::Auth { .. }
            | WorkshopError::InvalidUrl { .. }
            | WorkshopError::Json { .. }
            | WorkshopError::ValidationFailed { .. }
            | WorkshopError::SizeMismatch { .. }
            | WorkshopError::NoDownloadUrl { .. }
            | WorkshopError::AlreadyDownloading { .. }
            | WorkshopError::UnsupportedArchive { .. }
            | WorkshopError::Archive { .. }
            | WorkshopError::InvalidImage { .. }
            | WorkshopError::MaxRetriesExceeded { .. }
            | WorkshopError::Configuration { .. }
            | WorkshopError::Cancelled { .. }
            | WorkshopError::Paused { .. } => false,
        }
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            WorkshopError::HttpRequest { .. } => "http_request",
            WorkshopError::NetworkTimeout { .. } => "network_timeout",
            WorkshopError::Api { .. } => "api",
            WorkshopError::InvalidResponse { .. } => "invalid_response",
            WorkshopError::MissingApiKey { .. } => "missing_api_key",
            WorkshopError::Auth { .. } => "auth",
            WorkshopError::FileSystem { .. } => "file_system",
            WorkshopError::InvalidUrl { .. } => "invalid_url",
            WorkshopError::Json { .. } => "json",
            WorkshopError::ValidationFailed { .. } => "validation_failed",
            WorkshopError::SizeMismatch { .. } => "size_mismatch",
            WorkshopError::NoDownloadUrl { .. } => "no_download_url",
            WorkshopError::AlreadyDownloading { .. } => "already_downloading",
            WorkshopError::UnsupportedArchive { .. } => "unsupported_archive",
            WorkshopError::Archive { .. } => "archive",
            WorkshopError::InvalidImage { .. } => "invalid_image",
            WorkshopError::MaxRetriesExceeded { .. } => "max_retries_exceeded",
            WorkshopError::Configuration { .. } => "configuration",
            WorkshopError::Cancelled { .. } => "cancelled",
            WorkshopError::Paused { .. } => "paused",
        }
    }

    /// Get severity level for error prioritization
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WorkshopError::Cancelled { .. }
            | WorkshopError::Paused { .. }
            | WorkshopError::AlreadyDownloading { .. } => ErrorSeverity::Low,
            WorkshopError::HttpRequest { .. }
            | WorkshopError::NetworkTimeout { .. }
            | WorkshopError::Api { .. }
            | WorkshopError::InvalidResponse { .. }
            | WorkshopError::InvalidImage { .. }
            | WorkshopError::Json { .. } => ErrorSeverity::Medium,
            WorkshopError::FileSystem { .. } => match self.io_kind() {
                Some(std::io::ErrorKind::PermissionDenied) => ErrorSeverity::Critical,
                _ => ErrorSeverity::High,
            },
            _ => ErrorSeverity::High,
        }
    }

    fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            WorkshopError::FileSystem { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// Get user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            WorkshopError::NetworkTimeout { .. } => {
                Some("Check your internet connection or try increasing the timeout value")
            }
            WorkshopError::InvalidUrl { suggestion, .. } => Some(suggestion),
            WorkshopError::MissingApiKey { .. } => {
                Some("Set STEAM_API_KEY or add api.api_key to the config file (https://steamcommunity.com/dev/apikey)")
            }
            WorkshopError::Auth { .. } => {
                Some("Check the username and password, then retry with a Steam Guard code if asked")
            }
            WorkshopError::ValidationFailed { .. } | WorkshopError::SizeMismatch { .. } => {
                Some("The file was removed; download it again")
            }
            WorkshopError::UnsupportedArchive { .. } => {
                Some("Extract the file manually or disable archive extraction")
            }
            WorkshopError::FileSystem { .. } if self.io_kind() == Some(std::io::ErrorKind::PermissionDenied) => {
                Some("Choose a directory you can write to")
            }
            WorkshopError::Configuration { suggestion, .. } => suggestion.as_deref(),
            _ => None,
        }
    }

    /// Create a detailed error report for debugging
    pub fn detailed_report(&self) -> String {
        let mut report = format!("Error: {}\n", self);
        report.push_str(&format!("Category: {}\n", self.category()));
        report.push_str(&format!("Severity: {:?}\n", self.severity()));
        report.push_str(&format!("Recoverable: {}\n", self.is_recoverable()));

        if let Some(suggestion) = self.suggestion() {
            report.push_str(&format!("Suggestion: {}\n", suggestion));
        }

        if let Some(source) = self.source() {
            report.push_str(&format!("Root cause: {}\n", source));
        }

        report
    }
}

/// Error severity levels for prioritization
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl From<reqwest::Error> for WorkshopError {
    fn from(error: reqwest::Error) -> Self {
        let url = error.url().map(|u| u.to_string()).unwrap_or_else(|| "<unknown>".to_string());

        if error.is_timeout() {
            WorkshopError::NetworkTimeout {
                url,
                duration_secs: 30,
            }
        } else {
            WorkshopError::HttpRequest {
                url,
                source: error,
            }
        }
    }
}

impl From<std::io::Error> for WorkshopError {
    fn from(error: std::io::Error) -> Self {
        WorkshopError::FileSystem {
            path: PathBuf::from("<unknown>"),
            operation: FileOperation::Read,
            source: error,
        }
    }
}

impl From<serde_json::Error> for WorkshopError {
    fn from(error: serde_json::Error) -> Self {
        WorkshopError::Json {
            context: "<unknown>".to_string(),
            source: error,
        }
    }
}

impl From<url::ParseError> for WorkshopError {
    fn from(error: url::ParseError) -> Self {
        let suggestion = match error {
            url::ParseError::EmptyHost => "URL must have a valid hostname",
            url::ParseError::InvalidPort => "Port number must be between 1 and 65535",
            url::ParseError::RelativeUrlWithoutBase => "URL must be absolute (include http:// or https://)",
            _ => "Check URL format and try again",
        }.to_string();

        WorkshopError::InvalidUrl {
            url: "<unparseable>".to_string(),
            suggestion,
        }
    }
}
