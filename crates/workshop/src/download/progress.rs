//! Progress tracking and reporting for downloads

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::format::{format_download_speed, format_file_size};

/// Progress callback for download operations
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Events emitted by the HTTP client and the download manager.
///
/// Downloads are identified by their destination path.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Queued {
        path: PathBuf,
    },
    Started {
        path: PathBuf,
        url: String,
        /// 0 when the server did not send a length
        total: u64,
    },
    Progress {
        path: PathBuf,
        downloaded: u64,
        total: u64,
        percentage: u8,
    },
    Speed {
        path: PathBuf,
        bytes_per_sec: f64,
    },
    RetryAttempt {
        url: String,
        attempt: usize,
        max_attempts: usize,
    },
    Completed {
        path: PathBuf,
        final_path: PathBuf,
        size: u64,
    },
    Failed {
        /// Empty when the failure happened before a destination was known
        path: PathBuf,
        error: String,
    },
    Cancelled {
        path: PathBuf,
    },
    Paused {
        path: PathBuf,
        downloaded: u64,
    },
    Extracted {
        path: PathBuf,
        entries: usize,
    },
    AllFinished,
}

/// Whole-number percentage, 0 when the total is unknown
pub fn percentage(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((downloaded.min(total) as u128 * 100) / total as u128) as u8
}

/// Trait for progress reporting with more granular control
pub trait ProgressReporter: Send + Sync {
    fn on_queued(&self, _path: &Path) {}
    fn on_started(&self, _path: &Path, _url: &str, _total: u64) {}
    fn on_progress(&self, _path: &Path, _downloaded: u64, _total: u64, _percentage: u8) {}
    fn on_speed(&self, _path: &Path, _bytes_per_sec: f64) {}
    fn on_retry_attempt(&self, _url: &str, _attempt: usize, _max_attempts: usize) {}
    fn on_completed(&self, _path: &Path, _final_path: &Path, _size: u64) {}
    fn on_failed(&self, _path: &Path, _error: &str) {}
    fn on_cancelled(&self, _path: &Path) {}
    fn on_paused(&self, _path: &Path, _downloaded: u64) {}
    fn on_extracted(&self, _path: &Path, _entries: usize) {}
    fn on_all_finished(&self) {}
}

/// Extension trait to convert ProgressReporter to ProgressCallback
pub trait IntoProgressCallback {
    fn into_callback(self) -> ProgressCallback;
}

impl<T: ProgressReporter + 'static> IntoProgressCallback for T {
    fn into_callback(self) -> ProgressCallback {
        Arc::new(move |event| match event {
            ProgressEvent::Queued { path } => self.on_queued(&path),
            ProgressEvent::Started { path, url, total } => self.on_started(&path, &url, total),
            ProgressEvent::Progress { path, downloaded, total, percentage } => {
                self.on_progress(&path, downloaded, total, percentage)
            }
            ProgressEvent::Speed { path, bytes_per_sec } => self.on_speed(&path, bytes_per_sec),
            ProgressEvent::RetryAttempt { url, attempt, max_attempts } => {
                self.on_retry_attempt(&url, attempt, max_attempts)
            }
            ProgressEvent::Completed { path, final_path, size } => self.on_completed(&path, &final_path, size),
            ProgressEvent::Failed { path, error } => self.on_failed(&path, &error),
            ProgressEvent::Cancelled { path } => self.on_cancelled(&path),
            ProgressEvent::Paused { path, downloaded } => self.on_paused(&path, downloaded),
            ProgressEvent::Extracted { path, entries } => self.on_extracted(&path, entries),
            ProgressEvent::AllFinished => self.on_all_finished(),
        })
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Simple console progress reporter implementation
#[derive(Debug, Default)]
pub struct ConsoleProgressReporter {
    pub verbose: bool,
}

impl ConsoleProgressReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn on_queued(&self, path: &Path) {
        println!("Queued: {}", display_name(path));
    }

    fn on_started(&self, path: &Path, url: &str, total: u64) {
        if total > 0 {
            println!("Downloading {} ({})", display_name(path), format_file_size(total));
        } else {
            println!("Downloading {}", display_name(path));
        }
        if self.verbose {
            println!("  from {}", url);
        }
    }

    fn on_progress(&self, path: &Path, downloaded: u64, total: u64, percentage: u8) {
        if self.verbose {
            if total > 0 {
                println!(
                    "  {}: {}% ({} / {})",
                    display_name(path),
                    percentage,
                    format_file_size(downloaded),
                    format_file_size(total)
                );
            } else {
                println!("  {}: {}", display_name(path), format_file_size(downloaded));
            }
        }
    }

    fn on_speed(&self, path: &Path, bytes_per_sec: f64) {
        if self.verbose {
            println!("  {}: {}", display_name(path), format_download_speed(bytes_per_sec));
        }
    }

    fn on_retry_attempt(&self, url: &str, attempt: usize, max_attempts: usize) {
        println!("Retry {}/{} for: {}", attempt, max_attempts, url);
    }

    fn on_completed(&self, _path: &Path, final_path: &Path, size: u64) {
        println!("Done: {} ({})", final_path.display(), format_file_size(size));
    }

    fn on_failed(&self, path: &Path, error: &str) {
        if path.as_os_str().is_empty() {
            eprintln!("Download failed: {}", error);
        } else {
            eprintln!("Download failed: {}: {}", display_name(path), error);
        }
    }

    fn on_cancelled(&self, path: &Path) {
        println!("Cancelled: {}", display_name(path));
    }

    fn on_paused(&self, path: &Path, downloaded: u64) {
        println!("Paused: {} at {}", display_name(path), format_file_size(downloaded));
    }

    fn on_extracted(&self, path: &Path, entries: usize) {
        println!("Extracted {} entries from {}", entries, display_name(path));
    }

    fn on_all_finished(&self) {
        if self.verbose {
            println!("All downloads finished");
        }
    }
}

/// Reporter that ignores every event
#[derive(Debug, Default)]
pub struct NullProgressReporter;

impl ProgressReporter for NullProgressReporter {}

/// Fans each event out to several reporters, in insertion order
#[derive(Default)]
pub struct CompositeProgressReporter {
    reporters: Vec<Box<dyn ProgressReporter>>,
}

impl std::fmt::Debug for CompositeProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeProgressReporter")
            .field("reporters", &self.reporters.len())
            .finish()
    }
}

impl CompositeProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R: ProgressReporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }

    fn each(&self, f: impl Fn(&dyn ProgressReporter)) {
        for reporter in &self.reporters {
            f(reporter.as_ref());
        }
    }
}

impl ProgressReporter for CompositeProgressReporter {
    fn on_queued(&self, path: &Path) {
        self.each(|r| r.on_queued(path));
    }
    fn on_started(&self, path: &Path, url: &str, total: u64) {
        self.each(|r| r.on_started(path, url, total));
    }
    fn on_progress(&self, path: &Path, downloaded: u64, total: u64, percentage: u8) {
        self.each(|r| r.on_progress(path, downloaded, total, percentage));
    }
    fn on_speed(&self, path: &Path, bytes_per_sec: f64) {
        self.each(|r| r.on_speed(path, bytes_per_sec));
    }
    fn on_retry_attempt(&self, url: &str, attempt: usize, max_attempts: usize) {
        self.each(|r| r.on_retry_attempt(url, attempt, max_attempts));
    }
    fn on_completed(&self, path: &Path, final_path: &Path, size: u64) {
        self.each(|r| r.on_completed(path, final_path, size));
    }
    fn on_failed(&self, path: &Path, error: &str) {
        self.each(|r| r.on_failed(path, error));
    }
    fn on_cancelled(&self, path: &Path) {
        self.each(|r| r.on_cancelled(path));
    }
    fn on_paused(&self, path: &Path, downloaded: u64) {
        self.each(|r| r.on_paused(path, downloaded));
    }
    fn on_extracted(&self, path: &Path, entries: usize) {
        self.each(|r| r.on_extracted(path, entries));
    }
    fn on_all_finished(&self) {
        self.each(|r| r.on_all_finished());
    }
}
