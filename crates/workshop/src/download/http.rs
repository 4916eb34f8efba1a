//! Streaming HTTP downloads
//!
//! Downloads stream into a `.part` file next to the destination. The file is
//! renamed into place only once the body is complete, so the destination
//! either exists in full or not at all. A leftover `.part` file is resumed
//! with a `Range` request when the server supports it.

use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::files::{atomic_rename, ensure_parent_dir, part_path, remove_if_exists};
use super::progress::{ProgressCallback, ProgressEvent, percentage};
use crate::config::DownloadSettings;
use crate::error::{FileOperation, Result, WorkshopError};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);
const SPEED_INTERVAL: Duration = Duration::from_secs(1);

/// Why a download was stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Abandon the download and delete the partial file
    Cancel,
    /// Stop but keep the partial file for a later resume
    Pause,
}

/// Stop handle shared between a download task and its owner
#[derive(Debug, Clone, Default)]
pub struct DownloadControl {
    token: CancellationToken,
    reason: Arc<Mutex<Option<CancelReason>>>,
}

impl DownloadControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.stop(CancelReason::Cancel);
    }

    pub fn pause(&self) {
        self.stop(CancelReason::Pause);
    }

    /// The first reason wins; a pause after a cancel stays a cancel
    fn stop(&self, reason: CancelReason) {
        if let Ok(mut current) = self.reason.lock() {
            current.get_or_insert(reason);
        }
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.lock().ok().and_then(|r| *r)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Error describing the stop, used by every exit path
    fn stop_error(&self, url: &str, dest_path: &Path, downloaded: u64) -> WorkshopError {
        match self.reason() {
            Some(CancelReason::Pause) => WorkshopError::Paused {
                path: dest_path.to_path_buf(),
                downloaded,
            },
            _ => WorkshopError::Cancelled {
                reason: "download cancelled".to_string(),
                url: Some(url.to_string()),
            },
        }
    }
}

/// HTTP client with integrated download functionality
pub struct HttpClient {
    client: Client,
    allow_resume: bool,
    /// Longest wait for the response head or for the next body chunk
    stall_timeout: Duration,
    /// Write buffer in front of the `.part` file
    buffer_size: usize,
}

impl HttpClient {
    pub fn from_settings(settings: &DownloadSettings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.timeout())
            .user_agent(&settings.user_agent)
            .build()
            .map_err(|e| WorkshopError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
                field: Some("downloads".to_string()),
                suggestion: None,
            })?;

        Ok(Self {
            client,
            allow_resume: settings.allow_resume,
            stall_timeout: settings.timeout(),
            buffer_size: settings.chunk_size.max(1),
        })
    }

    /// Send the GET, with a `Range` header when `start_byte > 0`. `None` when stopped first.
    async fn send(&self, url: &str, start_byte: u64, control: &DownloadControl) -> Result<Option<Response>> {
        let mut request = self.client.get(url);
        if start_byte > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={}-", start_byte));
        }

        tokio::select! {
            _ = control.token().cancelled() => Ok(None),
            sent = tokio::time::timeout(self.stall_timeout, request.send()) => sent
                .map_err(|_| self.stalled(url))?
                .map(Some)
                .map_err(|e| WorkshopError::HttpRequest {
                    url: url.to_string(),
                    source: e,
                }),
        }
    }

    /// Stream `url` into `dest_path`, returning the final size in bytes
    pub async fn download_to_file(
        &self,
        url: &str,
        dest_path: &Path,
        control: &DownloadControl,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<u64> {
        debug!("Stream downloading: {} to {}", url, dest_path.display());
        ensure_parent_dir(dest_path).await?;

        let temp_path = part_path(dest_path);
        if control.is_stopped() {
            let kept = fs::metadata(&temp_path).await.map(|m| m.len()).unwrap_or(0);
            return Err(self.finish_stopped(control, url, dest_path, kept).await);
        }

        let mut start_byte = if self.allow_resume && temp_path.exists() {
            let size = fs::metadata(&temp_path)
                .await
                .map_err(|e| WorkshopError::fs(&temp_path, FileOperation::Metadata, e))?
                .len();
            debug!("Found partial file, resuming from byte {}", size);
            size
        } else {
            0
        };

        let mut response = match self.send(url, start_byte, control).await? {
            Some(response) => response,
            None => return Err(self.finish_stopped(control, url, dest_path, start_byte).await),
        };

        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE && start_byte > 0 {
            // The partial file does not match the remote file any more
            debug!("Range {}- rejected, discarding partial file and restarting", start_byte);
            remove_if_exists(&temp_path).await?;
            start_byte = 0;
            response = match self.send(url, 0, control).await? {
                Some(response) => response,
                None => return Err(self.finish_stopped(control, url, dest_path, 0).await),
            };
        }
        let response = response.error_for_status().map_err(|e| WorkshopError::HttpRequest {
            url: url.to_string(),
            source: e,
        })?;

        if start_byte > 0 && response.status() != StatusCode::PARTIAL_CONTENT {
            debug!("Server ignored the range request, restarting from zero");
            start_byte = 0;
        }

        let content_length = response.content_length().unwrap_or(0);
        let total = if content_length > 0 { start_byte + content_length } else { 0 };
        debug!("Content length: {} bytes, total size: {}", content_length, total);

        emit(&progress_callback, || ProgressEvent::Started {
            path: dest_path.to_path_buf(),
            url: url.to_string(),
            total,
        });

        let file = if start_byte > 0 {
            fs::OpenOptions::new()
                .append(true)
                .open(&temp_path)
                .await
                .map_err(|e| WorkshopError::fs(&temp_path, FileOperation::Write, e))?
        } else {
            fs::File::create(&temp_path)
                .await
                .map_err(|e| WorkshopError::fs(&temp_path, FileOperation::Create, e))?
        };
        let mut file = BufWriter::with_capacity(self.buffer_size, file);

        let mut stream = response.bytes_stream();
        let mut downloaded = start_byte;
        let mut last_progress = Instant::now();
        let mut speed_window_start = Instant::now();
        let mut speed_window_bytes = 0u64;

        loop {
            let next = tokio::select! {
                _ = control.token().cancelled() => None,
                chunk = tokio::time::timeout(self.stall_timeout, stream.next()) => {
                    Some(chunk.map_err(|_| self.stalled(url))?)
                }
            };

            let chunk = match next {
                None => {
                    file.flush().await.ok();
                    drop(file);
                    return Err(self.finish_stopped(control, url, dest_path, downloaded).await);
                }
                Some(None) => break,
                Some(Some(chunk)) => chunk.map_err(|e| WorkshopError::HttpRequest {
                    url: url.to_string(),
                    source: e,
                })?,
            };

            file.write_all(&chunk)
                .await
                .map_err(|e| WorkshopError::fs(&temp_path, FileOperation::Write, e))?;
            downloaded += chunk.len() as u64;
            speed_window_bytes += chunk.len() as u64;

            if last_progress.elapsed() >= PROGRESS_INTERVAL {
                emit(&progress_callback, || ProgressEvent::Progress {
                    path: dest_path.to_path_buf(),
                    downloaded,
                    total,
                    percentage: percentage(downloaded, total),
                });
                last_progress = Instant::now();
            }

            let window = speed_window_start.elapsed();
            if window >= SPEED_INTERVAL {
                let bytes_per_sec = speed_window_bytes as f64 / window.as_secs_f64();
                emit(&progress_callback, || ProgressEvent::Speed {
                    path: dest_path.to_path_buf(),
                    bytes_per_sec,
                });
                speed_window_start = Instant::now();
                speed_window_bytes = 0;
            }
        }

        // The last chunk always reports, whatever the throttle says
        emit(&progress_callback, || ProgressEvent::Progress {
            path: dest_path.to_path_buf(),
            downloaded,
            total,
            percentage: if total > 0 { percentage(downloaded, total) } else { 100 },
        });

        file.flush()
            .await
            .map_err(|e| WorkshopError::fs(&temp_path, FileOperation::Write, e))?;
        file.get_ref()
            .sync_all()
            .await
            .map_err(|e| WorkshopError::fs(&temp_path, FileOperation::Write, e))?;
        drop(file);

        atomic_rename(&temp_path, dest_path).await?;

        debug!("Stream download completed: {} bytes", downloaded);
        Ok(downloaded)
    }

    fn stalled(&self, url: &str) -> WorkshopError {
        WorkshopError::NetworkTimeout {
            url: url.to_string(),
            duration_secs: self.stall_timeout.as_secs(),
        }
    }

    /// Clean up after a stop request and build the matching error
    async fn finish_stopped(
        &self,
        control: &DownloadControl,
        url: &str,
        dest_path: &Path,
        downloaded: u64,
    ) -> WorkshopError {
        if control.reason() != Some(CancelReason::Pause) {
            if let Err(e) = remove_if_exists(&part_path(dest_path)).await {
                debug!("Could not remove partial file: {}", e);
            }
        }
        debug!("Download of {} stopped at {} bytes ({:?})", url, downloaded, control.reason());
        control.stop_error(url, dest_path, downloaded)
    }

    /// [`download_to_file`](Self::download_to_file) with exponential backoff on recoverable errors
    pub async fn download_with_retry(
        &self,
        url: &str,
        dest_path: &Path,
        control: &DownloadControl,
        progress_callback: Option<ProgressCallback>,
        settings: &DownloadSettings,
    ) -> Result<u64> {
        retry_with_backoff(
            || self.download_to_file(url, dest_path, control, progress_callback.clone()),
            settings,
            progress_callback.clone(),
            control.token(),
            url,
        )
        .await
    }
}

fn emit(callback: &Option<ProgressCallback>, event: impl FnOnce() -> ProgressEvent) {
    if let Some(cb) = callback {
        cb(event());
    }
}

/// Run `operation` until it succeeds, fails with an unrecoverable error, or
/// `settings.max_retries` retries are used up. Waiting between attempts ends
/// early when `cancel` fires.
pub async fn retry_with_backoff<F, T, Fut>(
    mut operation: F,
    settings: &DownloadSettings,
    progress_callback: Option<ProgressCallback>,
    cancel: &CancellationToken,
    url: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..=settings.max_retries {
        if attempt > 0 {
            let delay = settings.retry_delay(attempt - 1);
            debug!("Retry attempt {} for {} after {:?} delay", attempt, url, delay);

            emit(&progress_callback, || ProgressEvent::RetryAttempt {
                url: url.to_string(),
                attempt,
                max_attempts: settings.max_retries,
            });

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_recoverable() {
                    debug!("Error is not recoverable, failing immediately: {}", e);
                    return Err(e);
                }
                debug!("Recoverable error on attempt {}: {}", attempt + 1, e);
                last_error = Some(e);
            }
        }
    }

    let last_error = last_error.map(|e| e.to_string()).unwrap_or_default();
    Err(WorkshopError::MaxRetriesExceeded {
        url: url.to_string(),
        max_retries: settings.max_retries,
        last_error,
    })
}
