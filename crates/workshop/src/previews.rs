//! Preview image cache
//!
//! Workshop preview images are fetched once and kept on disk under a name
//! derived from the URL. Files older than a day are fetched again.

use reqwest::Client;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use xxhash_rust::xxh64::xxh64;

use crate::error::{FileOperation, Result, WorkshopError};

/// Default age below which a cached preview is served without a request
pub const FRESH_FOR: Duration = Duration::from_secs(24 * 60 * 60);
/// Default age limit for [`PreviewCache::cleanup`]
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const KNOWN_EXTENSIONS: [&str; 4] = [".png", ".gif", ".bmp", ".webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Webp,
}

/// Identify an image by its leading bytes
pub fn detect_image_format(data: &[u8]) -> Option<ImageFormat> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ImageFormat::Jpeg)
    } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(ImageFormat::Png)
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some(ImageFormat::Gif)
    } else if data.starts_with(b"BM") {
        Some(ImageFormat::Bmp)
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some(ImageFormat::Webp)
    } else {
        None
    }
}

/// `<xxh64(url) hex><ext>`, where the extension is kept for png/gif/bmp/webp URLs and `.jpg` otherwise
pub fn preview_file_name(url: &str) -> String {
    let lowered = url.to_ascii_lowercase();
    let extension = KNOWN_EXTENSIONS
        .iter()
        .find(|ext| lowered.ends_with(*ext))
        .copied()
        .unwrap_or(".jpg");
    format!("{:016x}{}", xxh64(url.as_bytes(), 0), extension)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewStats {
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
    pub active_requests: usize,
}

pub struct PreviewCache {
    dir: PathBuf,
    client: Client,
    fresh_for: Duration,
    /// One lock per URL being loaded
    loading: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    active_requests: AtomicUsize,
    cancel: Mutex<CancellationToken>,
}

/// Decrements the active request counter when dropped
struct ActiveRequest<'a>(&'a AtomicUsize);

impl<'a> ActiveRequest<'a> {
    fn start(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveRequest<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PreviewCache {
    pub fn open(dir: impl Into<PathBuf>, client: Client) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| WorkshopError::fs(&dir, FileOperation::CreateDir, e))?;

        Ok(Self {
            dir,
            client,
            fresh_for: FRESH_FOR,
            loading: Mutex::new(HashMap::new()),
            active_requests: AtomicUsize::new(0),
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    /// Override how long a cached preview counts as fresh
    pub fn with_fresh_for(mut self, fresh_for: Duration) -> Self {
        self.fresh_for = fresh_for;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cache_path(&self, url: &str) -> PathBuf {
        self.dir.join(preview_file_name(url))
    }

    /// Local path of the preview at `url`, downloading it when not cached
    pub async fn load(&self, url: &str) -> Result<PathBuf> {
        if url.trim().is_empty() {
            return Err(WorkshopError::InvalidUrl {
                url: url.to_string(),
                suggestion: "preview URL is empty".to_string(),
            });
        }

        let path = self.cache_path(url);
        if self.is_fresh(&path).await {
            return Ok(path);
        }

        let url_lock = self.url_lock(url);
        let result = {
            let _guard = url_lock.lock().await;
            // Another caller may have stored it while we waited
            if self.is_fresh(&path).await {
                Ok(path)
            } else {
                self.fetch_into(url, path).await
            }
        };

        self.release_url_lock(url, &url_lock);
        result
    }

    async fn fetch_into(&self, url: &str, path: PathBuf) -> Result<PathBuf> {
        let token = self.current_token();
        let _active = ActiveRequest::start(&self.active_requests);

        let data = tokio::select! {
            _ = token.cancelled() => {
                return Err(WorkshopError::Cancelled {
                    reason: "preview loading cancelled".to_string(),
                    url: Some(url.to_string()),
                });
            }
            fetched = self.fetch(url) => fetched?,
        };

        fs::write(&path, &data)
            .await
            .map_err(|e| WorkshopError::fs(&path, FileOperation::Write, e))?;
        debug!("Cached preview {} ({} bytes)", path.display(), data.len());
        Ok(path)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching preview: {}", url);
        let response = self.client.get(url).send().await.map_err(|e| WorkshopError::HttpRequest {
            url: url.to_string(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkshopError::Api {
                endpoint: url.to_string(),
                status: Some(status.as_u16()),
                message: format!("preview request failed with {}", status),
            });
        }

        let data = response.bytes().await.map_err(|e| WorkshopError::HttpRequest {
            url: url.to_string(),
            source: e,
        })?;

        if data.is_empty() {
            return Err(WorkshopError::InvalidImage {
                url: url.to_string(),
                reason: "empty".to_string(),
            });
        }
        if detect_image_format(&data).is_none() {
            return Err(WorkshopError::InvalidImage {
                url: url.to_string(),
                reason: "unrecognized format".to_string(),
            });
        }

        Ok(data.to_vec())
    }

    /// Fresh files are kept; stale ones are deleted
    async fn is_fresh(&self, path: &Path) -> bool {
        let Ok(metadata) = fs::metadata(path).await else {
            return false;
        };
        if file_age(&metadata) < self.fresh_for {
            return true;
        }
        if let Err(e) = fs::remove_file(path).await {
            warn!("Could not remove stale preview {}: {}", path.display(), e);
        }
        false
    }

    fn url_lock(&self, url: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut loading = self.loading.lock().unwrap_or_else(|p| p.into_inner());
        loading.entry(url.to_string()).or_default().clone()
    }

    fn release_url_lock(&self, url: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut loading = self.loading.lock().unwrap_or_else(|p| p.into_inner());
        // Only the map and this caller still hold it
        if Arc::strong_count(lock) <= 2 {
            loading.remove(url);
        }
    }

    fn current_token(&self) -> CancellationToken {
        self.cancel.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Abort in-flight loads; later loads are unaffected
    pub fn cancel_all(&self) {
        let mut token = self.cancel.lock().unwrap_or_else(|p| p.into_inner());
        token.cancel();
        *token = CancellationToken::new();
    }

    /// Delete previews older than `max_age`, returning how many were removed
    pub async fn cleanup(&self, max_age: Duration) -> Result<usize> {
        let mut removed = 0;
        for (path, metadata) in self.files().await? {
            if file_age(&metadata) > max_age {
                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Could not remove old preview {}: {}", path.display(), e),
                }
            }
        }
        debug!("Removed {} old previews", removed);
        Ok(removed)
    }

    /// Cancel everything and delete every cached preview
    pub async fn clear(&self) -> Result<usize> {
        self.cancel_all();
        let mut removed = 0;
        for (path, _) in self.files().await? {
            fs::remove_file(&path)
                .await
                .map_err(|e| WorkshopError::fs(&path, FileOperation::Delete, e))?;
            removed += 1;
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<PreviewStats> {
        let files = self.files().await?;
        let total_size_bytes: u64 = files.iter().map(|(_, m)| m.len()).sum();
        Ok(PreviewStats {
            total_files: files.len(),
            total_size_bytes,
            total_size_mb: total_size_bytes as f64 / (1024.0 * 1024.0),
            active_requests: self.active_requests.load(Ordering::SeqCst),
        })
    }

    async fn files(&self) -> Result<Vec<(PathBuf, std::fs::Metadata)>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| WorkshopError::fs(&self.dir, FileOperation::Read, e))?;
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkshopError::fs(&self.dir, FileOperation::Read, e))?
        {
            if let Ok(metadata) = entry.metadata().await {
                if metadata.is_file() {
                    files.push((entry.path(), metadata));
                }
            }
        }
        Ok(files)
    }
}

fn file_age(metadata: &std::fs::Metadata) -> Duration {
    metadata
        .modified()
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .unwrap_or(Duration::ZERO)
}
