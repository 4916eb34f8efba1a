//! Concurrent download queue for workshop items
//!
//! The manager owns a bounded set of active downloads keyed by destination
//! path and a FIFO queue for the rest. Each active download runs in its own
//! tokio task; when one ends, the next queued job takes its slot.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::files::{extraction_dir, item_filename, part_path, remove_if_exists};
use super::http::{DownloadControl, HttpClient};
use super::metrics::DownloadMetrics;
use super::progress::{ProgressCallback, ProgressEvent};
use super::validation::FileValidation;
use crate::archive::{extract_archive, is_archive};
use crate::config::{DEFAULT_FALLBACK_DOWNLOAD_BASE, DownloadSettings};
use crate::error::{Result, WorkshopError};
use crate::steam::api::{SteamApi, resolve_download_url};
use crate::steam::models::PublishedFile;

/// What `start_download` did with the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started(PathBuf),
    Queued(PathBuf),
}

impl StartOutcome {
    pub fn path(&self) -> &Path {
        match self {
            StartOutcome::Started(path) | StartOutcome::Queued(path) => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManagerStats {
    pub active: usize,
    pub queued: usize,
    pub paused: usize,
    pub max_concurrent: usize,
    pub default_dir: PathBuf,
}

#[derive(Debug, Clone)]
struct Job {
    item: PublishedFile,
    url: String,
    dest: PathBuf,
}

struct ActiveDownload {
    job: Job,
    control: DownloadControl,
}

struct State {
    active: HashMap<PathBuf, ActiveDownload>,
    queue: VecDeque<Job>,
    paused: HashMap<PathBuf, Job>,
    max_concurrent: usize,
}

impl State {
    fn is_idle(&self) -> bool {
        self.active.is_empty() && self.queue.is_empty()
    }

    fn is_queued(&self, path: &Path) -> bool {
        self.queue.iter().any(|job| job.dest == path)
    }
}

struct Inner {
    settings: DownloadSettings,
    http: HttpClient,
    api: Option<Arc<SteamApi>>,
    state: Mutex<State>,
    events: RwLock<Option<ProgressCallback>>,
    metrics: Arc<DownloadMetrics>,
    idle: Notify,
}

/// Download manager handle; clones share the same queue
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

impl DownloadManager {
    /// Items without a `file_url` fall back to `settings.fallback_download_base`,
    /// or to the API client's base when the settings keep the default.
    pub fn new(settings: DownloadSettings, api: Option<Arc<SteamApi>>) -> Result<Self> {
        let http = HttpClient::from_settings(&settings)?;
        let max_concurrent = settings.max_concurrent_downloads.max(1);

        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                http,
                api,
                state: Mutex::new(State {
                    active: HashMap::new(),
                    queue: VecDeque::new(),
                    paused: HashMap::new(),
                    max_concurrent,
                }),
                events: RwLock::new(None),
                metrics: Arc::new(DownloadMetrics::default()),
                idle: Notify::new(),
            }),
        })
    }

    pub fn with_progress(self, callback: ProgressCallback) -> Self {
        self.set_progress_callback(Some(callback));
        self
    }

    pub fn set_progress_callback(&self, callback: Option<ProgressCallback>) {
        if let Ok(mut events) = self.inner.events.write() {
            *events = callback;
        }
    }

    pub fn metrics(&self) -> Arc<DownloadMetrics> {
        self.inner.metrics.clone()
    }

    /// Start or queue the download of `item` into `dir` (the default directory when `None`)
    pub async fn start_download(&self, item: &PublishedFile, dir: Option<&Path>) -> Result<StartOutcome> {
        let url = match self.inner.resolve_url(item) {
            Ok(url) => url,
            Err(e) => {
                self.inner.emit(ProgressEvent::Failed {
                    path: PathBuf::new(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let dir = dir.map(Path::to_path_buf).unwrap_or_else(|| self.inner.settings.default_directory.clone());
        let dest = dir.join(item_filename(item));
        let job = Job {
            item: item.clone(),
            url,
            dest: dest.clone(),
        };

        let outcome = {
            let mut state = self.inner.state();
            if state.active.contains_key(&dest) || state.is_queued(&dest) {
                None
            } else {
                // A fresh start replaces a paused entry for the same file
                state.paused.remove(&dest);
                if state.active.len() >= state.max_concurrent {
                    state.queue.push_back(job);
                    Some(StartOutcome::Queued(dest.clone()))
                } else {
                    self.inner.launch(&mut state, job);
                    Some(StartOutcome::Started(dest.clone()))
                }
            }
        };

        match outcome {
            None => {
                self.inner.emit(ProgressEvent::Failed {
                    path: dest.clone(),
                    error: "already downloading".to_string(),
                });
                Err(WorkshopError::AlreadyDownloading { path: dest })
            }
            Some(StartOutcome::Queued(path)) => {
                info!("Queued download: {}", path.display());
                self.inner.emit(ProgressEvent::Queued { path: path.clone() });
                Ok(StartOutcome::Queued(path))
            }
            Some(started) => Ok(started),
        }
    }

    /// Cancel an active, queued or paused download. Partial data is deleted.
    pub async fn cancel_download(&self, path: &Path) -> bool {
        enum Found {
            Active,
            Queued,
            Paused,
        }

        let found = {
            let mut state = self.inner.state();
            let was_paused = state.paused.remove(path).is_some();
            if let Some(active) = state.active.get(path) {
                active.control.cancel();
                Some(Found::Active)
            } else if let Some(pos) = state.queue.iter().position(|job| job.dest == path) {
                state.queue.remove(pos);
                Some(Found::Queued)
            } else if was_paused {
                Some(Found::Paused)
            } else {
                None
            }
        };

        if matches!(found, Some(Found::Paused)) {
            let part = part_path(path);
            if let Err(e) = remove_if_exists(&part).await {
                warn!("Could not remove partial file {}: {}", part.display(), e);
            }
        }

        match found {
            // The task reports its own cancellation
            Some(Found::Active) => true,
            Some(Found::Queued) | Some(Found::Paused) => {
                debug!("Cancelled pending download: {}", path.display());
                self.inner.emit(ProgressEvent::Cancelled {
                    path: path.to_path_buf(),
                });
                true
            }
            None => false,
        }
    }

    /// Cancel every active download and drop the queue
    pub fn cancel_all(&self) {
        let dropped: Vec<PathBuf> = {
            let mut state = self.inner.state();
            for active in state.active.values() {
                active.control.cancel();
            }
            state.queue.drain(..).map(|job| job.dest).collect()
        };

        for path in dropped {
            self.inner.emit(ProgressEvent::Cancelled { path });
        }
    }

    /// Stop a download but keep its partial file so it can be resumed
    pub fn pause_download(&self, path: &Path) -> bool {
        let queued_pause = {
            let mut state = self.inner.state();
            if let Some(active) = state.active.get(path) {
                if active.control.is_stopped() {
                    return false;
                }
                active.control.pause();
                let job = active.job.clone();
                state.paused.insert(path.to_path_buf(), job);
                false
            } else if let Some(pos) = state.queue.iter().position(|job| job.dest == path) {
                match state.queue.remove(pos) {
                    Some(job) => {
                        state.paused.insert(path.to_path_buf(), job);
                        true
                    }
                    None => return false,
                }
            } else {
                return false;
            }
        };

        if queued_pause {
            self.inner.emit(ProgressEvent::Paused {
                path: path.to_path_buf(),
                downloaded: 0,
            });
        }
        true
    }

    /// Put a paused download back in line; it continues from its `.part` file
    pub fn resume_download(&self, path: &Path) -> bool {
        let queued = {
            let mut state = self.inner.state();
            let Some(job) = state.paused.remove(path) else {
                return false;
            };

            if state.active.contains_key(path) {
                // The paused task is still winding down and will start this on exit
                state.queue.push_front(job);
                true
            } else if state.active.len() >= state.max_concurrent {
                state.queue.push_back(job);
                true
            } else {
                self.inner.launch(&mut state, job);
                false
            }
        };

        if queued {
            self.inner.emit(ProgressEvent::Queued {
                path: path.to_path_buf(),
            });
        }
        true
    }

    /// Change the concurrency limit; 0 is ignored
    pub fn set_max_concurrent(&self, max: usize) {
        if max == 0 {
            return;
        }
        let mut state = self.inner.state();
        state.max_concurrent = max;
        self.inner.drain_queue(&mut state);
    }

    pub fn stats(&self) -> ManagerStats {
        let state = self.inner.state();
        ManagerStats {
            active: state.active.len(),
            queued: state.queue.len(),
            paused: state.paused.len(),
            max_concurrent: state.max_concurrent,
            default_dir: self.inner.settings.default_directory.clone(),
        }
    }

    pub fn active_downloads(&self) -> Vec<PathBuf> {
        self.inner.state().active.keys().cloned().collect()
    }

    /// True while the path is active or queued
    pub fn is_downloading(&self, path: &Path) -> bool {
        let state = self.inner.state();
        state.active.contains_key(path) || state.is_queued(path)
    }

    /// Resolve once nothing is active or queued
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.state().is_idle() {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn events(&self) -> Option<ProgressCallback> {
        self.events.read().ok().and_then(|events| events.clone())
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = self.events() {
            callback(event);
        }
    }

    /// A fallback base set in the download settings wins over the API client's
    fn resolve_url(&self, item: &PublishedFile) -> Result<String> {
        match &self.api {
            Some(api) if self.settings.fallback_download_base == DEFAULT_FALLBACK_DOWNLOAD_BASE => {
                api.resolve_download_url(item)
            }
            _ => resolve_download_url(item, &self.settings.fallback_download_base),
        }
    }

    /// Register the job as active and spawn its task. Caller holds the state lock.
    fn launch(self: &Arc<Self>, state: &mut State, job: Job) {
        let control = DownloadControl::new();
        info!("Starting download: {} -> {}", job.url, job.dest.display());

        state.active.insert(
            job.dest.clone(),
            ActiveDownload {
                job: job.clone(),
                control: control.clone(),
            },
        );

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.run_job(job, control).await;
        });
    }

    fn drain_queue(self: &Arc<Self>, state: &mut State) {
        while state.active.len() < state.max_concurrent {
            // A resumed job may wait for its previous task to exit
            let Some(pos) = state.queue.iter().position(|job| !state.active.contains_key(&job.dest)) else {
                break;
            };
            if let Some(job) = state.queue.remove(pos) {
                self.launch(state, job);
            }
        }
    }

    async fn run_job(self: Arc<Self>, job: Job, control: DownloadControl) {
        self.metrics.record_started();

        let metrics = self.metrics.clone();
        let events = self.events();
        let callback: ProgressCallback = Arc::new(move |event: ProgressEvent| {
            if matches!(event, ProgressEvent::RetryAttempt { .. }) {
                metrics.record_retry();
            }
            if let Some(cb) = &events {
                cb(event);
            }
        });

        let result = match self
            .http
            .download_with_retry(&job.url, &job.dest, &control, Some(callback), &self.settings)
            .await
        {
            Ok(size) => self.validate(&job, size).await.map(|_| size),
            Err(e) => Err(e),
        };

        match result {
            Ok(size) => {
                info!("Download completed: {} ({} bytes)", job.dest.display(), size);
                self.metrics.record_completed(size);
                self.emit(ProgressEvent::Completed {
                    path: job.dest.clone(),
                    final_path: job.dest.clone(),
                    size,
                });
                if self.settings.extract_archives && is_archive(&job.dest) {
                    self.extract(&job.dest).await;
                }
            }
            Err(WorkshopError::Paused { downloaded, .. }) => {
                self.metrics.record_cancelled();
                let still_wanted = {
                    let state = self.state();
                    state.paused.contains_key(&job.dest) || state.is_queued(&job.dest)
                };
                if still_wanted {
                    info!("Download paused at {} bytes: {}", downloaded, job.dest.display());
                    self.emit(ProgressEvent::Paused {
                        path: job.dest.clone(),
                        downloaded,
                    });
                } else {
                    // Cancelled while pausing
                    if let Err(e) = remove_if_exists(&part_path(&job.dest)).await {
                        debug!("Could not remove partial file: {}", e);
                    }
                    self.emit(ProgressEvent::Cancelled { path: job.dest.clone() });
                }
            }
            Err(WorkshopError::Cancelled { .. }) => {
                info!("Download cancelled: {}", job.dest.display());
                self.metrics.record_cancelled();
                self.emit(ProgressEvent::Cancelled { path: job.dest.clone() });
            }
            Err(e) => {
                warn!("Download failed: {}: {}", job.dest.display(), e);
                self.metrics.record_failed();
                self.emit(ProgressEvent::Failed {
                    path: job.dest.clone(),
                    error: e.to_string(),
                });
            }
        }

        self.finish(&job.dest);
    }

    /// Size check against the metadata, only when the bytes came from Steam itself
    async fn validate(&self, job: &Job, size: u64) -> Result<()> {
        let from_steam = !job.item.file_url.is_empty() && job.url == job.item.file_url;
        if !from_steam || job.item.file_size == 0 {
            return Ok(());
        }
        debug!("Validating {} ({} bytes received)", job.dest.display(), size);
        FileValidation::new()
            .with_expected_size(job.item.file_size)
            .validate_or_remove(&job.dest)
            .await
    }

    async fn extract(&self, archive: &Path) {
        let archive = archive.to_path_buf();
        let target = extraction_dir(&archive);
        let task_archive = archive.clone();

        let result = tokio::task::spawn_blocking(move || {
            extract_archive(&task_archive, &target, |done, total, name| {
                debug!("Extracting {}/{}: {}", done, total, name.unwrap_or_default());
            })
        })
        .await
        .map_err(|e| WorkshopError::Archive {
            path: archive.clone(),
            message: format!("extraction task failed: {}", e),
        })
        .and_then(|extracted| extracted);

        match result {
            Ok(summary) => self.emit(ProgressEvent::Extracted {
                path: archive,
                entries: summary.entries,
            }),
            Err(e) => {
                warn!("Extraction failed for {}: {}", archive.display(), e);
                self.emit(ProgressEvent::Failed {
                    path: archive,
                    error: e.to_string(),
                });
            }
        }
    }

    fn finish(self: &Arc<Self>, dest: &Path) {
        let idle = {
            let mut state = self.state();
            state.active.remove(dest);
            self.drain_queue(&mut state);
            state.is_idle()
        };

        if idle {
            debug!("All downloads finished");
            self.emit(ProgressEvent::AllFinished);
            self.idle.notify_waiters();
        }
    }
}
