//! Steam Workshop Library
//!
//! This library browses and downloads Steam Workshop content. It talks to the
//! Steam Web API, logs in to Steam Community, caches API results and preview
//! images on disk, and runs a queue of resumable downloads.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use workshop::{
//!     AppConfig, DownloadManager, ProgressEvent, SteamApi, config::default_config_path,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> workshop::Result<()> {
//! let config = AppConfig::load_with_env(&default_config_path())?;
//! let api = Arc::new(SteamApi::new(config.api.clone())?);
//!
//! let details = api.get_published_file_details(&["2503622437".to_string()]).await?;
//!
//! let manager = DownloadManager::new(config.downloads.clone(), Some(api.clone()))?
//!     .with_progress(Arc::new(|event: ProgressEvent| {
//!         if let ProgressEvent::Completed { final_path, size, .. } = event {
//!             println!("Saved {} ({} bytes)", final_path.display(), size);
//!         }
//!     }));
//!
//! for item in &details.files {
//!     manager.start_download(item, None).await?;
//! }
//! manager.wait_idle().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Workshop browsing**: item details, ranked workshop pages and a built-in game catalogue
//! - **Steam login**: RSA-encrypted credentials, Steam Guard and captcha flows, saved sessions
//! - **Caching**: TTL cache for API results and a preview image cache
//! - **Downloads**: bounded concurrency, FIFO queue, pause/resume, retry with backoff
//! - **Archives**: optional extraction of finished .zip and .tar(.gz) downloads

pub mod archive;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod format;
pub mod loaders;
pub mod logging;
pub mod previews;
pub mod steam;

// Re-export commonly used types for convenience
pub use cache::TtlCache;
pub use config::{AppConfig, ApiConfig, CacheSettings, DownloadSettings};
pub use download::{
    ConsoleProgressReporter, DownloadManager, IntoProgressCallback, ProgressCallback, ProgressEvent, StartOutcome,
};
pub use error::{Result, WorkshopError};
pub use loaders::{CacheTtls, WorkshopService, WorkshopSource};
pub use previews::PreviewCache;
pub use steam::{PublishedFile, SteamApi};
