//! Persistent key/value cache with per-entry time-to-live
//!
//! Values are stored as JSON, one file per key, so a restart keeps whatever
//! has not expired yet. The file name is a hash of the key; the key itself is
//! stored inside the file.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use xxhash_rust::xxh64::xxh64;

use crate::error::{FileOperation, Result, WorkshopError};

const CACHE_EXTENSION: &str = "cache";

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
struct CacheEntry {
    key: String,
    value: Value,
    stored_at_ms: u64,
    ttl_ms: u64,
}

impl CacheEntry {
    fn is_live(&self, now_ms: u64) -> bool {
        now_ms < self.stored_at_ms.saturating_add(self.ttl_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub total_items: usize,
    pub active_items: usize,
    pub expired_items: usize,
    pub cache_dir: PathBuf,
    pub default_ttl: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSize {
    pub memory_items: usize,
    pub disk_size_bytes: u64,
    pub disk_size_mb: f64,
}

pub struct TtlCache {
    dir: PathBuf,
    default_ttl: Duration,
    /// Disk budget enforced by `cleanup_expired`, unlimited when `None`
    max_size_bytes: Option<u64>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// File name for a key: xxh64 of the key in hex
pub fn cache_file_name(key: &str) -> String {
    format!("{:016x}.{}", xxh64(key.as_bytes(), 0), CACHE_EXTENSION)
}

impl TtlCache {
    /// Open (or create) the cache directory and load every live entry from it
    pub fn open(dir: impl Into<PathBuf>, default_ttl: Duration) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| WorkshopError::fs(&dir, FileOperation::CreateDir, e))?;

        let cache = Self {
            dir,
            default_ttl,
            max_size_bytes: None,
            entries: Mutex::new(HashMap::new()),
        };
        cache.load_from_disk()?;
        Ok(cache)
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size_bytes = Some(bytes);
        self
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // A panic while holding the lock leaves the map itself intact
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load_from_disk(&self) -> Result<()> {
        let reader = std::fs::read_dir(&self.dir)
            .map_err(|e| WorkshopError::fs(&self.dir, FileOperation::Read, e))?;
        let now = now_ms();
        let mut loaded = 0;
        let mut entries = self.lock();

        for dir_entry in reader.flatten() {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CACHE_EXTENSION) {
                continue;
            }

            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| serde_json::from_str::<CacheEntry>(&text).map_err(|e| e.to_string()));

            match parsed {
                Ok(entry) if entry.is_live(now) => {
                    entries.insert(entry.key.clone(), entry);
                    loaded += 1;
                }
                Ok(_) => remove_file_quietly(&path),
                Err(e) => {
                    warn!("Removing corrupt cache file {}: {}", path.display(), e);
                    remove_file_quietly(&path);
                }
            }
        }

        debug!("Loaded {} cache entries from {}", loaded, self.dir.display());
        Ok(())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(cache_file_name(key))
    }

    fn write_entry(&self, entry: &CacheEntry) {
        let path = self.entry_path(&entry.key);
        let result = serde_json::to_vec(entry)
            .map_err(|e| e.to_string())
            .and_then(|bytes| std::fs::write(&path, bytes).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!("Failed to persist cache entry '{}' to {}: {}", entry.key, path.display(), e);
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = {
            let mut entries = self.lock();
            let live = entries.get(key)?.is_live(now_ms());
            if !live {
                entries.remove(key);
                drop(entries);
                remove_file_quietly(&self.entry_path(key));
                debug!("Cache entry '{}' expired", key);
                return None;
            }
            entries.get(key)?.value.clone()
        };

        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!("Cache entry '{}' has an unexpected shape: {}", key, e);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, self.default_ttl)
    }

    pub fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| WorkshopError::Json {
            context: format!("cache value for '{}'", key),
            source: e,
        })?;
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            stored_at_ms: now_ms(),
            ttl_ms: ttl.as_millis() as u64,
        };

        self.write_entry(&entry);
        self.lock().insert(entry.key.clone(), entry);
        Ok(())
    }

    pub fn delete(&self, key: &str) -> bool {
        let removed = self.lock().remove(key).is_some();
        if removed {
            remove_file_quietly(&self.entry_path(key));
        }
        removed
    }

    pub fn clear(&self) {
        self.lock().clear();
        if let Ok(reader) = std::fs::read_dir(&self.dir) {
            for dir_entry in reader.flatten() {
                let path = dir_entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some(CACHE_EXTENSION) {
                    remove_file_quietly(&path);
                }
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get::<Value>(key).is_some()
    }

    pub fn stats(&self) -> CacheStats {
        let now = now_ms();
        let entries = self.lock();
        let expired_items = entries.values().filter(|e| !e.is_live(now)).count();

        CacheStats {
            total_items: entries.len(),
            active_items: entries.len() - expired_items,
            expired_items,
            cache_dir: self.dir.clone(),
            default_ttl: self.default_ttl,
        }
    }

    pub fn size(&self) -> CacheSize {
        let memory_items = self.lock().len();
        let disk_size_bytes: u64 = std::fs::read_dir(&self.dir)
            .map(|reader| {
                reader
                    .flatten()
                    .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some(CACHE_EXTENSION))
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0);

        CacheSize {
            memory_items,
            disk_size_bytes,
            disk_size_mb: disk_size_bytes as f64 / (1024.0 * 1024.0),
        }
    }

    /// Drop expired entries from memory and disk, then the oldest entries
    /// while the directory is over its size limit. Returns how many went.
    pub fn cleanup_expired(&self) -> usize {
        let now = now_ms();
        let expired: Vec<String> = {
            let mut entries = self.lock();
            let keys: Vec<String> = entries
                .iter()
                .filter(|(_, e)| !e.is_live(now))
                .map(|(k, _)| k.clone())
                .collect();
            for key in &keys {
                entries.remove(key);
            }
            keys
        };

        for key in &expired {
            remove_file_quietly(&self.entry_path(key));
        }
        if !expired.is_empty() {
            debug!("Cache cleanup removed {} entries", expired.len());
        }
        expired.len() + self.evict_over_limit()
    }

    fn evict_over_limit(&self) -> usize {
        let Some(limit) = self.max_size_bytes else {
            return 0;
        };
        let mut total = self.size().disk_size_bytes;
        if total <= limit {
            return 0;
        }

        let mut oldest: Vec<(u64, String)> = self
            .lock()
            .values()
            .map(|e| (e.stored_at_ms, e.key.clone()))
            .collect();
        oldest.sort();

        let mut evicted = 0;
        for (_, key) in oldest {
            if total <= limit {
                break;
            }
            let file_size = std::fs::metadata(self.entry_path(&key)).map(|m| m.len()).unwrap_or(0);
            if self.delete(&key) {
                total = total.saturating_sub(file_size);
                evicted += 1;
            }
        }
        debug!("Evicted {} cache entries to stay under {} bytes", evicted, limit);
        evicted
    }

    /// Cached value for `key`, or the factory's output stored under it
    pub async fn get_or_set<T, F, Fut>(&self, key: &str, ttl: Duration, factory: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.get::<T>(key) {
            debug!("Cache hit for '{}'", key);
            return Ok(hit);
        }

        debug!("Cache miss for '{}'", key);
        let value = factory().await?;
        self.set_with_ttl(key, &value, ttl)?;
        Ok(value)
    }

    /// Run the factory regardless of what is cached and store its output
    pub async fn refresh<T, F, Fut>(&self, key: &str, ttl: Duration, factory: F) -> Result<T>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let value = factory().await?;
        self.set_with_ttl(key, &value, ttl)?;
        Ok(value)
    }

    /// Delete every entry whose key contains `pattern`
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let keys: Vec<String> = self
            .lock()
            .keys()
            .filter(|k| k.contains(pattern))
            .cloned()
            .collect();

        keys.iter().filter(|k| self.delete(k)).count()
    }

    /// Run `cleanup_expired` every `interval` until `cancel` fires
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        // `interval` panics on a zero period
        let period = interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        cache.cleanup_expired();
                    }
                }
            }
            debug!("Cache cleanup task stopped");
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove cache file {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_set_get_and_persist() {
        let dir = tempdir().unwrap();
        {
            let cache = TtlCache::open(dir.path(), Duration::from_secs(60)).unwrap();
            cache.set("games/list:1", &vec![1, 2, 3]).unwrap();
            assert_eq!(cache.get::<Vec<u32>>("games/list:1"), Some(vec![1, 2, 3]));
            assert!(dir.path().join(cache_file_name("games/list:1")).exists());
        }

        let reopened = TtlCache::open(dir.path(), Duration::from_secs(60)).unwrap();
        assert_eq!(reopened.get::<Vec<u32>>("games/list:1"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_zero_ttl_is_expired_immediately() {
        let dir = tempdir().unwrap();
        let cache = TtlCache::open(dir.path(), Duration::from_secs(60)).unwrap();
        cache.set_with_ttl("gone", &"value", Duration::ZERO).unwrap();

        assert_eq!(cache.stats().expired_items, 1);
        assert_eq!(cache.get::<String>("gone"), None);
        assert!(!dir.path().join(cache_file_name("gone")).exists());
        assert_eq!(cache.stats().total_items, 0);
    }

    #[test]
    fn test_expired_and_corrupt_files_removed_on_open() {
        let dir = tempdir().unwrap();
        {
            let cache = TtlCache::open(dir.path(), Duration::from_secs(60)).unwrap();
            cache.set_with_ttl("stale", &1, Duration::ZERO).unwrap();
            cache.set("fresh", &2).unwrap();
        }
        let corrupt = dir.path().join("deadbeef.cache");
        std::fs::write(&corrupt, b"not json").unwrap();
        let unrelated = dir.path().join("notes.txt");
        std::fs::write(&unrelated, b"keep me").unwrap();

        let cache = TtlCache::open(dir.path(), Duration::from_secs(60)).unwrap();
        assert_eq!(cache.stats().total_items, 1);
        assert!(!corrupt.exists());
        assert!(unrelated.exists());
        assert!(!dir.path().join(cache_file_name("stale")).exists());
    }

    #[test]
    fn test_size_limit_evicts_oldest_entries() {
        let dir = tempdir().unwrap();
        let sizing = TtlCache::open(dir.path().join("measure"), Duration::from_secs(60)).unwrap();
        sizing.set("k0", &1).unwrap();
        let one_file = sizing.size().disk_size_bytes;

        let cache = TtlCache::open(dir.path().join("limited"), Duration::from_secs(60))
            .unwrap()
            .with_max_size(one_file * 2);
        for key in ["k1", "k2", "k3"] {
            cache.set(key, &1).unwrap();
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(cache.cleanup_expired(), 1);
        assert!(!cache.contains("k1"));
        assert!(cache.contains("k2"));
        assert!(cache.contains("k3"));
        assert!(cache.size().disk_size_bytes <= one_file * 2);

        // Already under the limit
        assert_eq!(cache.cleanup_expired(), 0);
    }

    #[test]
    fn test_wrong_type_is_a_miss() {
        let dir = tempdir().unwrap();
        let cache = TtlCache::open(dir.path(), Duration::from_secs(60)).unwrap();
        cache.set("number", &5).unwrap();
        assert_eq!(cache.get::<String>("number"), None);
        assert!(cache.contains("number"));
    }

    #[test]
    fn test_delete_clear_and_patterns() {
        let dir = tempdir().unwrap();
        let cache = TtlCache::open(dir.path(), Duration::from_secs(60)).unwrap();
        cache.set("workshop_items_4000_1_20", &1).unwrap();
        cache.set("workshop_items_4000_2_20", &2).unwrap();
        cache.set("search_games_rust", &3).unwrap();

        assert_eq!(cache.invalidate_pattern("workshop_items_4000"), 2);
        assert!(cache.delete("search_games_rust"));
        assert!(!cache.delete("search_games_rust"));

        cache.set("a", &1).unwrap();
        cache.clear();
        assert_eq!(cache.size().memory_items, 0);
        assert_eq!(cache.size().disk_size_bytes, 0);
    }

    #[test]
    fn test_cleanup_expired_counts() {
        let dir = tempdir().unwrap();
        let cache = TtlCache::open(dir.path(), Duration::from_secs(60)).unwrap();
        cache.set_with_ttl("x", &1, Duration::ZERO).unwrap();
        cache.set_with_ttl("y", &1, Duration::ZERO).unwrap();
        cache.set("z", &1).unwrap();

        assert_eq!(cache.cleanup_expired(), 2);
        let stats = cache.stats();
        assert_eq!(stats.total_items, 1);
        assert_eq!(stats.active_items, 1);
        assert!(cache.size().disk_size_bytes > 0);
    }

    #[tokio::test]
    async fn test_get_or_set_runs_factory_once() {
        let dir = tempdir().unwrap();
        let cache = TtlCache::open(dir.path(), Duration::from_secs(60)).unwrap();
        let calls = std::sync::atomic::AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Vec<String> = cache
                .get_or_set("k", Duration::from_secs(60), || async {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(vec!["v".to_string()])
                })
                .await
                .unwrap();
            assert_eq!(value, vec!["v".to_string()]);
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        let refreshed: u32 = cache
            .refresh("k2", Duration::from_secs(60), || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(refreshed, 7);
        assert_eq!(cache.get::<u32>("k2"), Some(7));
    }

    #[tokio::test]
    async fn test_factory_error_stores_nothing() {
        let dir = tempdir().unwrap();
        let cache = TtlCache::open(dir.path(), Duration::from_secs(60)).unwrap();

        let result: Result<u32> = cache
            .get_or_set("k", Duration::from_secs(60), || async {
                Err(WorkshopError::Auth { message: "nope".to_string() })
            })
            .await;
        assert!(result.is_err());
        assert!(!cache.contains("k"));
    }

    #[tokio::test]
    async fn test_background_cleanup_stops_on_cancel() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(TtlCache::open(dir.path(), Duration::from_secs(60)).unwrap());
        cache.set_with_ttl("old", &1, Duration::ZERO).unwrap();

        let token = CancellationToken::new();
        let handle = cache.spawn_cleanup(Duration::from_millis(10), token.clone());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.stats().total_items, 0);

        token.cancel();
        handle.await.unwrap();
    }
}
