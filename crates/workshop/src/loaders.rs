//! Cached, cancellable data loads for the front end
//!
//! Every load goes through the TTL cache first. A load whose token is
//! cancelled returns [`WorkshopError::Cancelled`] and leaves the cache as it was.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::TtlCache;
use crate::catalog::{self, MIN_QUERY_LEN};
use crate::config::CacheSettings;
use crate::error::{Result, WorkshopError};
use crate::steam::api::SteamApi;
use crate::steam::models::{GameInfo, ItemSummary, WorkshopPage};

pub const POPULAR_GAMES_KEY: &str = "popular_games_list";
pub const ALL_GAMES_KEY: &str = "all_games_list";

const POPULAR_GAMES_LIMIT: usize = 50;
const ALL_GAMES_LIMIT: usize = 200;
const SEARCH_LIMIT: usize = 20;
const ALL_GAMES_TTL: Duration = Duration::from_secs(7200);

/// Where game lists and workshop pages come from
#[async_trait]
pub trait WorkshopSource: Send + Sync {
    async fn fetch_games(&self, limit: usize) -> Result<Vec<GameInfo>>;

    async fn fetch_search(&self, query: &str, limit: usize) -> Result<Vec<GameInfo>>;

    async fn fetch_workshop_page(&self, appid: u32, page: u32, per_page: u32) -> Result<WorkshopPage>;
}

#[async_trait]
impl WorkshopSource for SteamApi {
    async fn fetch_games(&self, limit: usize) -> Result<Vec<GameInfo>> {
        Ok(self.popular_games(limit))
    }

    async fn fetch_search(&self, query: &str, limit: usize) -> Result<Vec<GameInfo>> {
        Ok(self.search_games(query, limit))
    }

    async fn fetch_workshop_page(&self, appid: u32, page: u32, per_page: u32) -> Result<WorkshopPage> {
        self.query_workshop_items(appid, page, per_page).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheTtls {
    pub games: Duration,
    pub all_games: Duration,
    pub search: Duration,
    pub workshop: Duration,
}

impl CacheTtls {
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            games: Duration::from_secs(settings.ttl_games),
            all_games: ALL_GAMES_TTL,
            search: Duration::from_secs(settings.ttl_search),
            workshop: Duration::from_secs(settings.ttl_workshop),
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self::from_settings(&CacheSettings::default())
    }
}

pub fn search_key(query: &str) -> String {
    format!("search_games_{}", query.trim().to_lowercase())
}

pub fn workshop_items_key(appid: u32, page: u32, per_page: u32) -> String {
    format!("workshop_items_{}_{}_{}", appid, page, per_page)
}

fn cancelled(what: &str) -> WorkshopError {
    WorkshopError::Cancelled {
        reason: format!("{} cancelled", what),
        url: None,
    }
}

pub struct WorkshopService {
    source: Arc<dyn WorkshopSource>,
    cache: Arc<TtlCache>,
    ttls: CacheTtls,
}

impl WorkshopService {
    pub fn new(source: Arc<dyn WorkshopSource>, cache: Arc<TtlCache>, ttls: CacheTtls) -> Self {
        Self { source, cache, ttls }
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub async fn load_popular_games(&self, cancel: &CancellationToken) -> Result<Vec<GameInfo>> {
        self.cached(POPULAR_GAMES_KEY, self.ttls.games, cancel, || {
            self.source.fetch_games(POPULAR_GAMES_LIMIT)
        })
        .await
    }

    pub async fn load_all_games(&self, cancel: &CancellationToken) -> Result<Vec<GameInfo>> {
        self.cached(ALL_GAMES_KEY, self.ttls.all_games, cancel, || {
            self.source.fetch_games(ALL_GAMES_LIMIT)
        })
        .await
    }

    /// Queries shorter than two characters return nothing and skip the cache
    pub async fn search_games(&self, query: &str, cancel: &CancellationToken) -> Result<Vec<GameInfo>> {
        if query.trim().chars().count() < MIN_QUERY_LEN {
            return Ok(Vec::new());
        }
        self.cached(&search_key(query), self.ttls.search, cancel, || {
            self.source.fetch_search(query, SEARCH_LIMIT)
        })
        .await
    }

    /// One page of workshop items, each passed to `on_item` as it is ready
    pub async fn load_workshop_items<F>(
        &self,
        appid: u32,
        page: u32,
        per_page: u32,
        cancel: &CancellationToken,
        mut on_item: F,
    ) -> Result<Vec<ItemSummary>>
    where
        F: FnMut(&ItemSummary) + Send,
    {
        const WHAT: &str = "workshop item load";
        let key = workshop_items_key(appid, page, per_page);

        if cancel.is_cancelled() {
            return Err(cancelled(WHAT));
        }
        if let Some(items) = self.cache.get::<Vec<ItemSummary>>(&key) {
            debug!("Cache hit for '{}'", key);
            for item in &items {
                if cancel.is_cancelled() {
                    return Err(cancelled(WHAT));
                }
                on_item(item);
            }
            return Ok(items);
        }

        let page_data = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled(WHAT)),
            fetched = self.source.fetch_workshop_page(appid, page, per_page) => fetched?,
        };

        let mut items = Vec::with_capacity(page_data.items.len());
        for file in page_data.items.iter().filter(|file| file.is_ok()) {
            if cancel.is_cancelled() {
                return Err(cancelled(WHAT));
            }
            let summary = ItemSummary::from(file);
            on_item(&summary);
            items.push(summary);
        }

        if cancel.is_cancelled() {
            return Err(cancelled(WHAT));
        }
        self.cache.set_with_ttl(&key, &items, self.ttls.workshop)?;
        debug!("Loaded {} workshop items for app {} (page {})", items.len(), appid, page);
        Ok(items)
    }

    /// The rest of the catalogue after `start`, in batches of `batch`
    pub fn lazy_game_batches(&self, start: usize, batch: usize) -> Vec<Vec<GameInfo>> {
        catalog::additional_games(start, batch)
    }

    async fn cached<T, F, Fut>(&self, key: &str, ttl: Duration, cancel: &CancellationToken, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if cancel.is_cancelled() {
            return Err(cancelled(key));
        }

        self.cache
            .get_or_set(key, ttl, || async {
                let value = tokio::select! {
                    _ = cancel.cancelled() => return Err(cancelled(key)),
                    fetched = fetch() => fetched?,
                };
                // A cancel that lands after the fetch still wins
                if cancel.is_cancelled() {
                    return Err(cancelled(key));
                }
                Ok(value)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steam::models::PublishedFile;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{TempDir, tempdir};

    #[derive(Default)]
    struct FakeSource {
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl FakeSource {
        async fn pause(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[async_trait]
    impl WorkshopSource for FakeSource {
        async fn fetch_games(&self, limit: usize) -> Result<Vec<GameInfo>> {
            self.pause().await;
            Ok(catalog::popular_games(limit))
        }

        async fn fetch_search(&self, query: &str, limit: usize) -> Result<Vec<GameInfo>> {
            self.pause().await;
            Ok(catalog::search_games(query, limit))
        }

        async fn fetch_workshop_page(&self, _appid: u32, _page: u32, _per_page: u32) -> Result<WorkshopPage> {
            self.pause().await;
            let file = |id: &str, result: i32| PublishedFile {
                publishedfileid: id.to_string(),
                title: format!("Item {}", id),
                result,
                ..PublishedFile::default()
            };
            Ok(WorkshopPage {
                total: 3,
                items: vec![file("1", 1), file("2", 9), file("3", 1)],
            })
        }
    }

    fn service(source: Arc<FakeSource>) -> (TempDir, WorkshopService) {
        let dir = tempdir().unwrap();
        let cache = Arc::new(TtlCache::open(dir.path(), Duration::from_secs(60)).unwrap());
        (dir, WorkshopService::new(source, cache, CacheTtls::default()))
    }

    #[tokio::test]
    async fn test_popular_games_are_cached() {
        let source = Arc::new(FakeSource::default());
        let (_dir, service) = service(source.clone());
        let token = CancellationToken::new();

        let first = service.load_popular_games(&token).await.unwrap();
        let second = service.load_popular_games(&token).await.unwrap();

        assert_eq!(first.len(), 50);
        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(service.cache().contains(POPULAR_GAMES_KEY));
    }

    #[tokio::test]
    async fn test_short_search_skips_cache() {
        let source = Arc::new(FakeSource::default());
        let (_dir, service) = service(source.clone());
        let token = CancellationToken::new();

        assert!(service.search_games(" c ", &token).await.unwrap().is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.cache().stats().total_items, 0);

        let found = service.search_games("Counter", &token).await.unwrap();
        assert!(!found.is_empty());
        assert!(service.cache().contains("search_games_counter"));
    }

    #[tokio::test]
    async fn test_workshop_items_emit_and_cache() {
        let source = Arc::new(FakeSource::default());
        let (_dir, service) = service(source.clone());
        let token = CancellationToken::new();

        let mut seen = Vec::new();
        let items = service
            .load_workshop_items(730, 1, 10, &token, |item| seen.push(item.item.publishedfileid.clone()))
            .await
            .unwrap();
        assert_eq!(seen, vec!["1", "3"]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].file_size_formatted, "Unknown");

        let mut replayed = 0;
        service
            .load_workshop_items(730, 1, 10, &token, |_| replayed += 1)
            .await
            .unwrap();
        assert_eq!(replayed, 2);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(service.cache().contains(&workshop_items_key(730, 1, 10)));
    }

    #[tokio::test]
    async fn test_cancelled_load_stores_nothing() {
        let source = Arc::new(FakeSource {
            delay: Some(Duration::from_secs(5)),
            ..FakeSource::default()
        });
        let (_dir, service) = service(source);

        let already = CancellationToken::new();
        already.cancel();
        assert!(matches!(
            service.load_all_games(&already).await,
            Err(WorkshopError::Cancelled { .. })
        ));

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let result = service.load_workshop_items(570, 2, 5, &token, |_| {}).await;

        assert!(matches!(result, Err(WorkshopError::Cancelled { .. })));
        assert!(!service.cache().contains(&workshop_items_key(570, 2, 5)));
        assert!(!service.cache().contains(ALL_GAMES_KEY));
    }

    #[test]
    fn test_lazy_batches_and_keys() {
        let (_dir, service) = service(Arc::new(FakeSource::default()));
        assert!(service.lazy_game_batches(50, 25).is_empty());
        let batches = service.lazy_game_batches(0, 25);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 25);
        assert_eq!(search_key(" Dota "), "search_games_dota");
    }
}
