//! Steam Web API client
//!
//! Wraps the handful of endpoints the downloader needs:
//! - published file details (batch lookup by id)
//! - workshop browsing through `IPublishedFileService/QueryFiles`
//! - API key validation
//! - download URL resolution with a mirror fallback

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};

use crate::catalog;
use crate::config::{ApiConfig, DEFAULT_FALLBACK_DOWNLOAD_BASE};
use crate::error::{Result, WorkshopError};
use crate::steam::models::{AppInfo, FileDetailsResponse, GameInfo, PublishedFile, WorkshopPage};

const FILE_DETAILS: &str = "ISteamRemoteStorage/GetPublishedFileDetails/v1/";
const QUERY_FILES: &str = "IPublishedFileService/QueryFiles/v1/";
const USER_FILES: &str = "ISteamRemoteStorage/GetUserPublishedItemVoteDetails/v1/";
const PLAYER_SUMMARIES: &str = "ISteamUser/GetPlayerSummaries/v0002/";

/// Public profile used to check whether a key is accepted
const PROBE_STEAM_ID: &str = "76561197960435530";

/// `EPublishedFileQueryType::RankedByTrend`
const QUERY_RANKED_BY_TREND: u32 = 3;

pub struct SteamApi {
    client: Client,
    config: ApiConfig,
    api_key: Option<String>,
    fallback_download_base: String,
}

impl SteamApi {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WorkshopError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
                field: Some("api".to_string()),
                suggestion: None,
            })?;

        let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty());

        Ok(Self {
            client,
            config,
            api_key,
            fallback_download_base: DEFAULT_FALLBACK_DOWNLOAD_BASE.to_string(),
        })
    }

    /// Override the mirror used when an item has no direct file URL
    pub fn with_fallback_base(mut self, base: impl Into<String>) -> Self {
        self.fallback_download_base = base.into();
        self
    }

    pub fn set_api_key(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.api_key = if key.trim().is_empty() { None } else { Some(key.trim().to_string()) };
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The underlying client, shared with the preview cache
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    /// Fetch details for a batch of published file ids
    pub async fn get_published_file_details(&self, ids: &[String]) -> Result<FileDetailsResponse> {
        let key = self.require_key(FILE_DETAILS)?;

        let mut form: Vec<(String, String)> = vec![
            ("key".to_string(), key.to_string()),
            ("itemcount".to_string(), ids.len().to_string()),
            ("format".to_string(), "json".to_string()),
        ];
        for (i, id) in ids.iter().enumerate() {
            form.push((format!("publishedfileids[{}]", i), id.clone()));
        }

        let url = self.endpoint_url(FILE_DETAILS);
        debug!("Requesting details for {} workshop items", ids.len());

        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(WorkshopError::from)?;
        let body = Self::read_json(FILE_DETAILS, response).await?;
        let inner = Self::response_section(FILE_DETAILS, body)?;

        serde_json::from_value(inner).map_err(|e| WorkshopError::Json {
            context: FILE_DETAILS.to_string(),
            source: e,
        })
    }

    /// Browse the Workshop of `appid`, most popular first
    pub async fn query_workshop_items(&self, appid: u32, page: u32, per_page: u32) -> Result<WorkshopPage> {
        let key = self.require_key(QUERY_FILES)?;

        let params = vec![
            ("key", key.to_string()),
            ("appid", appid.to_string()),
            ("page", page.max(1).to_string()),
            ("numperpage", per_page.to_string()),
            ("return_metadata", "true".to_string()),
            ("return_tags", "true".to_string()),
            ("return_previews", "true".to_string()),
            ("query_type", QUERY_RANKED_BY_TREND.to_string()),
        ];

        let body = self.get_json(QUERY_FILES, &params).await?;
        let inner = Self::response_section(QUERY_FILES, body)?;
        let page: WorkshopPage = serde_json::from_value(inner).map_err(|e| WorkshopError::Json {
            context: QUERY_FILES.to_string(),
            source: e,
        })?;

        debug!("App {} page returned {} of {} items", appid, page.items.len(), page.total);
        Ok(page)
    }

    pub async fn get_user_published_files(&self, steam_id: &str, appid: u32) -> Result<Vec<PublishedFile>> {
        let key = self.require_key(USER_FILES)?;

        let params = vec![
            ("key", key.to_string()),
            ("steamid", steam_id.to_string()),
            ("appid", appid.to_string()),
        ];

        let body = self.get_json(USER_FILES, &params).await?;
        let files = body
            .get("response")
            .and_then(|r| r.get("publishedfiledetails"))
            .cloned()
            .map(serde_json::from_value::<Vec<PublishedFile>>)
            .transpose()
            .map_err(|e| WorkshopError::Json {
                context: USER_FILES.to_string(),
                source: e,
            })?;

        Ok(files.unwrap_or_default())
    }

    /// True when Steam accepts the configured key
    pub async fn validate_api_key(&self) -> bool {
        let Some(key) = self.api_key.as_deref() else {
            return false;
        };

        let url = self.endpoint_url(PLAYER_SUMMARIES);
        let result = self
            .client
            .get(&url)
            .query(&[("key", key), ("steamids", PROBE_STEAM_ID)])
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                debug!("API key check failed: {}", e);
                return false;
            }
        };

        if response.status() != reqwest::StatusCode::OK {
            debug!("API key check returned {}", response.status());
            return false;
        }

        match response.json::<Value>().await {
            Ok(body) => body.get("response").is_some(),
            Err(_) => false,
        }
    }

    /// Direct file URL when Steam provides one, the mirror otherwise
    pub fn resolve_download_url(&self, item: &PublishedFile) -> Result<String> {
        resolve_download_url(item, &self.fallback_download_base)
    }

    pub fn popular_games(&self, limit: usize) -> Vec<GameInfo> {
        catalog::popular_games(limit)
    }

    pub fn search_games(&self, query: &str, limit: usize) -> Vec<GameInfo> {
        catalog::search_games(query, limit)
    }

    pub fn app_info(&self, appid: u32) -> AppInfo {
        catalog::app_info(appid)
    }

    fn require_key(&self, endpoint: &str) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| WorkshopError::MissingApiKey {
            endpoint: endpoint.to_string(),
        })
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    /// Exponential backoff starting at `retry_delay_ms`, doubling per attempt
    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        let factor = (self.config.retry_delay_ms / 2).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(Duration::from_millis(self.config.max_retry_delay_ms))
            .take(self.config.max_retries)
    }

    /// GET with retries on recoverable failures
    async fn get_json(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = self.endpoint_url(endpoint);

        RetryIf::spawn(
            self.retry_strategy(),
            || self.send_get(&url, endpoint, params),
            |e: &WorkshopError| {
                let retry = e.is_recoverable();
                if retry {
                    warn!("Retrying {} after error: {}", endpoint, e);
                }
                retry
            },
        )
        .await
    }

    async fn send_get(&self, url: &str, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        debug!("Steam API GET {}", endpoint);
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(WorkshopError::from)?;

        Self::read_json(endpoint, response).await
    }

    async fn read_json(endpoint: &str, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let text = response.text().await.map_err(WorkshopError::from)?;

        if !status.is_success() {
            let message: String = text.chars().take(200).collect();
            return Err(WorkshopError::Api {
                endpoint: endpoint.to_string(),
                status: Some(status.as_u16()),
                message: if message.is_empty() {
                    status.canonical_reason().unwrap_or("error").to_string()
                } else {
                    message
                },
            });
        }

        serde_json::from_str(&text).map_err(|e| WorkshopError::Json {
            context: endpoint.to_string(),
            source: e,
        })
    }

    fn response_section(endpoint: &str, mut body: Value) -> Result<Value> {
        body.get_mut("response")
            .map(Value::take)
            .ok_or_else(|| WorkshopError::InvalidResponse {
                endpoint: endpoint.to_string(),
                message: "missing 'response' object".to_string(),
            })
    }
}

/// `file_url` when present, otherwise `{fallback_base}/{publishedfileid}`
pub fn resolve_download_url(item: &PublishedFile, fallback_base: &str) -> Result<String> {
    if !item.file_url.is_empty() {
        return Ok(item.file_url.clone());
    }
    if item.publishedfileid.is_empty() {
        return Err(WorkshopError::NoDownloadUrl {
            item: item.title.clone(),
        });
    }

    Ok(format!("{}/{}", fallback_base.trim_end_matches('/'), item.publishedfileid))
}
