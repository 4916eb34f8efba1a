//! Data types for Steam Web API payloads

use serde::{Deserialize, Deserializer, Serialize};

use crate::format::{format_clock, format_count, format_date};

/// A game in the catalogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    pub appid: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub appid: u32,
    pub name: String,
    pub has_workshop: bool,
    pub workshop_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkshopTag {
    #[serde(default)]
    pub tag: String,
}

/// One entry of `publishedfiledetails`
///
/// Steam is inconsistent about numeric encoding (ids and sizes arrive as
/// strings from some endpoints and numbers from others), so those fields accept both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishedFile {
    #[serde(deserialize_with = "string_or_number")]
    pub publishedfileid: String,
    pub result: i32,
    pub title: String,
    #[serde(alias = "file_description")]
    pub description: String,
    #[serde(deserialize_with = "string_or_number")]
    pub creator: String,
    #[serde(alias = "consumer_appid", deserialize_with = "lenient_u64")]
    pub consumer_app_id: u64,
    pub file_url: String,
    pub preview_url: String,
    pub filename: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub file_size: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub time_created: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub time_updated: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub visibility: u64,
    #[serde(deserialize_with = "lenient_bool")]
    pub banned: bool,
    pub ban_reason: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub subscriptions: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub favorited: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub lifetime_subscriptions: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub lifetime_favorited: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub views: u64,
    pub tags: Vec<WorkshopTag>,
}

impl PublishedFile {
    /// Steam reports per-item success with `result == 1`; missing results count as success
    pub fn is_ok(&self) -> bool {
        self.result == 0 || self.result == 1
    }

    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.tag.as_str()).collect()
    }
}

/// Display-ready view of a workshop item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub item: PublishedFile,
    pub file_size_formatted: String,
    pub created_date: String,
    pub created_time: String,
    pub subscriptions_formatted: String,
}

impl From<&PublishedFile> for ItemSummary {
    fn from(item: &PublishedFile) -> Self {
        let (created_date, created_time) = if item.time_created > 0 {
            let ts = item.time_created as i64;
            (format_date(ts), format_clock(ts))
        } else {
            ("Unknown".to_string(), String::new())
        };

        Self {
            item: item.clone(),
            file_size_formatted: item_size_label(item.file_size),
            created_date,
            created_time,
            subscriptions_formatted: format_count(item.subscriptions),
        }
    }
}

fn item_size_label(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match size {
        0 => "Unknown".to_string(),
        s if s >= GB => format!("{:.1} GB", s as f64 / GB as f64),
        s if s >= MB => format!("{:.1} MB", s as f64 / MB as f64),
        s if s >= KB => format!("{:.1} KB", s as f64 / KB as f64),
        s => format!("{} B", s),
    }
}

/// Parsed `GetPublishedFileDetails` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileDetailsResponse {
    #[serde(default, alias = "resultcount")]
    pub result_count: u64,
    #[serde(default, rename = "publishedfiledetails")]
    pub files: Vec<PublishedFile>,
}

/// One page of `QueryFiles` results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkshopPage {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total: u64,
    #[serde(default, rename = "publishedfiledetails")]
    pub items: Vec<PublishedFile>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Str(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Bool(bool),
    Null,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Loose::deserialize(deserializer)? {
        Loose::Str(s) => s,
        Loose::Unsigned(n) => n.to_string(),
        Loose::Signed(n) => n.to_string(),
        Loose::Float(n) => n.to_string(),
        Loose::Bool(b) => b.to_string(),
        Loose::Null => String::new(),
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(match Loose::deserialize(deserializer)? {
        Loose::Str(s) => s.trim().parse().unwrap_or(0),
        Loose::Unsigned(n) => n,
        Loose::Signed(n) => n.max(0) as u64,
        Loose::Float(n) if n > 0.0 => n as u64,
        Loose::Bool(b) => b as u64,
        _ => 0,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Loose::deserialize(deserializer)? {
        Loose::Bool(b) => b,
        Loose::Unsigned(n) => n != 0,
        Loose::Signed(n) => n != 0,
        Loose::Str(s) => matches!(s.as_str(), "1" | "true"),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_entry_with_numbers() {
        let json = r#"{
            "publishedfileid": "123456789",
            "result": 1,
            "creator": "76561197960287930",
            "consumer_app_id": 4000,
            "file_url": "https://cdn.example.com/abc",
            "filename": "addons/cool_map.gma",
            "file_size": 5242880,
            "preview_url": "https://img.example.com/abc.jpg",
            "title": "Cool Map",
            "description": "A map",
            "time_created": 1700000000,
            "time_updated": 1700000500,
            "visibility": 0,
            "banned": 0,
            "ban_reason": "",
            "subscriptions": 1500,
            "favorited": 12,
            "lifetime_subscriptions": 3000,
            "lifetime_favorited": 20,
            "views": 9000,
            "tags": [{"tag": "Map"}, {"tag": "Roleplay"}]
        }"#;

        let file: PublishedFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.publishedfileid, "123456789");
        assert_eq!(file.consumer_app_id, 4000);
        assert_eq!(file.file_size, 5_242_880);
        assert!(!file.banned);
        assert!(file.is_ok());
        assert_eq!(file.tag_names(), vec!["Map", "Roleplay"]);
    }

    #[test]
    fn test_query_files_entry_with_strings() {
        let json = r#"{
            "publishedfileid": 987,
            "consumer_appid": 294100,
            "file_size": "2048",
            "file_description": "Adds things",
            "banned": false,
            "time_created": null
        }"#;

        let file: PublishedFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.publishedfileid, "987");
        assert_eq!(file.consumer_app_id, 294100);
        assert_eq!(file.file_size, 2048);
        assert_eq!(file.description, "Adds things");
        assert_eq!(file.time_created, 0);
    }

    #[test]
    fn test_item_summary_formatting() {
        let file = PublishedFile {
            publishedfileid: "1".to_string(),
            file_size: 5 * 1024 * 1024,
            time_created: 1_700_000_000,
            subscriptions: 2_500_000,
            ..PublishedFile::default()
        };
        let summary = ItemSummary::from(&file);
        assert_eq!(summary.file_size_formatted, "5.0 MB");
        assert_eq!(summary.created_date, "14.11.2023");
        assert_eq!(summary.created_time, "22:13");
        assert_eq!(summary.subscriptions_formatted, "2.5M");

        let empty = ItemSummary::from(&PublishedFile::default());
        assert_eq!(empty.file_size_formatted, "Unknown");
        assert_eq!(empty.created_date, "Unknown");
        assert_eq!(empty.created_time, "");
    }

    #[test]
    fn test_item_size_label_thresholds() {
        assert_eq!(item_size_label(512), "512 B");
        assert_eq!(item_size_label(2048), "2.0 KB");
        assert_eq!(item_size_label(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
