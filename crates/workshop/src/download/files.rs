//! File naming and file operation helpers for downloads

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::{FileOperation, Result, WorkshopError};
use crate::format::{extension_from_url, sanitize_filename};
use crate::steam::models::PublishedFile;

const MAX_TITLE_CHARS: usize = 50;
const MAX_FILENAME_CHARS: usize = 255;
const DEFAULT_EXTENSION: &str = ".zip";

/// Local file name for a workshop item: `<title>_<id><ext>`
///
/// The title keeps letters, digits, spaces, `-` and `_`, has spaces turned
/// into underscores and is cut to 50 characters. The extension comes from
/// the item's original file name, or from `file_url` when that has none.
pub fn item_filename(item: &PublishedFile) -> String {
    let kept: String = item
        .title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let title: String = kept
        .trim_end()
        .replace(' ', "_")
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect();

    let id = if item.publishedfileid.is_empty() { "unknown" } else { item.publishedfileid.as_str() };

    let extension = if item.filename.contains('.') || item.file_url.is_empty() {
        item_extension(&item.filename).to_string()
    } else {
        extension_from_url(&item.file_url)
    };

    sanitize_filename(&format!("{}_{}{}", title, id, extension), MAX_FILENAME_CHARS)
}

/// Everything from the last `.` of the original file name, `.zip` without one
pub fn item_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) => &filename[idx..],
        None => DEFAULT_EXTENSION,
    }
}

/// Path of the partial file for resume functionality
pub fn part_path(dest_path: &Path) -> PathBuf {
    let mut name = dest_path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Atomically rename a temporary file to its final destination
pub async fn atomic_rename(temp_path: &Path, dest_path: &Path) -> Result<()> {
    fs::rename(temp_path, dest_path)
        .await
        .map_err(|e| WorkshopError::fs(dest_path, FileOperation::Move, e))?;
    debug!("Atomically renamed {} to {}", temp_path.display(), dest_path.display());
    Ok(())
}

pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| WorkshopError::fs(parent, FileOperation::CreateDir, e))?;
    }
    Ok(())
}

/// Remove a file, treating "already gone" as success
pub async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WorkshopError::fs(path, FileOperation::Delete, e)),
    }
}

/// Sibling directory an archive is unpacked into: `mods/pack.tar.gz` -> `mods/pack`
pub fn extraction_dir(archive: &Path) -> PathBuf {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lowered = name.to_ascii_lowercase();

    let stem_len = [".tar.gz", ".tgz", ".tar", ".zip"]
        .iter()
        .find(|ext| lowered.ends_with(*ext))
        .map(|ext| name.len() - ext.len())
        .unwrap_or(name.len());

    archive.with_file_name(&name[..stem_len])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, id: &str, filename: &str) -> PublishedFile {
        PublishedFile {
            title: title.to_string(),
            publishedfileid: id.to_string(),
            filename: filename.to_string(),
            ..PublishedFile::default()
        }
    }

    #[test]
    fn test_item_filename_cleans_title() {
        assert_eq!(item_filename(&item("Cool Map: v2!", "123", "")), "Cool_Map_v2_123.zip");
        assert_eq!(item_filename(&item("Trailing   ", "5", "maps/x.bsp")), "Trailing_5.bsp");
        assert_eq!(item_filename(&item("", "7", "file.vpk")), "_7.vpk");
        assert_eq!(item_filename(&item("Карта", "8", "")), "Карта_8.zip");
    }

    #[test]
    fn test_item_filename_extension_from_url() {
        let mut from_url = item("Map", "9", "");
        from_url.file_url = "https://cdn.example.com/ugc/level.VPK?token=1".to_string();
        assert_eq!(item_filename(&from_url), "Map_9.vpk");

        from_url.filename = "pack.7z".to_string();
        assert_eq!(item_filename(&from_url), "Map_9.7z");
    }

    #[test]
    fn test_item_filename_truncates_after_underscoring() {
        let long = "word ".repeat(20);
        let name = item_filename(&item(&long, "1", ""));
        let title = name.trim_end_matches("_1.zip");
        assert_eq!(title.chars().count(), 50);
        assert!(!title.contains(' '));
    }

    #[test]
    fn test_part_path_appends() {
        assert_eq!(part_path(Path::new("/tmp/a.zip")), PathBuf::from("/tmp/a.zip.part"));
    }

    #[test]
    fn test_extraction_dir() {
        assert_eq!(extraction_dir(Path::new("/m/pack.zip")), PathBuf::from("/m/pack"));
        assert_eq!(extraction_dir(Path::new("/m/pack.TAR.GZ")), PathBuf::from("/m/pack"));
        assert_eq!(extraction_dir(Path::new("/m/pack.tgz")), PathBuf::from("/m/pack"));
    }

    #[tokio::test]
    async fn test_remove_if_exists_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        tokio::fs::write(&path, b"1").await.unwrap();
        remove_if_exists(&path).await.unwrap();
        remove_if_exists(&path).await.unwrap();
        assert!(!path.exists());
    }
}
