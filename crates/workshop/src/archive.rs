//! Unpacking downloaded archives (.zip, .tar, .tar.gz)
//!
//! Entries whose path would land outside the destination are skipped.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::EntryType;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{FileOperation, Result, WorkshopError};

pub const SKIPPED_UNSAFE: &str = "Skipped unsafe path";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveKind {
    /// Detect the format from the file name, case-insensitively
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Files and directories written
    pub entries: usize,
    pub skipped: usize,
}

pub fn is_archive(path: &Path) -> bool {
    ArchiveKind::from_path(path).is_some()
}

/// Extract `archive` into `dest`, reporting `(done, total, detail)` per entry.
///
/// `total` is 0 for tar archives, whose length is unknown until the end.
pub fn extract_archive<F>(archive: &Path, dest: &Path, on_progress: F) -> Result<ExtractSummary>
where
    F: FnMut(u64, u64, Option<String>),
{
    let kind = ArchiveKind::from_path(archive).ok_or_else(|| WorkshopError::UnsupportedArchive {
        path: archive.to_path_buf(),
    })?;

    std::fs::create_dir_all(dest).map_err(|e| WorkshopError::fs(dest, FileOperation::CreateDir, e))?;
    let file = File::open(archive).map_err(|e| WorkshopError::fs(archive, FileOperation::Read, e))?;

    let summary = match kind {
        ArchiveKind::Zip => extract_zip(file, archive, dest, on_progress)?,
        ArchiveKind::Tar => extract_tar(file, archive, dest, on_progress)?,
        ArchiveKind::TarGz => extract_tar(GzDecoder::new(file), archive, dest, on_progress)?,
    };

    debug!(
        "Extracted {} entries from {} ({} skipped)",
        summary.entries,
        archive.display(),
        summary.skipped
    );
    Ok(summary)
}

fn archive_error(archive: &Path, message: impl ToString) -> WorkshopError {
    WorkshopError::Archive {
        path: archive.to_path_buf(),
        message: message.to_string(),
    }
}

fn extract_zip<F>(file: File, archive: &Path, dest: &Path, mut on_progress: F) -> Result<ExtractSummary>
where
    F: FnMut(u64, u64, Option<String>),
{
    let mut zip = ZipArchive::new(file).map_err(|e| archive_error(archive, e))?;
    let total = zip.len() as u64;
    let mut summary = ExtractSummary::default();
    let mut done = 0u64;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| archive_error(archive, e))?;
        let entry_name = entry.name().to_string();
        done += 1;

        // Zip Slip guard
        let Some(safe_rel) = entry.enclosed_name().map(|p| p.to_owned()) else {
            warn!("{} in {}: {}", SKIPPED_UNSAFE, archive.display(), entry_name);
            summary.skipped += 1;
            on_progress(done, total, Some(SKIPPED_UNSAFE.to_string()));
            continue;
        };

        let out_path = dest.join(safe_rel);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| WorkshopError::fs(&out_path, FileOperation::CreateDir, e))?;
        } else {
            write_entry(&mut entry, &out_path)?;
        }

        summary.entries += 1;
        on_progress(done, total, Some(entry_name));
    }

    Ok(summary)
}

fn extract_tar<R, F>(reader: R, archive: &Path, dest: &Path, mut on_progress: F) -> Result<ExtractSummary>
where
    R: Read,
    F: FnMut(u64, u64, Option<String>),
{
    let mut tar = tar::Archive::new(reader);
    let mut summary = ExtractSummary::default();
    let mut done = 0u64;

    for entry in tar.entries().map_err(|e| archive_error(archive, e))? {
        let mut entry = entry.map_err(|e| archive_error(archive, e))?;
        let raw_path = entry.path().map_err(|e| archive_error(archive, e))?.to_path_buf();
        done += 1;

        // Links could point an entry written later outside `dest`
        let is_link = matches!(entry.header().entry_type(), EntryType::Symlink | EntryType::Link);
        if is_link || sanitize_relative_path(&raw_path).is_none() {
            warn!("{} in {}: {}", SKIPPED_UNSAFE, archive.display(), raw_path.display());
            summary.skipped += 1;
            on_progress(done, 0, Some(SKIPPED_UNSAFE.to_string()));
            continue;
        }

        // `unpack_in` re-checks the resolved parent directory against `dest`
        if !entry.unpack_in(dest).map_err(|e| archive_error(archive, e))? {
            warn!("{} in {}: {}", SKIPPED_UNSAFE, archive.display(), raw_path.display());
            summary.skipped += 1;
            on_progress(done, 0, Some(SKIPPED_UNSAFE.to_string()));
            continue;
        }

        summary.entries += 1;
        on_progress(done, 0, Some(raw_path.display().to_string()));
    }

    Ok(summary)
}

fn write_entry(reader: &mut impl Read, out_path: &Path) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| WorkshopError::fs(parent, FileOperation::CreateDir, e))?;
    }
    let mut out_file = File::create(out_path).map_err(|e| WorkshopError::fs(out_path, FileOperation::Create, e))?;
    std::io::copy(reader, &mut out_file).map_err(|e| WorkshopError::fs(out_path, FileOperation::Write, e))?;
    Ok(())
}

/// Relative path made of plain components only, `None` for anything that could escape
pub fn sanitize_relative_path(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_zip_extraction_skips_unsafe_entries() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pack.zip");
        write_zip(
            &archive,
            &[("maps/one.bsp", b"one"), ("../evil.txt", b"nope"), ("readme.txt", b"hi")],
        );

        let dest = dir.path().join("out");
        let mut details = Vec::new();
        let summary = extract_archive(&archive, &dest, |done, total, detail| {
            details.push((done, total, detail));
        })
        .unwrap();

        assert_eq!(summary, ExtractSummary { entries: 2, skipped: 1 });
        assert_eq!(std::fs::read(dest.join("maps/one.bsp")).unwrap(), b"one");
        assert!(!dir.path().join("evil.txt").exists());
        assert_eq!(details.len(), 3);
        assert!(details.iter().all(|(_, total, _)| *total == 3));
        assert!(details
            .iter()
            .any(|(_, _, detail)| detail.as_deref() == Some(SKIPPED_UNSAFE)));
    }

    #[test]
    fn test_tar_gz_extraction() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pack.tar.gz");
        {
            let encoder = flate2::write::GzEncoder::new(File::create(&archive).unwrap(), flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            for (name, data) in [("a/b.txt", &b"bee"[..]), ("c.txt", &b"sea"[..])] {
                let mut header = tar::Header::new_gnu();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, name, data).unwrap();
            }
            builder.into_inner().unwrap().finish().unwrap();
        }

        let dest = dir.path().join("pack");
        let summary = extract_archive(&archive, &dest, |_, _, _| {}).unwrap();
        assert_eq!(summary.entries, 2);
        assert_eq!(std::fs::read_to_string(dest.join("a/b.txt")).unwrap(), "bee");
    }

    #[test]
    fn test_tar_link_entries_are_skipped() {
        let dir = tempdir().unwrap();
        let outside = dir.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        let archive = dir.path().join("links.tar");
        {
            let mut builder = tar::Builder::new(File::create(&archive).unwrap());

            let mut link = tar::Header::new_gnu();
            link.set_entry_type(EntryType::Symlink);
            link.set_size(0);
            link.set_mode(0o777);
            builder.append_link(&mut link, "link", &outside).unwrap();

            let mut hard = tar::Header::new_gnu();
            hard.set_entry_type(EntryType::Link);
            hard.set_size(0);
            builder.append_link(&mut hard, "hard", "/etc/hostname").unwrap();

            let data = b"escaped";
            let mut file = tar::Header::new_gnu();
            file.set_size(data.len() as u64);
            file.set_mode(0o644);
            builder.append_data(&mut file, "link/escaped.txt", &data[..]).unwrap();

            let plain = b"fine";
            let mut header = tar::Header::new_gnu();
            header.set_size(plain.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, "ok.txt", &plain[..]).unwrap();

            builder.finish().unwrap();
        }

        let dest = dir.path().join("links");
        let mut skipped_reports = 0;
        let summary = extract_archive(&archive, &dest, |_, _, detail| {
            if detail.as_deref() == Some(SKIPPED_UNSAFE) {
                skipped_reports += 1;
            }
        })
        .unwrap();

        assert!(!outside.join("escaped.txt").exists());
        assert!(std::fs::symlink_metadata(dest.join("link")).map(|m| !m.file_type().is_symlink()).unwrap_or(true));
        assert!(!dest.join("hard").exists());
        assert_eq!(std::fs::read_to_string(dest.join("ok.txt")).unwrap(), "fine");
        assert_eq!(summary.skipped, 2);
        assert_eq!(skipped_reports, 2);
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.rar");
        std::fs::write(&path, b"x").unwrap();
        assert!(matches!(
            extract_archive(&path, dir.path(), |_, _, _| {}),
            Err(WorkshopError::UnsupportedArchive { .. })
        ));
    }

    #[test]
    fn test_corrupt_zip_is_archive_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"definitely not a zip").unwrap();
        assert!(matches!(
            extract_archive(&path, &dir.path().join("out"), |_, _, _| {}),
            Err(WorkshopError::Archive { .. })
        ));
    }

    #[test]
    fn test_sanitize_relative_path() {
        assert_eq!(sanitize_relative_path(Path::new("./a/b")), Some(PathBuf::from("a/b")));
        assert_eq!(sanitize_relative_path(Path::new("a/../../b")), None);
        assert_eq!(sanitize_relative_path(Path::new("/etc/passwd")), None);
        assert_eq!(sanitize_relative_path(Path::new(".")), None);
        assert_eq!(ArchiveKind::from_path(Path::new("x.TGZ")), Some(ArchiveKind::TarGz));
    }
}
