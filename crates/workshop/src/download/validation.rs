//! Post-download file validation (size and xxHash64)

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::debug;
use xxhash_rust::xxh64::Xxh64;

use crate::error::{FileOperation, Result, ValidationType, WorkshopError};

const READ_BUFFER: usize = 64 * 1024;

/// xxHash64 (seed 0) as 16 lowercase hex digits
pub fn xxhash64_hex(data: &[u8]) -> String {
    hex::encode(xxhash_rust::xxh64::xxh64(data, 0).to_be_bytes())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileValidation {
    pub expected_size: Option<u64>,
    /// Hex digest as produced by [`xxhash64_hex`]
    pub xxhash64: Option<String>,
}

impl FileValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expected_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    pub fn with_xxhash64<S: Into<String>>(mut self, hash: S) -> Self {
        self.xxhash64 = Some(hash.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.expected_size.is_none() && self.xxhash64.is_none()
    }

    /// Check the file, size first
    pub async fn validate_file(&self, path: &Path) -> Result<()> {
        let file_size = fs::metadata(path)
            .await
            .map_err(|e| WorkshopError::fs(path, FileOperation::Metadata, e))?
            .len();

        if let Some(expected) = self.expected_size {
            if file_size != expected {
                return Err(WorkshopError::SizeMismatch {
                    file: path.to_path_buf(),
                    expected,
                    actual: file_size,
                    diff: file_size as i64 - expected as i64,
                });
            }
        }

        if let Some(ref expected) = self.xxhash64 {
            let actual = hash_file(path).await?;
            debug!("xxHash64 check for {}: expected={}, actual={}", path.display(), expected, actual);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(WorkshopError::ValidationFailed {
                    file: path.to_path_buf(),
                    validation_type: ValidationType::XxHash64,
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(())
    }

    /// Validate and delete the file when it does not match
    pub async fn validate_or_remove(&self, path: &Path) -> Result<()> {
        if let Err(e) = self.validate_file(path).await {
            debug!("Removing invalid file {}: {}", path.display(), e);
            super::files::remove_if_exists(path).await?;
            return Err(e);
        }
        Ok(())
    }
}

async fn hash_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .await
        .map_err(|e| WorkshopError::fs(path, FileOperation::Read, e))?;
    let mut hasher = Xxh64::new(0);
    let mut buffer = vec![0u8; READ_BUFFER];

    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| WorkshopError::fs(path, FileOperation::Read, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.digest().to_be_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_size_and_hash_pass() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ok.bin");
        fs::write(&path, b"Hello, World!").await.unwrap();

        let validation = FileValidation::new()
            .with_expected_size(13)
            .with_xxhash64(xxhash64_hex(b"Hello, World!"));
        validation.validate_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_size_mismatch_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.bin");
        fs::write(&path, b"abc").await.unwrap();

        let result = FileValidation::new().with_expected_size(10).validate_or_remove(&path).await;
        match result {
            Err(WorkshopError::SizeMismatch { expected, actual, diff, .. }) => {
                assert_eq!((expected, actual, diff), (10, 3, -7));
            }
            other => panic!("Expected size mismatch, got {:?}", other),
        }
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_hash_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, b"payload").await.unwrap();

        let result = FileValidation::new()
            .with_xxhash64("0000000000000000")
            .validate_file(&path)
            .await;
        assert!(matches!(
            result,
            Err(WorkshopError::ValidationFailed { validation_type: ValidationType::XxHash64, .. })
        ));
        assert!(path.exists());
    }

    #[test]
    fn test_hex_digest_shape() {
        let digest = xxhash64_hex(b"");
        assert_eq!(digest, "ef46db3751d8e999");
    }
}
