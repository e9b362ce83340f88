use std::path::PathBuf;

use chrono::Utc;
use log::info;
use thiserror::Error;
use uuid::Uuid;

use crate::models::chat::FileAttachment;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const ALLOWED_TYPES: &[&str] = &["application/pdf"];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No file provided")]
    MissingFile,
    #[error("File size too large. Maximum {}MB allowed.", .0 / (1024 * 1024))]
    TooLarge(u64),
    #[error(
        "Only PDF files are supported. For spreadsheets or data files, please convert them to PDF first."
    )]
    UnsupportedType(String),
    #[error("Failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// True for problems with the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, UploadError::Io(_))
    }
}

/// Validates uploads and writes them under one directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    upload_dir: PathBuf,
    max_bytes: u64,
}

impl FileStore {
    pub fn new(upload_dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self { upload_dir: upload_dir.into(), max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Canonical path of a stored upload. `None` when `path` does not exist
    /// or resolves outside the upload directory.
    pub async fn resolve(&self, path: &str) -> Option<PathBuf> {
        let root = tokio::fs::canonicalize(&self.upload_dir).await.ok()?;
        let candidate = tokio::fs::canonicalize(path).await.ok()?;
        (candidate != root && candidate.starts_with(&root)).then_some(candidate)
    }

    /// Size is checked before type; a file of exactly `max_bytes` is accepted.
    pub async fn save(
        &self,
        original_name: &str,
        content_type: &str,
        bytes: &[u8]
    ) -> Result<FileAttachment, UploadError> {
        let size = bytes.len() as u64;
        if size > self.max_bytes {
            return Err(UploadError::TooLarge(self.max_bytes));
        }
        if !ALLOWED_TYPES.contains(&content_type) {
            return Err(UploadError::UnsupportedType(content_type.to_string()));
        }

        let id = new_file_id();
        let stored_name = format!("{}.{}", id, file_extension(original_name));

        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let path = self.upload_dir.join(&stored_name);
        tokio::fs::write(&path, bytes).await?;

        let path = path.to_string_lossy().into_owned();
        info!("File saved: id={} name={} path={} size={}", id, original_name, path, size);

        Ok(FileAttachment {
            id,
            name: original_name.to_string(),
            file_type: content_type.to_string(),
            size,
            path: Some(path),
            mime_type: Some(content_type.to_string()),
            content: None,
        })
    }
}

/// `<unix millis>-<9 random lowercase hex chars>`.
fn new_file_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &random[..9])
}

/// Text after the last `.`, reduced to ASCII alphanumerics; `unknown` when
/// nothing is left.
fn file_extension(name: &str) -> String {
    let ext: String = name
        .rsplit('.')
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if ext.is_empty() { "unknown".to_string() } else { ext }
}
