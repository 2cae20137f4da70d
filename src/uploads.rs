//! Attachment storage for recruiter job descriptions.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StorageError;

/// An uploaded file held in memory until stored.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Stores attachments and returns a URL that resolves to them.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `attachment` as object `object_id`, replacing whatever was
    /// stored under that id before.
    async fn put(
        &self,
        session_id: Uuid,
        object_id: Uuid,
        attachment: &Attachment,
    ) -> Result<String, StorageError>;
}

/// Filesystem store. Files land under `root/<session>/<object>/<name>` and
/// are served below `base_url`.
pub struct LocalObjectStore {
    root: PathBuf,
    base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Keep ASCII alphanumerics, `.`, `-` and `_`; everything else becomes `_`.
pub fn sanitize_file_name(name: &str) -> Result<String, StorageError> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        session_id: Uuid,
        object_id: Uuid,
        attachment: &Attachment,
    ) -> Result<String, StorageError> {
        let name = sanitize_file_name(&attachment.file_name)?;
        let dir = self.root.join(session_id.to_string()).join(object_id.to_string());
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(object_id = %object_id, "Replacing stored attachment"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&name), &attachment.bytes).await?;

        info!(
            session_id = %session_id,
            object_id = %object_id,
            file = %name,
            size = attachment.bytes.len(),
            "Attachment stored"
        );
        Ok(format!("{}/{session_id}/{object_id}/{name}", self.base_url))
    }
}
