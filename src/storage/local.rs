//! Local-disk PDF store.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::{PdfStore, object_key};
use crate::error::StorageError;

/// Writes PDFs under a directory; URLs are `{public_base_url}/{key}`.
pub struct LocalPdfStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalPdfStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PdfStore for LocalPdfStore {
    async fn put(
        &self,
        company_id: Uuid,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let key = object_key(company_id, filename, Utc::now());
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        debug!(%company_id, path = %path.display(), size = bytes.len(), "PDF written");
        Ok(format!("{}/{}", self.public_base_url, key))
    }
}
