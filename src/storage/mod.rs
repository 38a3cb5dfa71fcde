//! Durable storage for received PDFs.
//!
//! Objects are keyed `{company_id}/{unix_millis}_{filename}` so every blob is
//! partitioned by tenant.

pub mod local;
pub mod rest;

pub use local::LocalPdfStore;
pub use rest::RestObjectStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::StorageError;

/// Object storage for PDF bytes.
#[async_trait]
pub trait PdfStore: Send + Sync {
    /// Store the bytes and return a publicly resolvable URL.
    async fn put(&self, company_id: Uuid, filename: &str, bytes: &[u8])
    -> Result<String, StorageError>;
}

/// Build the object key for an upload.
pub fn object_key(company_id: Uuid, filename: &str, at: DateTime<Utc>) -> String {
    format!(
        "{company_id}/{}_{}",
        at.timestamp_millis(),
        sanitize_filename(filename)
    )
}

/// Reduce a client-supplied filename to a safe single path segment.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "document.pdf".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Pick the storage backend: REST object store when a URL is configured,
/// local disk otherwise.
pub fn create_store(config: &StorageConfig, client: reqwest::Client) -> Arc<dyn PdfStore> {
    match &config.url {
        Some(url) => {
            tracing::info!(bucket = %config.bucket, "Using REST object storage at {url}");
            Arc::new(RestObjectStore::new(
                client,
                url.clone(),
                config.bucket.clone(),
                config.service_key.clone(),
            ))
        }
        None => {
            tracing::info!(
                "No STORAGE_URL set, storing PDFs under {}",
                config.local_dir.display()
            );
            Arc::new(LocalPdfStore::new(
                config.local_dir.clone(),
                config.public_base_url.clone(),
            ))
        }
    }
}
