//! Storage REST API backend (`/storage/v1/object/...`).

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use uuid::Uuid;

use super::{PdfStore, object_key};
use crate::error::StorageError;

/// Uploads into a bucket of a hosted object store and returns its public URL.
pub struct RestObjectStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    service_key: Option<SecretString>,
}

impl RestObjectStore {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        service_key: Option<SecretString>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            service_key,
        }
    }

    fn upload_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key)
    }

    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, key
        )
    }
}

#[async_trait]
impl PdfStore for RestObjectStore {
    async fn put(
        &self,
        company_id: Uuid,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let key = object_key(company_id, filename, Utc::now());

        let mut request = self
            .client
            .post(self.upload_url(&key))
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .header("x-upsert", "false")
            .body(bytes.to_vec());
        if let Some(service_key) = &self.service_key {
            request = request
                .bearer_auth(service_key.expose_secret())
                .header("apikey", service_key.expose_secret());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed {
                key: key.clone(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                key,
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        debug!(%company_id, key = %key, size = bytes.len(), "PDF uploaded");
        Ok(self.public_url(&key))
    }
}
