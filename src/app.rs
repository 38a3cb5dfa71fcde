//! Service wiring: configuration in, router state out.

use std::sync::Arc;

use tracing::{info, warn};

use crate::channels::{AppState, create_email_provider};
use crate::config::{AppConfig, http_client};
use crate::error::Result;
use crate::extraction::StructuredExtractor;
use crate::llm::create_provider;
use crate::ocr::VisionOcr;
use crate::pipeline::InvoicePipeline;
use crate::storage::create_store;
use crate::store;

/// Connect the store and build every provider client.
///
/// Missing provider keys are logged, not fatal.
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let client = http_client(config.providers.timeout)?;
    let db = store::connect(&config.database).await?;

    let pdf_store = create_store(&config.storage, client.clone());
    let ocr = Arc::new(VisionOcr::new(
        client.clone(),
        config.providers.ocr_api_key.clone(),
        config.providers.timeout,
    ));
    let extractor = StructuredExtractor::new(create_provider(&config.providers, client.clone()));
    let email_provider = create_email_provider(&config.providers, client);

    if config.providers.ocr_api_key.is_none() {
        warn!("GOOGLE_VISION_API_KEY not set, PDFs will be recorded as processing errors");
    }
    if !extractor.is_configured() {
        warn!("GEMINI_API_KEY not set, extractions will need manual review");
    }
    if email_provider.is_none() {
        info!("RESEND_API_KEY not set, attachments without inline content become placeholders");
    }

    let pipeline = InvoicePipeline::new(db, pdf_store, ocr, extractor, email_provider);
    Ok(AppState {
        pipeline: Arc::new(pipeline),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, ProviderConfig, ServerConfig, StorageConfig};

    #[tokio::test]
    async fn builds_with_every_provider_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            server: ServerConfig {
                bind_addr: "127.0.0.1:0".parse().unwrap(),
            },
            database: DatabaseConfig {
                url: dir.path().join("inbox.db").display().to_string(),
                auth_token: None,
            },
            storage: StorageConfig {
                url: None,
                service_key: None,
                bucket: "supplier-invoices".into(),
                local_dir: dir.path().join("pdfs"),
                public_base_url: "http://files.test".into(),
            },
            providers: ProviderConfig::disabled(),
        };

        assert!(build_state(&config).await.is_ok());
    }
}
