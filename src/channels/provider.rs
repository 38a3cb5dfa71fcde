//! Email-provider API client, used to re-fetch attachment content that the
//! webhook did not include inline.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::AttachmentError;
use crate::extraction::numbers::lenient_string;

/// One attachment as reported by the provider API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderAttachment {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub filename: Option<String>,
    /// Base64 content, when the provider returns it.
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: Option<String>,
}

/// Access to a stored email at the provider.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Attachments of the email with the given provider id.
    async fn fetch_attachments(
        &self,
        message_id: &str,
    ) -> Result<Vec<ProviderAttachment>, AttachmentError>;
}

#[derive(Debug, Deserialize)]
struct EmailResponse {
    #[serde(default)]
    attachments: Vec<ProviderAttachment>,
}

/// Resend-style REST client: `GET {base}/emails/{id}` with a bearer key.
pub struct ResendClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl ResendClient {
    pub fn new(client: reqwest::Client, api_key: SecretString, base_url: impl Into<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl EmailProvider for ResendClient {
    async fn fetch_attachments(
        &self,
        message_id: &str,
    ) -> Result<Vec<ProviderAttachment>, AttachmentError> {
        let resp = self
            .client
            .get(format!("{}/emails/{}", self.base_url, message_id))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| AttachmentError::Provider(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AttachmentError::Provider(format!(
                "HTTP {status}: {}",
                body.chars().take(300).collect::<String>()
            )));
        }

        let email: EmailResponse = resp
            .json()
            .await
            .map_err(|e| AttachmentError::Provider(format!("invalid response: {e}")))?;
        debug!(
            message_id,
            attachments = email.attachments.len(),
            "Fetched email from provider"
        );
        Ok(email.attachments)
    }
}

/// Create the provider client when an API key is configured.
pub fn create_email_provider(
    config: &ProviderConfig,
    client: reqwest::Client,
) -> Option<std::sync::Arc<dyn EmailProvider>> {
    let api_key = config.email_api_key.clone()?;
    Some(std::sync::Arc::new(ResendClient::new(
        client,
        api_key,
        config.email_api_url.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_attachments_parse_leniently() {
        let parsed: EmailResponse = serde_json::from_str(
            r#"{"id": "em_1", "attachments": [
                {"id": "att_1", "filename": "F118.pdf", "content": "JVBERg==", "size": 4},
                {"id": 7, "filename": null}
            ]}"#,
        )
        .unwrap();
        assert_eq!(parsed.attachments.len(), 2);
        assert_eq!(parsed.attachments[0].content.as_deref(), Some("JVBERg=="));
        assert_eq!(parsed.attachments[1].id.as_deref(), Some("7"));
        assert!(parsed.attachments[1].filename.is_none());
    }

    #[test]
    fn response_without_attachments_is_empty() {
        let parsed: EmailResponse = serde_json::from_str(r#"{"id": "em_1"}"#).unwrap();
        assert!(parsed.attachments.is_empty());
    }

    #[test]
    fn provider_requires_key() {
        let mut config = ProviderConfig::disabled();
        assert!(create_email_provider(&config, reqwest::Client::new()).is_none());
        config.email_api_key = Some(SecretString::from("re_test"));
        assert!(create_email_provider(&config, reqwest::Client::new()).is_some());
    }
}
