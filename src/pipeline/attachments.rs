//! PDF classification and the attachment content fallback chain.
//!
//! Content is taken from the inline base64 payload when present and
//! decodable. Otherwise the email is re-fetched once from the provider (only
//! when a message id and a provider client are both available) and the
//! attachment is matched by id, then by filename. If neither step yields
//! bytes the result is `AttachmentError::Unavailable`, which the caller turns
//! into a placeholder record.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};
use tracing::{debug, warn};

use crate::channels::provider::{EmailProvider, ProviderAttachment};
use crate::error::AttachmentError;
use crate::pipeline::types::RawAttachment;

/// Decode a base64 payload, tolerating whitespace, a `data:...;base64,`
/// prefix, missing padding and the URL-safe alphabet.
pub fn decode_base64(raw: &str) -> Option<Vec<u8>> {
    let payload = match raw.trim().split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => raw,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }

    STANDARD
        .decode(&compact)
        .or_else(|_| STANDARD_NO_PAD.decode(&compact))
        .or_else(|_| URL_SAFE.decode(&compact))
        .ok()
        .filter(|bytes| !bytes.is_empty())
}

/// Obtains raw PDF bytes for an attachment.
#[derive(Clone)]
pub struct AttachmentContentResolver {
    provider: Option<Arc<dyn EmailProvider>>,
}

impl AttachmentContentResolver {
    pub fn new(provider: Option<Arc<dyn EmailProvider>>) -> Self {
        Self { provider }
    }

    pub async fn resolve(
        &self,
        attachment: &RawAttachment,
        message_id: Option<&str>,
    ) -> Result<Vec<u8>, AttachmentError> {
        if let Some(inline) = attachment.content.as_deref() {
            match decode_base64(inline) {
                Some(bytes) => return Ok(bytes),
                None => warn!(
                    filename = %attachment.filename,
                    "Inline attachment content is not valid base64"
                ),
            }
        }

        let unavailable = |reason: String| AttachmentError::Unavailable {
            filename: attachment.filename.clone(),
            reason,
        };

        let Some(message_id) = message_id.filter(|id| !id.trim().is_empty()) else {
            return Err(unavailable(
                "no inline content and no provider message id".to_string(),
            ));
        };
        let Some(provider) = &self.provider else {
            return Err(unavailable(
                "no inline content and no email provider API key configured".to_string(),
            ));
        };

        let fetched = match provider.fetch_attachments(message_id).await {
            Ok(list) => list,
            Err(e) => {
                warn!(message_id, error = %e, "Attachment re-fetch failed");
                return Err(unavailable(format!("re-fetch from provider failed: {e}")));
            }
        };

        let Some(matched) = find_match(&fetched, attachment) else {
            return Err(unavailable(
                "attachment not found in provider response".to_string(),
            ));
        };

        match matched.content.as_deref().and_then(decode_base64) {
            Some(bytes) => {
                debug!(
                    filename = %attachment.filename,
                    size = bytes.len(),
                    "Attachment content re-fetched from provider"
                );
                Ok(bytes)
            }
            None => Err(unavailable(
                "provider response did not include attachment content".to_string(),
            )),
        }
    }
}

/// Match by provider attachment id first, then by filename.
fn find_match<'a>(
    candidates: &'a [ProviderAttachment],
    attachment: &RawAttachment,
) -> Option<&'a ProviderAttachment> {
    if let Some(id) = attachment.provider_attachment_id.as_deref()
        && let Some(found) = candidates.iter().find(|c| c.id.as_deref() == Some(id))
    {
        return Some(found);
    }
    candidates
        .iter()
        .find(|c| c.filename.as_deref() == Some(attachment.filename.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mock provider returning a fixed attachment list and counting calls.
    struct MockProvider {
        attachments: Result<Vec<ProviderAttachment>, String>,
        calls: Mutex<Vec<String>>,
    }

    impl MockProvider {
        fn with(attachments: Vec<ProviderAttachment>) -> Arc<Self> {
            Arc::new(Self {
                attachments: Ok(attachments),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                attachments: Err("HTTP 500".into()),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl EmailProvider for MockProvider {
        async fn fetch_attachments(
            &self,
            message_id: &str,
        ) -> Result<Vec<ProviderAttachment>, AttachmentError> {
            self.calls.lock().unwrap().push(message_id.to_string());
            self.attachments
                .clone()
                .map_err(AttachmentError::Provider)
        }
    }

    fn pdf(filename: &str, id: Option<&str>, content: Option<&str>) -> RawAttachment {
        RawAttachment {
            filename: filename.into(),
            content_type: Some("application/pdf".into()),
            content: content.map(Into::into),
            provider_attachment_id: id.map(Into::into),
        }
    }

    fn remote(id: &str, filename: &str, content: Option<&str>) -> ProviderAttachment {
        ProviderAttachment {
            id: Some(id.into()),
            filename: Some(filename.into()),
            content: content.map(Into::into),
        }
    }

    // ── Base64 ──────────────────────────────────────────────────────

    #[test]
    fn decodes_plain_wrapped_and_data_url_base64() {
        assert_eq!(decode_base64("JVBERi0xLjQ=").unwrap(), b"%PDF-1.4");
        assert_eq!(decode_base64("JVBE\r\nRi0x\nLjQ=").unwrap(), b"%PDF-1.4");
        assert_eq!(
            decode_base64("data:application/pdf;base64,JVBERi0xLjQ=").unwrap(),
            b"%PDF-1.4"
        );
        assert_eq!(decode_base64("JVBERi0xLjQ").unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn rejects_empty_and_invalid_base64() {
        assert!(decode_base64("").is_none());
        assert!(decode_base64("   ").is_none());
        assert!(decode_base64("not base64 at all!").is_none());
    }

    // ── Fallback chain ──────────────────────────────────────────────

    #[tokio::test]
    async fn inline_content_wins_without_provider_call() {
        let provider = MockProvider::with(vec![]);
        let resolver = AttachmentContentResolver::new(Some(provider.clone()));

        let bytes = resolver
            .resolve(&pdf("a.pdf", None, Some("JVBERi0xLjQ=")), Some("em_1"))
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.4");
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refetch_matches_by_id_then_filename() {
        let provider = MockProvider::with(vec![
            remote("att_1", "other.pdf", Some("JVBERi0xLjQ=")),
            remote("att_2", "F118.pdf", Some("JVBERi0xLjc=")),
        ]);
        let resolver = AttachmentContentResolver::new(Some(provider.clone()));

        let by_id = resolver
            .resolve(&pdf("F118.pdf", Some("att_1"), None), Some("em_1"))
            .await
            .unwrap();
        assert_eq!(by_id, b"%PDF-1.4");

        let by_name = resolver
            .resolve(&pdf("F118.pdf", Some("att_9"), None), Some("em_1"))
            .await
            .unwrap();
        assert_eq!(by_name, b"%PDF-1.7");

        assert_eq!(provider.calls.lock().unwrap().as_slice(), ["em_1", "em_1"]);
    }

    #[tokio::test]
    async fn undecodable_inline_content_falls_through_to_refetch() {
        let provider = MockProvider::with(vec![remote("att_1", "a.pdf", Some("JVBERi0xLjQ="))]);
        let resolver = AttachmentContentResolver::new(Some(provider));

        let bytes = resolver
            .resolve(&pdf("a.pdf", Some("att_1"), Some("%%%")), Some("em_1"))
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.4");
    }

    #[tokio::test]
    async fn no_message_id_is_unavailable() {
        let provider = MockProvider::with(vec![]);
        let resolver = AttachmentContentResolver::new(Some(provider.clone()));

        let err = resolver.resolve(&pdf("a.pdf", None, None), None).await.unwrap_err();
        assert!(matches!(err, AttachmentError::Unavailable { ref filename, .. } if filename == "a.pdf"));
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_provider_is_unavailable() {
        let resolver = AttachmentContentResolver::new(None);
        let err = resolver
            .resolve(&pdf("a.pdf", None, None), Some("em_1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[tokio::test]
    async fn refetch_without_content_or_match_is_unavailable() {
        let no_content = AttachmentContentResolver::new(Some(MockProvider::with(vec![remote(
            "att_1", "a.pdf", None,
        )])));
        let err = no_content
            .resolve(&pdf("a.pdf", Some("att_1"), None), Some("em_1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("did not include"));

        let no_match = AttachmentContentResolver::new(Some(MockProvider::with(vec![remote(
            "att_2", "b.pdf", Some("JVBERg=="),
        )])));
        let err = no_match
            .resolve(&pdf("a.pdf", Some("att_1"), None), Some("em_1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn provider_failure_is_unavailable() {
        let resolver = AttachmentContentResolver::new(Some(MockProvider::failing()));
        let err = resolver
            .resolve(&pdf("a.pdf", None, None), Some("em_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::Unavailable { .. }));
        assert!(err.to_string().contains("HTTP 500"));
    }
}
