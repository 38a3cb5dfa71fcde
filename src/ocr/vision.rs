//! Google Cloud Vision `files:annotate` client.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::OcrEngine;
use crate::error::OcrError;

const DEFAULT_BASE_URL: &str = "https://vision.googleapis.com/v1";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateRequest {
    requests: Vec<FileRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileRequest {
    input_config: InputConfig,
    features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InputConfig {
    content: String,
    mime_type: &'static str,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<FileResponse>,
}

#[derive(Debug, Default, Deserialize)]
struct FileResponse {
    #[serde(default)]
    responses: Vec<PageResponse>,
    error: Option<Status>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageResponse {
    full_text_annotation: Option<TextAnnotation>,
    error: Option<Status>,
}

#[derive(Debug, Default, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

/// Vision API document text detection for PDFs.
pub struct VisionOcr {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    timeout: Duration,
}

impl VisionOcr {
    /// A client without a key fails every call with `OcrError::NotConfigured`.
    pub fn new(client: reqwest::Client, api_key: Option<SecretString>, timeout: Duration) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn map_transport_error(&self, e: reqwest::Error) -> OcrError {
        if e.is_timeout() {
            OcrError::Timeout(self.timeout)
        } else {
            OcrError::Http(e.to_string())
        }
    }
}

fn build_request(pdf: &[u8]) -> AnnotateRequest {
    AnnotateRequest {
        requests: vec![FileRequest {
            input_config: InputConfig {
                content: base64::engine::general_purpose::STANDARD.encode(pdf),
                mime_type: "application/pdf",
            },
            features: vec![Feature {
                kind: "DOCUMENT_TEXT_DETECTION",
            }],
        }],
    }
}

/// Join the text of every page. A file- or page-level error with no text at
/// all is reported; partial results are kept.
fn collect_text(response: AnnotateResponse) -> Result<String, OcrError> {
    let mut pages = Vec::new();
    let mut errors = Vec::new();

    for file in response.responses {
        if let Some(status) = file.error {
            errors.push(status.message);
        }
        for page in file.responses {
            if let Some(status) = page.error {
                errors.push(status.message);
            }
            if let Some(annotation) = page.full_text_annotation
                && !annotation.text.is_empty()
            {
                pages.push(annotation.text);
            }
        }
    }

    if pages.is_empty() && !errors.is_empty() {
        return Err(OcrError::InvalidResponse(errors.join("; ")));
    }
    Ok(pages.join("\n"))
}

#[async_trait]
impl OcrEngine for VisionOcr {
    async fn extract_text(&self, pdf: &[u8]) -> Result<String, OcrError> {
        let api_key = self.api_key.as_ref().ok_or(OcrError::NotConfigured)?;

        let resp = self
            .client
            .post(format!("{}/files:annotate", self.base_url))
            .query(&[("key", api_key.expose_secret())])
            .json(&build_request(pdf))
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OcrError::RequestFailed {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: AnnotateResponse = resp
            .json()
            .await
            .map_err(|e| OcrError::InvalidResponse(e.to_string()))?;
        let text = collect_text(parsed)?;
        debug!(bytes = pdf.len(), chars = text.len(), "OCR finished");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_encodes_pdf_inline() {
        let json = serde_json::to_value(build_request(b"%PDF-1.4")).unwrap();
        let file = &json["requests"][0];
        assert_eq!(file["inputConfig"]["mimeType"], "application/pdf");
        assert_eq!(file["inputConfig"]["content"], "JVBERi0xLjQ=");
        assert_eq!(file["features"][0]["type"], "DOCUMENT_TEXT_DETECTION");
    }

    #[test]
    fn pages_are_joined_with_newlines() {
        let raw = r#"{"responses": [{"responses": [
            {"fullTextAnnotation": {"text": "FACTUUR\nSigma"}},
            {"fullTextAnnotation": {"text": "Totaal 121,00"}}
        ], "totalPages": 2}]}"#;
        let parsed: AnnotateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(collect_text(parsed).unwrap(), "FACTUUR\nSigma\nTotaal 121,00");
    }

    #[test]
    fn response_without_text_is_empty_string() {
        let parsed: AnnotateResponse =
            serde_json::from_str(r#"{"responses": [{"responses": [{}]}]}"#).unwrap();
        assert_eq!(collect_text(parsed).unwrap(), "");

        let empty: AnnotateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(collect_text(empty).unwrap(), "");
    }

    #[test]
    fn embedded_error_without_text_fails() {
        let parsed: AnnotateResponse = serde_json::from_str(
            r#"{"responses": [{"error": {"code": 3, "message": "Bad PDF"}}]}"#,
        )
        .unwrap();
        assert!(matches!(
            collect_text(parsed),
            Err(OcrError::InvalidResponse(msg)) if msg.contains("Bad PDF")
        ));
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let ocr = VisionOcr::new(reqwest::Client::new(), None, Duration::from_secs(5));
        assert!(matches!(
            ocr.extract_text(b"%PDF").await,
            Err(OcrError::NotConfigured)
        ));
    }
}
