//! Structured invoice extraction from OCR text.
//!
//! `StructuredExtractor::extract` never fails: a missing provider, an HTTP
//! error or unparsable model output all produce `ExtractedInvoice::degraded`
//! with the cause in `notes`.

pub mod model;
pub mod numbers;
pub mod prompt;

pub use model::ExtractedInvoice;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider, ResponseFormat};
use prompt::{build_extraction_system_prompt, build_extraction_user_prompt};

const EXTRACTION_TEMPERATURE: f32 = 0.1;
const EXTRACTION_MAX_TOKENS: u32 = 8192;

/// Turns OCR text into an `ExtractedInvoice` through an LLM.
#[derive(Clone)]
pub struct StructuredExtractor {
    llm: Option<Arc<dyn LlmProvider>>,
}

impl StructuredExtractor {
    pub fn new(llm: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { llm }
    }

    /// Extractor without a model; every call yields the degraded result.
    pub fn disabled() -> Self {
        Self { llm: None }
    }

    pub fn is_configured(&self) -> bool {
        self.llm.is_some()
    }

    /// Best-effort extraction. Always returns a usable structure.
    pub async fn extract(&self, ocr_text: &str) -> ExtractedInvoice {
        match self.try_extract(ocr_text).await {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!(error = %e, "Structured extraction degraded");
                ExtractedInvoice::degraded(format!("Automatic extraction failed: {e}"))
            }
        }
    }

    async fn try_extract(&self, ocr_text: &str) -> Result<ExtractedInvoice, LlmError> {
        let llm = self.llm.as_ref().ok_or(LlmError::NotConfigured)?;

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_extraction_system_prompt()),
            ChatMessage::user(build_extraction_user_prompt(ocr_text)),
        ])
        .with_temperature(EXTRACTION_TEMPERATURE)
        .with_max_tokens(EXTRACTION_MAX_TOKENS)
        .with_response_format(ResponseFormat::Json);

        let response = llm.complete(request).await?;
        let extracted = parse_extraction(&response.content)?;
        debug!(
            model = llm.model_name(),
            confidence = extracted.confidence,
            line_items = extracted.line_items.len(),
            "Extraction parsed"
        );
        Ok(extracted)
    }
}

/// Parse a raw model answer, with or without Markdown fences.
pub fn parse_extraction(raw: &str) -> Result<ExtractedInvoice, serde_json::Error> {
    serde_json::from_str(strip_code_fences(raw))
}

/// Strip a surrounding ```` ```json ```` / ```` ``` ```` fence and any prose
/// around the JSON object.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed;
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner;
            }
        }
    }

    // Try to find object bounds
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return &trimmed[start..=end];
    }

    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::CompletionResponse;
    use crate::store::models::DocumentType;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    const SAMPLE: &str = r#"{
        "supplier": {"name": "Sigma Coatings", "vat_number": "BE0123456789", "iban": null},
        "invoice": {"number": "F2024-118", "date": "2024-03-14", "document_type": "factuur"},
        "totals": {"subtotal_excl_vat": 100.00, "vat_amount": 21.00, "total_amount": 121.00},
        "payment": {"iban": "BE68539007547034", "payment_reference": "+++123/4567/89012+++"},
        "line_items": [
            {"sku": "SC-5", "name": "Sigmatone 5L", "quantity": 2, "unit": "st",
             "gross_unit_price": 55.00, "discount": 5.00, "unit_price": 50.00,
             "total_price": 100.00, "vat_rate": 21}
        ],
        "confidence": 0.95,
        "notes": null
    }"#;

    /// Mock LLM returning a fixed answer and recording the last request.
    struct MockExtractionLlm {
        response: Result<String, String>,
        last_request: Mutex<Option<CompletionRequest>>,
    }

    impl MockExtractionLlm {
        fn answering(response: &str) -> Self {
            Self {
                response: Ok(response.to_string()),
                last_request: Mutex::new(None),
            }
        }

        fn failing(reason: &str) -> Self {
            Self {
                response: Err(reason.to_string()),
                last_request: Mutex::new(None),
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for MockExtractionLlm {
        fn model_name(&self) -> &str {
            "mock-extraction"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            *self.last_request.lock().unwrap() = Some(request);
            match &self.response {
                Ok(content) => Ok(CompletionResponse {
                    content: content.clone(),
                    input_tokens: 100,
                    output_tokens: 50,
                }),
                Err(reason) => Err(LlmError::RequestFailed {
                    provider: "mock".into(),
                    reason: reason.clone(),
                }),
            }
        }
    }

    // ── Fence stripping ─────────────────────────────────────────────

    #[test]
    fn fenced_and_plain_answers_parse_identically() {
        let plain = parse_extraction(SAMPLE).unwrap();
        let json_fenced = parse_extraction(&format!("```json\n{SAMPLE}\n```")).unwrap();
        let bare_fenced = parse_extraction(&format!("```\n{SAMPLE}\n```")).unwrap();

        assert_eq!(plain, json_fenced);
        assert_eq!(plain, bare_fenced);
        assert_eq!(plain.confidence, 0.95);
    }

    #[test]
    fn strips_prose_around_object() {
        let raw = "Here is the data:\n{\"confidence\": 0.5}\nLet me know!";
        assert_eq!(strip_code_fences(raw), "{\"confidence\": 0.5}");
    }

    #[test]
    fn plain_object_is_untouched() {
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn parses_full_sample() {
        let parsed = parse_extraction(SAMPLE).unwrap();
        assert_eq!(parsed.supplier.name.as_deref(), Some("Sigma Coatings"));
        assert_eq!(parsed.invoice.number.as_deref(), Some("F2024-118"));
        assert_eq!(parsed.document_type(), DocumentType::Factuur);
        assert_eq!(parsed.totals.total_amount, Some(dec!(121.00)));
        assert_eq!(parsed.iban(), Some("BE68539007547034"));
        assert_eq!(parsed.line_items.len(), 1);
        assert_eq!(parsed.line_items[0].unit_price, Some(dec!(50.00)));
        assert_eq!(parsed.line_items[0].total_price, Some(dec!(100.00)));
    }

    // ── Extractor behaviour ─────────────────────────────────────────

    #[tokio::test]
    async fn extract_sends_low_temperature_json_request() {
        let llm = Arc::new(MockExtractionLlm::answering(&format!("```json\n{SAMPLE}\n```")));
        let extractor = StructuredExtractor::new(Some(llm.clone()));

        let result = extractor.extract("FACTUUR Sigma Coatings").await;
        assert_eq!(result.confidence, 0.95);

        let request = llm.last_request.lock().unwrap().take().unwrap();
        assert_eq!(request.temperature, Some(0.1));
        assert_eq!(request.response_format, ResponseFormat::Json);
        assert!(request.system_text().unwrap().contains("line_items"));
        assert!(request.messages.last().unwrap().content.contains("FACTUUR Sigma Coatings"));
    }

    #[tokio::test]
    async fn missing_provider_degrades() {
        let result = StructuredExtractor::disabled().extract("anything").await;
        assert_eq!(result.supplier.name.as_deref(), Some("Unknown"));
        assert_eq!(result.confidence, 0.3);
        assert!(result.notes.unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn http_failure_degrades() {
        let llm = Arc::new(MockExtractionLlm::failing("HTTP 503 Service Unavailable"));
        let result = StructuredExtractor::new(Some(llm)).extract("text").await;
        assert_eq!(result.confidence, 0.3);
        assert!(result.line_items.is_empty());
        assert!(result.notes.unwrap().contains("HTTP 503"));
    }

    #[tokio::test]
    async fn unparsable_answer_degrades() {
        let llm = Arc::new(MockExtractionLlm::answering("I could not read this document."));
        let result = StructuredExtractor::new(Some(llm)).extract("").await;
        assert_eq!(result.document_type(), DocumentType::Onbekend);
        assert_eq!(result.confidence, 0.3);
        assert!(result.notes.unwrap().contains("JSON"));
    }
}
