//! OCR of PDF bytes into raw text.

pub mod vision;

pub use vision::VisionOcr;

use async_trait::async_trait;

use crate::error::OcrError;

/// Document text detection backend.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Full text of the document. An empty string when the document has no
    /// recognisable text.
    async fn extract_text(&self, pdf: &[u8]) -> Result<String, OcrError>;
}
