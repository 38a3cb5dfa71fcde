//! Error types for the invoice inbox.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("HTTP client could not be built: {0}")]
    HttpClient(String),
}

/// Tenant store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Inbound webhook payload errors.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),
}

/// Attachment content could not be turned into PDF bytes.
#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("PDF content for {filename} could not be retrieved: {reason}")]
    Unavailable { filename: String, reason: String },

    #[error("Email provider request failed: {0}")]
    Provider(String),
}

/// Object storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Upload of {key} failed: {reason}")]
    UploadFailed { key: String, reason: String },

    #[error("Upload of {key} rejected with status {status}: {body}")]
    Rejected {
        key: String,
        status: u16,
        body: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// OCR provider errors.
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("OCR API key not configured")]
    NotConfigured,

    #[error("OCR request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("OCR request timed out after {0:?}")]
    Timeout(Duration),

    #[error("OCR transport error: {0}")]
    Http(String),

    #[error("Invalid OCR response: {0}")]
    InvalidResponse(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM API key not configured")]
    NotConfigured,

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while processing a single attachment or email.
///
/// Anything surfacing from the attachment loop is recorded as a
/// `processing_error` invoice row rather than returned to the caller.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Attachment(#[from] AttachmentError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
