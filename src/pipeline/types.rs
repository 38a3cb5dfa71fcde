//! Shared types for the invoice processing pipeline.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

// ── Inbound email ───────────────────────────────────────────────────

/// Canonical inbound email, whatever envelope the provider used.
///
/// Exists only for the duration of one webhook request.
#[derive(Debug, Clone, Default)]
pub struct InboundEmail {
    /// Normalised (lowercase, trimmed) recipient address.
    pub to: Option<String>,
    pub from: EmailAddress,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<RawAttachment>,
    /// Provider id of the email, used to re-fetch attachment content.
    pub provider_message_id: Option<String>,
}

impl InboundEmail {
    /// Attachments that look like PDFs, in arrival order.
    pub fn pdf_attachments(&self) -> Vec<&RawAttachment> {
        self.attachments.iter().filter(|a| a.is_pdf()).collect()
    }
}

/// A sender or recipient address with optional display name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailAddress {
    pub address: String,
    pub name: Option<String>,
}

impl EmailAddress {
    pub fn new(address: &str, name: Option<&str>) -> Self {
        Self {
            address: address.trim().to_lowercase(),
            name: name
                .map(|n| n.trim().trim_matches('"').trim().to_string())
                .filter(|n| !n.is_empty()),
        }
    }

    /// Parse `addr@host` or `Display Name <addr@host>`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let (Some(open), true) = (raw.rfind('<'), raw.ends_with('>')) {
            let address = &raw[open + 1..raw.len() - 1];
            if address.trim().is_empty() {
                return None;
            }
            return Some(Self::new(address, Some(&raw[..open])));
        }
        Some(Self::new(raw, None))
    }

    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
    }

    /// Display name if known, otherwise the address.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }

    /// `Name <address>` or just the address.
    pub fn formatted(&self) -> String {
        match &self.name {
            Some(name) => format!("{name} <{}>", self.address),
            None => self.address.clone(),
        }
    }
}

/// An attachment as delivered by the webhook. Never persisted as-is.
#[derive(Debug, Clone, Default)]
pub struct RawAttachment {
    pub filename: String,
    pub content_type: Option<String>,
    /// Inline base64 payload, when the provider included it.
    pub content: Option<String>,
    pub provider_attachment_id: Option<String>,
}

impl RawAttachment {
    /// PDF by content type or by `.pdf` suffix, both case-insensitive.
    pub fn is_pdf(&self) -> bool {
        let by_type = self
            .content_type
            .as_deref()
            .map(|ct| ct.trim().to_ascii_lowercase().starts_with("application/pdf"))
            .unwrap_or(false);
        by_type || self.filename.trim().to_ascii_lowercase().ends_with(".pdf")
    }
}

// ── Outcomes ────────────────────────────────────────────────────────

/// Short description of a created invoice row, returned to the webhook caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceSummary {
    pub id: Uuid,
    pub supplier: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

/// Result of running the pipeline for one email.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// The payload carried no usable recipient address.
    MissingRecipient,
    /// No tenant owns the recipient address. Nothing was written.
    CompanyNotFound { email: String },
    /// The email had no PDF attachments; one manual-review record was created.
    EmailOnly { invoice_id: Uuid },
    /// One record per PDF attachment (fewer only if an error record itself
    /// could not be written).
    Invoices(Vec<InvoiceSummary>),
}
