//! Invoice record builders and the record writer.
//!
//! Every attachment leaves exactly one row: a triaged extraction, a
//! placeholder when the PDF could not be obtained, or a `processing_error`
//! row carrying the failure. An email without PDFs yields one manual-review
//! row built from the message itself.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::extraction::ExtractedInvoice;
use crate::pipeline::triage::status_for_confidence;
use crate::pipeline::types::{InboundEmail, InvoiceSummary};
use crate::store::Database;
use crate::store::models::{InvoiceStatus, SupplierInvoice};

/// Characters of OCR text kept on the record.
pub const MAX_OCR_TEXT_CHARS: usize = 10_000;

/// Characters of email body kept in the notes of an email-only record.
pub const MAX_BODY_CHARS: usize = 10_000;

static SCRIPT_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());
static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</(p|div|tr|li|h[1-6])>").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n+").unwrap());

/// Keep the first `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Reduce an HTML body to readable text.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_STYLE.replace_all(html, "");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    BLANK_LINES
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Body text of the email: the text part, or the HTML part reduced to text.
fn email_body(email: &InboundEmail) -> String {
    match (&email.text, &email.html) {
        (Some(text), _) if !text.trim().is_empty() => text.trim().to_string(),
        (_, Some(html)) => html_to_text(html),
        _ => String::new(),
    }
}

fn record_for(
    company_id: Uuid,
    email: &InboundEmail,
    filename: Option<&str>,
    status: InvoiceStatus,
) -> SupplierInvoice {
    let mut record = SupplierInvoice::blank(company_id, status);
    record.original_filename = filename.map(str::to_string);
    record.original_email_subject = Some(email.subject.clone()).filter(|s| !s.is_empty());
    record.original_email_from = Some(email.from.formatted()).filter(|s| !s.is_empty());
    record
}

/// Record for a successfully processed attachment.
pub fn from_extraction(
    company_id: Uuid,
    email: &InboundEmail,
    filename: &str,
    pdf_file_url: &str,
    ocr_text: &str,
    extracted: &ExtractedInvoice,
) -> SupplierInvoice {
    let status = status_for_confidence(extracted.confidence);
    let mut record = record_for(company_id, email, Some(filename), status);

    record.supplier_name = extracted.supplier.name.clone();
    record.supplier_email = extracted.supplier.email.clone();
    record.supplier_address = extracted.supplier.address.clone();
    record.supplier_vat_number = extracted.supplier.vat_number.clone();
    record.supplier_iban = extracted.iban().map(str::to_string);
    record.supplier_bic = extracted.bic().map(str::to_string);

    record.invoice_number = extracted.invoice.number.clone();
    record.invoice_date = extracted.invoice.date.clone();
    record.due_date = extracted.invoice.due_date.clone();
    record.reference = extracted
        .invoice
        .reference
        .clone()
        .or_else(|| extracted.payment.payment_reference.clone());
    record.document_type = extracted.document_type();

    record.total_amount = extracted.totals.total_amount.unwrap_or(Decimal::ZERO);
    record.subtotal_excl_vat = extracted.totals.subtotal_excl_vat;
    record.vat_amount = extracted.totals.vat_amount;
    record.discount_total = extracted.totals.discount_total;
    record.line_items = extracted.line_items.clone();

    record.confidence_score = extracted.confidence;
    record.pdf_file_url = Some(pdf_file_url.to_string());
    record.ocr_raw_text = Some(truncate_chars(ocr_text, MAX_OCR_TEXT_CHARS));
    record.notes = extracted.notes.clone();
    record
}

/// Record for a PDF whose bytes could not be obtained.
pub fn placeholder(
    company_id: Uuid,
    email: &InboundEmail,
    filename: &str,
    reason: &str,
) -> SupplierInvoice {
    let mut record = record_for(
        company_id,
        email,
        Some(filename),
        InvoiceStatus::NeedsManualReview,
    );
    record.supplier_name = Some(email.from.label().to_string()).filter(|s| !s.is_empty());
    record.supplier_email = Some(email.from.address.clone()).filter(|s| !s.is_empty());
    record.notes = Some(format!(
        "The PDF attachment \"{filename}\" could not be retrieved ({reason}). \
         Open the original email and enter this invoice manually."
    ));
    record
}

/// Record for an attachment whose processing failed.
pub fn processing_error(
    company_id: Uuid,
    email: &InboundEmail,
    filename: &str,
    error: &str,
) -> SupplierInvoice {
    let mut record = record_for(
        company_id,
        email,
        Some(filename),
        InvoiceStatus::ProcessingError,
    );
    record.notes = Some(error.to_string());
    record
}

/// Record for an email that carried no PDF attachments.
pub fn email_only(company_id: Uuid, email: &InboundEmail) -> SupplierInvoice {
    let mut record = record_for(company_id, email, None, InvoiceStatus::NeedsManualReview);
    record.supplier_name = Some(email.from.label().to_string()).filter(|s| !s.is_empty());
    record.supplier_email = Some(email.from.address.clone()).filter(|s| !s.is_empty());

    let body = truncate_chars(&email_body(email), MAX_BODY_CHARS);
    let subject = if email.subject.is_empty() {
        "(no subject)"
    } else {
        email.subject.as_str()
    };
    record.notes = Some(format!(
        "Email received without a PDF attachment.\n\nSubject: {subject}\n\n{body}"
    ));
    record
}

/// Response summary for a written record.
pub fn summarize(record: &SupplierInvoice) -> InvoiceSummary {
    InvoiceSummary {
        id: record.id,
        supplier: record
            .supplier_name
            .clone()
            .unwrap_or_else(|| "Unknown".to_string()),
        total: record.total_amount,
    }
}

/// Persists invoice records, one insert per record, scoped by company.
#[derive(Clone)]
pub struct InvoiceRecordWriter {
    db: Arc<dyn Database>,
}

impl InvoiceRecordWriter {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    pub async fn write(&self, record: &SupplierInvoice) -> Result<(), DatabaseError> {
        self.db.insert_invoice(record).await?;
        info!(
            invoice_id = %record.id,
            company_id = %record.company_id,
            status = %record.status,
            filename = record.original_filename.as_deref().unwrap_or("-"),
            "Invoice record created"
        );
        Ok(())
    }
}
