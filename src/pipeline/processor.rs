//! Inbound invoice pipeline: one webhook email in, invoice rows out.
//!
//! Flow:
//! 1. Resolve the tenant from the recipient address
//! 2. Classify attachments; an email without PDFs becomes one manual-review row
//! 3. Per PDF, sequentially: content → storage → OCR → extraction → row → supplier
//! 4. Notify the tenant's admins about the batch
//!
//! Each attachment has its own error boundary. A failure turns into a
//! `processing_error` row for that attachment and the loop continues.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::channels::provider::EmailProvider;
use crate::error::{AttachmentError, DatabaseError, PipelineError};
use crate::extraction::StructuredExtractor;
use crate::ocr::OcrEngine;
use crate::pipeline::attachments::AttachmentContentResolver;
use crate::pipeline::notifier::AdminNotifier;
use crate::pipeline::records::{self, InvoiceRecordWriter};
use crate::pipeline::suppliers::SupplierReconciler;
use crate::pipeline::types::{InboundEmail, InvoiceSummary, PipelineOutcome, RawAttachment};
use crate::storage::PdfStore;
use crate::store::Database;
use crate::store::models::{Company, SupplierInvoice};

/// The whole per-email pipeline with its collaborators.
pub struct InvoicePipeline {
    db: Arc<dyn Database>,
    resolver: AttachmentContentResolver,
    store: Arc<dyn PdfStore>,
    ocr: Arc<dyn OcrEngine>,
    extractor: StructuredExtractor,
    writer: InvoiceRecordWriter,
    suppliers: SupplierReconciler,
    notifier: AdminNotifier,
}

impl InvoicePipeline {
    pub fn new(
        db: Arc<dyn Database>,
        store: Arc<dyn PdfStore>,
        ocr: Arc<dyn OcrEngine>,
        extractor: StructuredExtractor,
        email_provider: Option<Arc<dyn EmailProvider>>,
    ) -> Self {
        Self {
            resolver: AttachmentContentResolver::new(email_provider),
            writer: InvoiceRecordWriter::new(db.clone()),
            suppliers: SupplierReconciler::new(db.clone()),
            notifier: AdminNotifier::new(db.clone()),
            db,
            store,
            ocr,
            extractor,
        }
    }

    /// Case-insensitive exact match of the recipient on the inbound address.
    pub async fn resolve_company(&self, recipient: &str) -> Result<Option<Company>, DatabaseError> {
        self.db
            .find_company_by_inbound_address(recipient.trim())
            .await
    }

    /// Run the pipeline for one email.
    ///
    /// Errors are only returned for failures outside the attachment loop
    /// (tenant lookup, the email-only insert).
    pub async fn process(&self, email: InboundEmail) -> Result<PipelineOutcome, PipelineError> {
        let Some(recipient) = email.to.as_deref().filter(|to| !to.trim().is_empty()) else {
            warn!("Inbound email without recipient");
            return Ok(PipelineOutcome::MissingRecipient);
        };

        let Some(company) = self.resolve_company(recipient).await? else {
            warn!(recipient, "No company for inbound address");
            return Ok(PipelineOutcome::CompanyNotFound {
                email: recipient.to_string(),
            });
        };

        let pdfs = email.pdf_attachments();
        info!(
            company_id = %company.id,
            from = %email.from.address,
            attachments = email.attachments.len(),
            pdfs = pdfs.len(),
            "Processing inbound email"
        );

        let triggered_by = Some(email.from.label()).filter(|s| !s.is_empty());

        if pdfs.is_empty() {
            let record = records::email_only(company.id, &email);
            self.writer.write(&record).await?;
            self.notifier
                .notify(&company, &[records::summarize(&record)], triggered_by)
                .await;
            return Ok(PipelineOutcome::EmailOnly {
                invoice_id: record.id,
            });
        }

        let mut created: Vec<InvoiceSummary> = Vec::with_capacity(pdfs.len());
        for attachment in pdfs {
            match self.run_attachment(&company, &email, attachment).await {
                Ok(record) => created.push(records::summarize(&record)),
                Err(e) => {
                    error!(
                        company_id = %company.id,
                        filename = %attachment.filename,
                        error = %e,
                        "Attachment processing failed"
                    );
                    let record = records::processing_error(
                        company.id,
                        &email,
                        &attachment.filename,
                        &e.to_string(),
                    );
                    match self.writer.write(&record).await {
                        Ok(()) => created.push(records::summarize(&record)),
                        Err(write_err) => error!(
                            company_id = %company.id,
                            filename = %attachment.filename,
                            error = %write_err,
                            "Failed to record processing error, skipping attachment"
                        ),
                    }
                }
            }
        }

        self.notifier.notify(&company, &created, triggered_by).await;
        Ok(PipelineOutcome::Invoices(created))
    }

    /// Process one PDF attachment to a persisted row.
    async fn run_attachment(
        &self,
        company: &Company,
        email: &InboundEmail,
        attachment: &RawAttachment,
    ) -> Result<SupplierInvoice, PipelineError> {
        let bytes = match self
            .resolver
            .resolve(attachment, email.provider_message_id.as_deref())
            .await
        {
            Ok(bytes) => bytes,
            Err(AttachmentError::Unavailable { reason, .. }) => {
                warn!(
                    company_id = %company.id,
                    filename = %attachment.filename,
                    reason = %reason,
                    "PDF content unavailable, creating placeholder"
                );
                let record = records::placeholder(company.id, email, &attachment.filename, &reason);
                self.writer.write(&record).await?;
                return Ok(record);
            }
            Err(e) => return Err(e.into()),
        };

        let pdf_url = self
            .store
            .put(company.id, &attachment.filename, &bytes)
            .await?;
        debug!(filename = %attachment.filename, url = %pdf_url, "PDF stored");

        let text = self.ocr.extract_text(&bytes).await?;
        debug!(filename = %attachment.filename, chars = text.len(), "OCR complete");

        let extracted = self.extractor.extract(&text).await;
        let record = records::from_extraction(
            company.id,
            email,
            &attachment.filename,
            &pdf_url,
            &text,
            &extracted,
        );
        self.writer.write(&record).await?;

        self.suppliers.reconcile(company.id, &extracted).await;
        Ok(record)
    }
}
