//! Inbound invoice pipeline.
//!
//! Every inbound email flows through:
//! 1. `InvoicePipeline::resolve_company()`: recipient address to tenant
//! 2. `RawAttachment::is_pdf()`: attachment classification
//! 3. `AttachmentContentResolver`, `PdfStore`, `OcrEngine`, `StructuredExtractor` per PDF
//! 4. `InvoiceRecordWriter` + `SupplierReconciler`: persistence
//! 5. `AdminNotifier`: one notification per admin

pub mod attachments;
pub mod notifier;
pub mod processor;
pub mod records;
pub mod suppliers;
pub mod triage;
pub mod types;

pub use processor::InvoicePipeline;
pub use types::{EmailAddress, InboundEmail, InvoiceSummary, PipelineOutcome, RawAttachment};
