//! Persisted entities: tenants, users, invoices, suppliers, notifications.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extraction::numbers::{lenient_decimal, lenient_string};

/// A tenant. Looked up by its inbound address; never written by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub inbound_email_address: String,
}

impl Company {
    pub fn new(name: impl Into<String>, inbound_email_address: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            inbound_email_address: inbound_email_address.into().trim().to_lowercase(),
        }
    }
}

/// Role of a user inside their company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyRole {
    Owner,
    Admin,
    Member,
}

impl CompanyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    /// Owners and admins receive invoice notifications.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

impl std::str::FromStr for CompanyRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            other => Err(format!("unknown company role: {other}")),
        }
    }
}

/// A user belonging to a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyUser {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub company_role: CompanyRole,
}

impl CompanyUser {
    pub fn new(company_id: Uuid, email: impl Into<String>, role: CompanyRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id,
            email: email.into(),
            full_name: None,
            company_role: role,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.full_name = Some(name.into());
        self
    }
}

/// Review bucket assigned to an invoice when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    PendingReview,
    NeedsQuickReview,
    NeedsManualReview,
    ProcessingError,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::NeedsQuickReview => "needs_quick_review",
            Self::NeedsManualReview => "needs_manual_review",
            Self::ProcessingError => "processing_error",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_review" => Ok(Self::PendingReview),
            "needs_quick_review" => Ok(Self::NeedsQuickReview),
            "needs_manual_review" => Ok(Self::NeedsManualReview),
            "processing_error" => Ok(Self::ProcessingError),
            other => Err(format!("unknown invoice status: {other}")),
        }
    }
}

/// Kind of document a supplier sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Factuur,
    Creditnota,
    Leveringsbon,
    Pakbon,
    Afhaalbon,
    Bestelbon,
    Offerte,
    #[default]
    Onbekend,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Factuur => "factuur",
            Self::Creditnota => "creditnota",
            Self::Leveringsbon => "leveringsbon",
            Self::Pakbon => "pakbon",
            Self::Afhaalbon => "afhaalbon",
            Self::Bestelbon => "bestelbon",
            Self::Offerte => "offerte",
            Self::Onbekend => "onbekend",
        }
    }

    /// Lenient parse of a label produced by the extractor.
    ///
    /// Accepts the Dutch labels, common English equivalents, and maps
    /// anything else (including `"unknown"`) to `Onbekend`.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "factuur" | "invoice" => Self::Factuur,
            "creditnota" | "credit_nota" | "credit_note" | "creditnote" => Self::Creditnota,
            "leveringsbon" | "delivery_note" => Self::Leveringsbon,
            "pakbon" | "packing_slip" => Self::Pakbon,
            "afhaalbon" | "pickup_note" => Self::Afhaalbon,
            "bestelbon" | "purchase_order" | "order" => Self::Bestelbon,
            "offerte" | "quote" | "quotation" => Self::Offerte,
            _ => Self::Onbekend,
        }
    }
}

/// One invoice line. Values are passed through from the extractor verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub sku: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub quantity: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub gross_unit_price: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub discount: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub unit_price: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub total_price: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub vat_rate: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: Option<String>,
}

/// A supplier document ingested from email. Append-only from the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierInvoice {
    pub id: Uuid,
    pub company_id: Uuid,
    pub supplier_name: Option<String>,
    pub supplier_email: Option<String>,
    pub supplier_address: Option<String>,
    pub supplier_vat_number: Option<String>,
    pub supplier_iban: Option<String>,
    pub supplier_bic: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub due_date: Option<String>,
    pub reference: Option<String>,
    pub document_type: DocumentType,
    pub total_amount: Decimal,
    pub subtotal_excl_vat: Option<Decimal>,
    pub vat_amount: Option<Decimal>,
    pub discount_total: Option<Decimal>,
    pub line_items: Vec<LineItem>,
    pub status: InvoiceStatus,
    pub confidence_score: f64,
    pub pdf_file_url: Option<String>,
    pub original_filename: Option<String>,
    pub source: String,
    pub original_email_subject: Option<String>,
    pub original_email_from: Option<String>,
    pub ocr_raw_text: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SupplierInvoice {
    /// An empty record for `company_id` with the given status.
    ///
    /// Builders in `pipeline::records` fill in the rest.
    pub fn blank(company_id: Uuid, status: InvoiceStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id,
            supplier_name: None,
            supplier_email: None,
            supplier_address: None,
            supplier_vat_number: None,
            supplier_iban: None,
            supplier_bic: None,
            invoice_number: None,
            invoice_date: None,
            due_date: None,
            reference: None,
            document_type: DocumentType::Onbekend,
            total_amount: Decimal::ZERO,
            subtotal_excl_vat: None,
            vat_amount: None,
            discount_total: None,
            line_items: Vec::new(),
            status,
            confidence_score: 0.0,
            pdf_file_url: None,
            original_filename: None,
            source: "email".to_string(),
            original_email_subject: None,
            original_email_from: None,
            ocr_raw_text: None,
            notes: None,
            created_at: Utc::now(),
        }
    }
}

/// A supplier known to a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub vat_number: Option<String>,
    pub iban: Option<String>,
    pub bic: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Supplier {
    pub fn new(company_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            company_id,
            name: name.into(),
            email: None,
            phone: None,
            address: None,
            vat_number: None,
            iban: None,
            bic: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Lookup key for case-insensitive name matching, with full Unicode
    /// case folding and whitespace collapsed.
    pub fn name_key(name: &str) -> String {
        name.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// Notification kind emitted by this service.
pub const NOTIFICATION_INVOICE_RECEIVED: &str = "invoice_received";

/// An in-app notification for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub recipient_email: String,
    pub company_id: Uuid,
    pub kind: String,
    pub message: String,
    pub link_to: Option<String>,
    pub read: bool,
    pub triggering_user_name: Option<String>,
    pub created_at: DateTime<Utc>,
}
