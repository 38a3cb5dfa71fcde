//! Structured result of invoice extraction.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use super::numbers::{lenient_decimal, lenient_string};
use crate::store::models::{DocumentType, LineItem};

/// Confidence reported for degraded results.
pub const DEGRADED_CONFIDENCE: f64 = 0.3;

/// Supplier name used when nothing could be extracted.
pub const UNKNOWN_SUPPLIER: &str = "Unknown";

/// Everything the extractor pulls out of one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedInvoice {
    #[serde(default, deserialize_with = "null_as_default")]
    pub supplier: SupplierBlock,
    #[serde(default, deserialize_with = "null_as_default")]
    pub invoice: InvoiceBlock,
    #[serde(default, deserialize_with = "null_as_default")]
    pub totals: TotalsBlock,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payment: PaymentBlock,
    #[serde(default, deserialize_with = "lenient_line_items")]
    pub line_items: Vec<LineItem>,
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: f64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplierBlock {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub vat_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub iban: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bic: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceBlock {
    #[serde(default, deserialize_with = "lenient_string")]
    pub number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub due_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub reference: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub document_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TotalsBlock {
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub subtotal_excl_vat: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub vat_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub discount_total: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub total_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentBlock {
    #[serde(default, deserialize_with = "lenient_string")]
    pub iban: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bic: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub payment_reference: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub payment_terms: Option<String>,
}

impl ExtractedInvoice {
    /// Best-effort structure returned when extraction could not run or failed.
    pub fn degraded(cause: impl Into<String>) -> Self {
        Self {
            supplier: SupplierBlock {
                name: Some(UNKNOWN_SUPPLIER.to_string()),
                ..SupplierBlock::default()
            },
            invoice: InvoiceBlock {
                document_type: Some("unknown".to_string()),
                ..InvoiceBlock::default()
            },
            totals: TotalsBlock::default(),
            payment: PaymentBlock::default(),
            line_items: Vec::new(),
            confidence: DEGRADED_CONFIDENCE,
            notes: Some(cause.into()),
        }
    }

    pub fn document_type(&self) -> DocumentType {
        self.invoice
            .document_type
            .as_deref()
            .map(DocumentType::from_label)
            .unwrap_or_default()
    }

    /// Supplier name, unless it is missing or the degraded placeholder.
    pub fn known_supplier_name(&self) -> Option<&str> {
        self.supplier
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty() && !n.eq_ignore_ascii_case(UNKNOWN_SUPPLIER))
    }

    /// IBAN from the payment block, falling back to the supplier block.
    pub fn iban(&self) -> Option<&str> {
        self.payment.iban.as_deref().or(self.supplier.iban.as_deref())
    }

    pub fn bic(&self) -> Option<&str> {
        self.payment.bic.as_deref().or(self.supplier.bic.as_deref())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Line items that fail to parse individually are dropped, not fatal.
fn lenient_line_items<'de, D>(deserializer: D) -> Result<Vec<LineItem>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(serde_json::Value::Array(items)) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Confidence as a 0–1 float. Percentages (`95`) are scaled down.
fn lenient_confidence<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let raw = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    };
    Ok(raw.map(normalize_confidence).unwrap_or(0.0))
}

fn normalize_confidence(raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    let scaled = if raw > 1.0 && raw <= 100.0 {
        raw / 100.0
    } else {
        raw
    };
    scaled.clamp(0.0, 1.0)
}
