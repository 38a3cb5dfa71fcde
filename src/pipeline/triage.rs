//! Confidence-based triage.

use crate::store::models::InvoiceStatus;

/// Minimum confidence for `pending_review`.
pub const PENDING_REVIEW_THRESHOLD: f64 = 0.9;

/// Minimum confidence for `needs_quick_review`.
pub const QUICK_REVIEW_THRESHOLD: f64 = 0.7;

/// Map an extraction confidence to the review bucket. Boundaries belong to
/// the higher tier; NaN is treated as lowest confidence.
pub fn status_for_confidence(confidence: f64) -> InvoiceStatus {
    if confidence >= PENDING_REVIEW_THRESHOLD {
        InvoiceStatus::PendingReview
    } else if confidence >= QUICK_REVIEW_THRESHOLD {
        InvoiceStatus::NeedsQuickReview
    } else {
        InvoiceStatus::NeedsManualReview
    }
}
