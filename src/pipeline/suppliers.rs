//! Supplier reconciliation.
//!
//! The supplier named on an extracted invoice is looked up per company by
//! case-insensitive name. Known suppliers only get fields filled in or
//! replaced by non-empty new values; unknown ones are created active.
//! Failures are logged and never reach the caller.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::extraction::ExtractedInvoice;
use crate::store::Database;
use crate::store::models::Supplier;

/// What reconciliation did, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplierAction {
    Created(Uuid),
    Updated(Uuid),
    Unchanged(Uuid),
    /// No usable supplier name on the extraction.
    Skipped,
    /// The store failed; the error was logged.
    Failed,
}

/// Contact and banking fields taken from an extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SupplierDetails<'a> {
    email: Option<&'a str>,
    phone: Option<&'a str>,
    address: Option<&'a str>,
    vat_number: Option<&'a str>,
    iban: Option<&'a str>,
    bic: Option<&'a str>,
}

impl<'a> SupplierDetails<'a> {
    fn from_extraction(extracted: &'a ExtractedInvoice) -> Self {
        Self {
            email: extracted.supplier.email.as_deref(),
            phone: extracted.supplier.phone.as_deref(),
            address: extracted.supplier.address.as_deref(),
            vat_number: extracted.supplier.vat_number.as_deref(),
            iban: extracted.iban(),
            bic: extracted.bic(),
        }
    }

    /// Apply non-empty values. Returns whether anything changed.
    fn apply_to(&self, supplier: &mut Supplier) -> bool {
        let mut changed = false;
        changed |= merge_field(&mut supplier.email, self.email);
        changed |= merge_field(&mut supplier.phone, self.phone);
        changed |= merge_field(&mut supplier.address, self.address);
        changed |= merge_field(&mut supplier.vat_number, self.vat_number);
        changed |= merge_field(&mut supplier.iban, self.iban);
        changed |= merge_field(&mut supplier.bic, self.bic);
        changed
    }
}

/// Overwrite `slot` with `new` when `new` is non-empty and different.
fn merge_field(slot: &mut Option<String>, new: Option<&str>) -> bool {
    let Some(value) = new.map(str::trim).filter(|v| !v.is_empty()) else {
        return false;
    };
    if slot.as_deref() == Some(value) {
        return false;
    }
    *slot = Some(value.to_string());
    true
}

/// Case-insensitive supplier upsert, scoped by company.
#[derive(Clone)]
pub struct SupplierReconciler {
    db: Arc<dyn Database>,
}

impl SupplierReconciler {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Best-effort upsert. Never fails.
    pub async fn reconcile(&self, company_id: Uuid, extracted: &ExtractedInvoice) -> SupplierAction {
        let Some(name) = extracted.known_supplier_name() else {
            debug!(%company_id, "No supplier name extracted, skipping reconciliation");
            return SupplierAction::Skipped;
        };

        match self
            .upsert(company_id, name, SupplierDetails::from_extraction(extracted))
            .await
        {
            Ok(action) => action,
            Err(e) => {
                warn!(%company_id, supplier = name, error = %e, "Supplier reconciliation failed");
                SupplierAction::Failed
            }
        }
    }

    async fn upsert(
        &self,
        company_id: Uuid,
        name: &str,
        details: SupplierDetails<'_>,
    ) -> Result<SupplierAction, DatabaseError> {
        if let Some(mut existing) = self.db.find_supplier_by_name(company_id, name).await? {
            if !details.apply_to(&mut existing) {
                return Ok(SupplierAction::Unchanged(existing.id));
            }
            existing.updated_at = Utc::now();
            self.db.update_supplier(&existing).await?;
            debug!(%company_id, supplier_id = %existing.id, "Supplier updated");
            return Ok(SupplierAction::Updated(existing.id));
        }

        let mut supplier = Supplier::new(company_id, name);
        details.apply_to(&mut supplier);
        self.db.insert_supplier(&supplier).await?;
        info!(%company_id, supplier_id = %supplier.id, supplier = name, "Supplier created");
        Ok(SupplierAction::Created(supplier.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;
    use crate::store::models::Company;

    async fn setup() -> (Arc<dyn Database>, Company) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let company = Company::new("Acme", "in@acme.dev");
        db.insert_company(&company).await.unwrap();
        (db, company)
    }

    fn extraction(json: serde_json::Value) -> ExtractedInvoice {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn merge_only_overwrites_with_non_empty_values() {
        let mut slot = Some("old".to_string());
        assert!(!merge_field(&mut slot, None));
        assert!(!merge_field(&mut slot, Some("  ")));
        assert!(!merge_field(&mut slot, Some("old")));
        assert_eq!(slot.as_deref(), Some("old"));
        assert!(merge_field(&mut slot, Some(" new ")));
        assert_eq!(slot.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn same_supplier_in_different_case_is_one_row() {
        let (db, company) = setup().await;
        let reconciler = SupplierReconciler::new(db.clone());

        let first = reconciler
            .reconcile(
                company.id,
                &extraction(serde_json::json!({
                    "supplier": {"name": "Sigma Coatings", "vat_number": "BE0123456789", "email": "info@sigma.be"}
                })),
            )
            .await;
        let SupplierAction::Created(id) = first else {
            panic!("expected creation, got {first:?}");
        };

        let second = reconciler
            .reconcile(
                company.id,
                &extraction(serde_json::json!({
                    "supplier": {"name": "sigma coatings", "email": null, "vat_number": ""},
                    "payment": {"iban": "BE68539007547034"}
                })),
            )
            .await;
        assert_eq!(second, SupplierAction::Updated(id));

        let suppliers = db.list_suppliers(company.id).await.unwrap();
        assert_eq!(suppliers.len(), 1);
        let supplier = &suppliers[0];
        assert_eq!(supplier.name, "Sigma Coatings");
        assert_eq!(supplier.email.as_deref(), Some("info@sigma.be"));
        assert_eq!(supplier.vat_number.as_deref(), Some("BE0123456789"));
        assert_eq!(supplier.iban.as_deref(), Some("BE68539007547034"));
        assert!(supplier.is_active);
    }

    #[tokio::test]
    async fn accented_supplier_in_upper_case_is_one_row() {
        let (db, company) = setup().await;
        let reconciler = SupplierReconciler::new(db.clone());

        let first = reconciler
            .reconcile(
                company.id,
                &extraction(serde_json::json!({"supplier": {"name": "Société Électrique"}})),
            )
            .await;
        let SupplierAction::Created(id) = first else {
            panic!("expected creation, got {first:?}");
        };

        let second = reconciler
            .reconcile(
                company.id,
                &extraction(serde_json::json!({
                    "supplier": {"name": "SOCIÉTÉ ÉLECTRIQUE", "phone": "+32 2 555 01 01"}
                })),
            )
            .await;
        assert_eq!(second, SupplierAction::Updated(id));

        let suppliers = db.list_suppliers(company.id).await.unwrap();
        assert_eq!(suppliers.len(), 1);
        assert_eq!(suppliers[0].name, "Société Électrique");
        assert_eq!(suppliers[0].phone.as_deref(), Some("+32 2 555 01 01"));
    }

    #[tokio::test]
    async fn repeated_identical_extraction_is_unchanged() {
        let (db, company) = setup().await;
        let reconciler = SupplierReconciler::new(db);
        let extracted = extraction(serde_json::json!({"supplier": {"name": "Sigma", "bic": "GEBABEBB"}}));

        assert!(matches!(
            reconciler.reconcile(company.id, &extracted).await,
            SupplierAction::Created(_)
        ));
        assert!(matches!(
            reconciler.reconcile(company.id, &extracted).await,
            SupplierAction::Unchanged(_)
        ));
    }

    #[tokio::test]
    async fn unknown_or_missing_names_are_skipped() {
        let (db, company) = setup().await;
        let reconciler = SupplierReconciler::new(db.clone());

        let degraded = ExtractedInvoice::degraded("no key");
        assert_eq!(reconciler.reconcile(company.id, &degraded).await, SupplierAction::Skipped);
        assert_eq!(
            reconciler.reconcile(company.id, &ExtractedInvoice::default()).await,
            SupplierAction::Skipped
        );
        assert!(db.list_suppliers(company.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn suppliers_are_scoped_per_company() {
        let (db, a) = setup().await;
        let b = Company::new("Other", "in@other.dev");
        db.insert_company(&b).await.unwrap();
        let reconciler = SupplierReconciler::new(db.clone());
        let extracted = extraction(serde_json::json!({"supplier": {"name": "Sigma Coatings"}}));

        reconciler.reconcile(a.id, &extracted).await;
        reconciler.reconcile(b.id, &extracted).await;

        assert_eq!(db.list_suppliers(a.id).await.unwrap().len(), 1);
        assert_eq!(db.list_suppliers(b.id).await.unwrap().len(), 1);
    }
}
