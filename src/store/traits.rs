//! `Database` trait, the single async interface for all persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::models::{
    Company, CompanyUser, Notification, Supplier, SupplierInvoice,
};

/// Backend-agnostic tenant store. Every read and write is scoped by company.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Tenants ─────────────────────────────────────────────────────

    async fn insert_company(&self, company: &Company) -> Result<(), DatabaseError>;

    /// Case-insensitive exact match on the inbound address.
    async fn find_company_by_inbound_address(
        &self,
        address: &str,
    ) -> Result<Option<Company>, DatabaseError>;

    async fn insert_user(&self, user: &CompanyUser) -> Result<(), DatabaseError>;

    /// Users of the company with role `admin` or `owner`.
    async fn list_company_admins(&self, company_id: Uuid)
    -> Result<Vec<CompanyUser>, DatabaseError>;

    // ── Invoices ────────────────────────────────────────────────────

    async fn insert_invoice(&self, invoice: &SupplierInvoice) -> Result<(), DatabaseError>;

    async fn get_invoice(
        &self,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<SupplierInvoice>, DatabaseError>;

    /// Newest first.
    async fn list_invoices(&self, company_id: Uuid) -> Result<Vec<SupplierInvoice>, DatabaseError>;

    // ── Suppliers ───────────────────────────────────────────────────

    /// Case-insensitive exact match on the supplier name within a company.
    async fn find_supplier_by_name(
        &self,
        company_id: Uuid,
        name: &str,
    ) -> Result<Option<Supplier>, DatabaseError>;

    async fn insert_supplier(&self, supplier: &Supplier) -> Result<(), DatabaseError>;

    /// Overwrite the contact and banking fields of an existing supplier.
    async fn update_supplier(&self, supplier: &Supplier) -> Result<(), DatabaseError>;

    async fn list_suppliers(&self, company_id: Uuid) -> Result<Vec<Supplier>, DatabaseError>;

    // ── Notifications ───────────────────────────────────────────────

    async fn insert_notification(&self, notification: &Notification) -> Result<(), DatabaseError>;

    async fn list_notifications(
        &self,
        company_id: Uuid,
    ) -> Result<Vec<Notification>, DatabaseError>;
}
