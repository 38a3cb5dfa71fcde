//! libSQL backend, the async `Database` trait implementation.
//!
//! Supports local file, in-memory and remote (`libsql://`) databases.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::models::{
    Company, CompanyRole, CompanyUser, DocumentType, InvoiceStatus, LineItem, Notification,
    Supplier, SupplierInvoice,
};
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Connect to a remote libSQL server and run migrations.
    pub async fn new_remote(url: &str, auth_token: Option<&SecretString>) -> Result<Self, DatabaseError> {
        let token = auth_token
            .map(|t| t.expose_secret().to_string())
            .unwrap_or_default();

        let db = libsql::Builder::new_remote(url.to_string(), token)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to connect to libSQL server: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(url = %url, "Remote database connected");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Try RFC 3339 first (our canonical write format)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // SQLite datetime('now') output
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_decimal_column(s: Option<String>) -> Option<Decimal> {
    s.and_then(|v| Decimal::from_str(&v).ok())
}

const COMPANY_COLUMNS: &str = "id, name, inbound_email_address";

fn row_to_company(row: &libsql::Row) -> Result<Company, libsql::Error> {
    let id: String = row.get(0)?;
    Ok(Company {
        id: parse_uuid(&id),
        name: row.get(1)?,
        inbound_email_address: row.get(2)?,
    })
}

const USER_COLUMNS: &str = "id, company_id, email, full_name, company_role";

fn row_to_user(row: &libsql::Row) -> Result<CompanyUser, libsql::Error> {
    let id: String = row.get(0)?;
    let company_id: String = row.get(1)?;
    let role: String = row.get(4)?;
    Ok(CompanyUser {
        id: parse_uuid(&id),
        company_id: parse_uuid(&company_id),
        email: row.get(2)?,
        full_name: row.get(3).ok(),
        company_role: role.parse().unwrap_or(CompanyRole::Member),
    })
}

const INVOICE_COLUMNS: &str = "id, company_id, supplier_name, supplier_email, supplier_address, \
    supplier_vat_number, supplier_iban, supplier_bic, invoice_number, invoice_date, due_date, \
    reference, document_type, total_amount, subtotal_excl_vat, vat_amount, discount_total, \
    line_items, status, confidence_score, pdf_file_url, original_filename, source, \
    original_email_subject, original_email_from, ocr_raw_text, notes, created_at";

/// Map a libsql Row to a SupplierInvoice.
///
/// Column order matches INVOICE_COLUMNS.
fn row_to_invoice(row: &libsql::Row) -> Result<SupplierInvoice, libsql::Error> {
    let id: String = row.get(0)?;
    let company_id: String = row.get(1)?;
    let document_type: String = row.get(12)?;
    let total: String = row.get(13)?;
    let line_items: String = row.get(17)?;
    let status: String = row.get(18)?;
    let created_at: String = row.get(27)?;

    Ok(SupplierInvoice {
        id: parse_uuid(&id),
        company_id: parse_uuid(&company_id),
        supplier_name: row.get(2).ok(),
        supplier_email: row.get(3).ok(),
        supplier_address: row.get(4).ok(),
        supplier_vat_number: row.get(5).ok(),
        supplier_iban: row.get(6).ok(),
        supplier_bic: row.get(7).ok(),
        invoice_number: row.get(8).ok(),
        invoice_date: row.get(9).ok(),
        due_date: row.get(10).ok(),
        reference: row.get(11).ok(),
        document_type: DocumentType::from_label(&document_type),
        total_amount: Decimal::from_str(&total).unwrap_or(Decimal::ZERO),
        subtotal_excl_vat: parse_decimal_column(row.get(14).ok()),
        vat_amount: parse_decimal_column(row.get(15).ok()),
        discount_total: parse_decimal_column(row.get(16).ok()),
        line_items: serde_json::from_str::<Vec<LineItem>>(&line_items).unwrap_or_default(),
        status: status.parse().unwrap_or(InvoiceStatus::NeedsManualReview),
        confidence_score: row.get::<f64>(19).unwrap_or(0.0),
        pdf_file_url: row.get(20).ok(),
        original_filename: row.get(21).ok(),
        source: row.get(22)?,
        original_email_subject: row.get(23).ok(),
        original_email_from: row.get(24).ok(),
        ocr_raw_text: row.get(25).ok(),
        notes: row.get(26).ok(),
        created_at: parse_datetime(&created_at),
    })
}

const SUPPLIER_COLUMNS: &str =
    "id, company_id, name, email, phone, address, vat_number, iban, bic, is_active, created_at, updated_at";

fn row_to_supplier(row: &libsql::Row) -> Result<Supplier, libsql::Error> {
    let id: String = row.get(0)?;
    let company_id: String = row.get(1)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;
    Ok(Supplier {
        id: parse_uuid(&id),
        company_id: parse_uuid(&company_id),
        name: row.get(2)?,
        email: row.get(3).ok(),
        phone: row.get(4).ok(),
        address: row.get(5).ok(),
        vat_number: row.get(6).ok(),
        iban: row.get(7).ok(),
        bic: row.get(8).ok(),
        is_active: row.get::<i64>(9).unwrap_or(1) != 0,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

const NOTIFICATION_COLUMNS: &str = "id, user_id, recipient_email, company_id, type, message, \
    link_to, read, triggering_user_name, created_at";

fn row_to_notification(row: &libsql::Row) -> Result<Notification, libsql::Error> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let company_id: String = row.get(3)?;
    let created_at: String = row.get(9)?;
    Ok(Notification {
        id: parse_uuid(&id),
        user_id: parse_uuid(&user_id),
        recipient_email: row.get(2)?,
        company_id: parse_uuid(&company_id),
        kind: row.get(4)?,
        message: row.get(5)?,
        link_to: row.get(6).ok(),
        read: row.get::<i64>(7).unwrap_or(0) != 0,
        triggering_user_name: row.get(8).ok(),
        created_at: parse_datetime(&created_at),
    })
}

/// Drain a result set through a row mapper.
async fn collect_rows<T>(
    mut rows: libsql::Rows,
    map: fn(&libsql::Row) -> Result<T, libsql::Error>,
    op: &str,
) -> Result<Vec<T>, DatabaseError> {
    let mut out = Vec::new();
    loop {
        match rows.next().await {
            Ok(Some(row)) => {
                out.push(map(&row).map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}")))?)
            }
            Ok(None) => break,
            Err(e) => return Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }
    Ok(out)
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Tenants ─────────────────────────────────────────────────────

    async fn insert_company(&self, company: &Company) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO companies (id, name, inbound_email_address) VALUES (?1, ?2, ?3)",
                params![
                    company.id.to_string(),
                    company.name.as_str(),
                    company.inbound_email_address.trim().to_lowercase(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_company: {e}")))?;
        Ok(())
    }

    async fn find_company_by_inbound_address(
        &self,
        address: &str,
    ) -> Result<Option<Company>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {COMPANY_COLUMNS} FROM companies WHERE lower(inbound_email_address) = lower(?1) LIMIT 1"
                ),
                params![address.trim()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_company_by_inbound_address: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_company(&row).map(Some).map_err(|e| {
                DatabaseError::Query(format!("find_company_by_inbound_address row parse: {e}"))
            }),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!(
                "find_company_by_inbound_address: {e}"
            ))),
        }
    }

    async fn insert_user(&self, user: &CompanyUser) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO company_users (id, company_id, email, full_name, company_role) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.id.to_string(),
                    user.company_id.to_string(),
                    user.email.as_str(),
                    user.full_name.as_deref(),
                    user.company_role.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_user: {e}")))?;
        Ok(())
    }

    async fn list_company_admins(
        &self,
        company_id: Uuid,
    ) -> Result<Vec<CompanyUser>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {USER_COLUMNS} FROM company_users WHERE company_id = ?1 AND company_role IN ('admin', 'owner') ORDER BY created_at"
                ),
                params![company_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_company_admins: {e}")))?;
        collect_rows(rows, row_to_user, "list_company_admins").await
    }

    // ── Invoices ────────────────────────────────────────────────────

    async fn insert_invoice(&self, invoice: &SupplierInvoice) -> Result<(), DatabaseError> {
        let line_items = serde_json::to_string(&invoice.line_items)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO supplier_invoices ({INVOICE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)"
                ),
                params![
                    invoice.id.to_string(),
                    invoice.company_id.to_string(),
                    invoice.supplier_name.as_deref(),
                    invoice.supplier_email.as_deref(),
                    invoice.supplier_address.as_deref(),
                    invoice.supplier_vat_number.as_deref(),
                    invoice.supplier_iban.as_deref(),
                    invoice.supplier_bic.as_deref(),
                    invoice.invoice_number.as_deref(),
                    invoice.invoice_date.as_deref(),
                    invoice.due_date.as_deref(),
                    invoice.reference.as_deref(),
                    invoice.document_type.as_str(),
                    invoice.total_amount.to_string(),
                    invoice.subtotal_excl_vat.map(|d| d.to_string()),
                    invoice.vat_amount.map(|d| d.to_string()),
                    invoice.discount_total.map(|d| d.to_string()),
                    line_items,
                    invoice.status.as_str(),
                    invoice.confidence_score,
                    invoice.pdf_file_url.as_deref(),
                    invoice.original_filename.as_deref(),
                    invoice.source.as_str(),
                    invoice.original_email_subject.as_deref(),
                    invoice.original_email_from.as_deref(),
                    invoice.ocr_raw_text.as_deref(),
                    invoice.notes.as_deref(),
                    invoice.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_invoice: {e}")))?;

        debug!(
            invoice_id = %invoice.id,
            company_id = %invoice.company_id,
            status = %invoice.status,
            "Invoice inserted"
        );
        Ok(())
    }

    async fn get_invoice(
        &self,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<SupplierInvoice>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {INVOICE_COLUMNS} FROM supplier_invoices WHERE company_id = ?1 AND id = ?2"
                ),
                params![company_id.to_string(), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_invoice: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_invoice(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("get_invoice row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_invoice: {e}"))),
        }
    }

    async fn list_invoices(&self, company_id: Uuid) -> Result<Vec<SupplierInvoice>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {INVOICE_COLUMNS} FROM supplier_invoices WHERE company_id = ?1 ORDER BY created_at DESC"
                ),
                params![company_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_invoices: {e}")))?;
        collect_rows(rows, row_to_invoice, "list_invoices").await
    }

    // ── Suppliers ───────────────────────────────────────────────────

    async fn find_supplier_by_name(
        &self,
        company_id: Uuid,
        name: &str,
    ) -> Result<Option<Supplier>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SUPPLIER_COLUMNS} FROM suppliers WHERE company_id = ?1 AND name_key = ?2 ORDER BY created_at LIMIT 1"
                ),
                params![company_id.to_string(), Supplier::name_key(name)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_supplier_by_name: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_supplier(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("find_supplier_by_name row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_supplier_by_name: {e}"))),
        }
    }

    async fn insert_supplier(&self, supplier: &Supplier) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO suppliers ({SUPPLIER_COLUMNS}, name_key) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    supplier.id.to_string(),
                    supplier.company_id.to_string(),
                    supplier.name.as_str(),
                    supplier.email.as_deref(),
                    supplier.phone.as_deref(),
                    supplier.address.as_deref(),
                    supplier.vat_number.as_deref(),
                    supplier.iban.as_deref(),
                    supplier.bic.as_deref(),
                    supplier.is_active as i64,
                    supplier.created_at.to_rfc3339(),
                    supplier.updated_at.to_rfc3339(),
                    Supplier::name_key(&supplier.name),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_supplier: {e}")))?;
        Ok(())
    }

    async fn update_supplier(&self, supplier: &Supplier) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE suppliers SET email = ?1, phone = ?2, address = ?3, vat_number = ?4, iban = ?5, bic = ?6, is_active = ?7, updated_at = ?8, name_key = ?11 WHERE id = ?9 AND company_id = ?10",
                params![
                    supplier.email.as_deref(),
                    supplier.phone.as_deref(),
                    supplier.address.as_deref(),
                    supplier.vat_number.as_deref(),
                    supplier.iban.as_deref(),
                    supplier.bic.as_deref(),
                    supplier.is_active as i64,
                    supplier.updated_at.to_rfc3339(),
                    supplier.id.to_string(),
                    supplier.company_id.to_string(),
                    Supplier::name_key(&supplier.name),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_supplier: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "supplier".to_string(),
                id: supplier.id.to_string(),
            });
        }
        Ok(())
    }

    async fn list_suppliers(&self, company_id: Uuid) -> Result<Vec<Supplier>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SUPPLIER_COLUMNS} FROM suppliers WHERE company_id = ?1 ORDER BY name COLLATE NOCASE"
                ),
                params![company_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_suppliers: {e}")))?;
        collect_rows(rows, row_to_supplier, "list_suppliers").await
    }

    // ── Notifications ───────────────────────────────────────────────

    async fn insert_notification(&self, notification: &Notification) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO notifications ({NOTIFICATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    notification.id.to_string(),
                    notification.user_id.to_string(),
                    notification.recipient_email.as_str(),
                    notification.company_id.to_string(),
                    notification.kind.as_str(),
                    notification.message.as_str(),
                    notification.link_to.as_deref(),
                    notification.read as i64,
                    notification.triggering_user_name.as_deref(),
                    notification.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_notification: {e}")))?;
        Ok(())
    }

    async fn list_notifications(
        &self,
        company_id: Uuid,
    ) -> Result<Vec<Notification>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE company_id = ?1 ORDER BY created_at"
                ),
                params![company_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_notifications: {e}")))?;
        collect_rows(rows, row_to_notification, "list_notifications").await
    }
}
