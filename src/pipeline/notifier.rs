//! Admin notification fan-out.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::pipeline::types::InvoiceSummary;
use crate::store::Database;
use crate::store::models::{Company, NOTIFICATION_INVOICE_RECEIVED, Notification};

/// Where the notification links to in the web app.
pub const INVOICES_LINK: &str = "/invoices";

/// One-line summary of a batch: supplier(s) and aggregate total. The total
/// is left out when it does not fit in a `Decimal`.
pub fn batch_message(invoices: &[InvoiceSummary]) -> String {
    let mut suppliers: Vec<&str> = Vec::new();
    for invoice in invoices {
        if !suppliers.contains(&invoice.supplier.as_str()) {
            suppliers.push(&invoice.supplier);
        }
    }
    let total = invoices
        .iter()
        .try_fold(Decimal::ZERO, |acc, i| acc.checked_add(i.total));

    let from = match suppliers.as_slice() {
        [] => "Unknown".to_string(),
        [only] => (*only).to_string(),
        [first, rest @ ..] => format!(
            "{first} and {} other{}",
            rest.len(),
            if rest.len() == 1 { "" } else { "s" }
        ),
    };
    let head = if invoices.len() == 1 {
        "New invoice received".to_string()
    } else {
        format!("{} new invoices received", invoices.len())
    };
    match total {
        Some(total) => format!("{head} from {from} (€{:.2})", total.round_dp(2)),
        None => format!("{head} from {from}"),
    }
}

/// Writes one `invoice_received` notification per admin or owner.
#[derive(Clone)]
pub struct AdminNotifier {
    db: Arc<dyn Database>,
}

impl AdminNotifier {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Notify the company's admins about a batch. Returns how many
    /// notifications were stored; failures are logged, never returned.
    pub async fn notify(
        &self,
        company: &Company,
        invoices: &[InvoiceSummary],
        triggered_by: Option<&str>,
    ) -> usize {
        if invoices.is_empty() {
            return 0;
        }

        let admins = match self.db.list_company_admins(company.id).await {
            Ok(admins) => admins,
            Err(e) => {
                warn!(company_id = %company.id, error = %e, "Failed to load company admins");
                return 0;
            }
        };
        if admins.is_empty() {
            debug!(company_id = %company.id, "No admins to notify");
            return 0;
        }

        let message = batch_message(invoices);
        let mut sent = 0;
        for admin in &admins {
            let notification = Notification {
                id: Uuid::new_v4(),
                user_id: admin.id,
                recipient_email: admin.email.clone(),
                company_id: company.id,
                kind: NOTIFICATION_INVOICE_RECEIVED.to_string(),
                message: message.clone(),
                link_to: Some(INVOICES_LINK.to_string()),
                read: false,
                triggering_user_name: triggered_by.map(str::to_string),
                created_at: Utc::now(),
            };
            match self.db.insert_notification(&notification).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(
                    company_id = %company.id,
                    user_id = %admin.id,
                    error = %e,
                    "Failed to store notification"
                ),
            }
        }

        info!(company_id = %company.id, notified = sent, "Admins notified");
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;
    use crate::store::models::{CompanyRole, CompanyUser};
    use rust_decimal_macros::dec;

    fn summary(supplier: &str, total: Decimal) -> InvoiceSummary {
        InvoiceSummary {
            id: Uuid::new_v4(),
            supplier: supplier.into(),
            total,
        }
    }

    #[test]
    fn message_for_single_invoice() {
        assert_eq!(
            batch_message(&[summary("Sigma Coatings", dec!(121))]),
            "New invoice received from Sigma Coatings (€121.00)"
        );
    }

    #[test]
    fn message_for_batch_sums_and_counts_distinct_suppliers() {
        let message = batch_message(&[
            summary("Sigma", dec!(10.5)),
            summary("Sigma", dec!(4.5)),
            summary("Unknown", dec!(0)),
            summary("Bouwmaat", dec!(100.004)),
        ]);
        assert_eq!(message, "4 new invoices received from Sigma and 2 others (€115.00)");

        let two = batch_message(&[summary("A", dec!(1)), summary("B", dec!(2))]);
        assert_eq!(two, "2 new invoices received from A and 1 other (€3.00)");
    }

    #[test]
    fn message_for_overflowing_batch_omits_total() {
        let message = batch_message(&[summary("Sigma", Decimal::MAX), summary("Sigma", Decimal::MAX)]);
        assert_eq!(message, "2 new invoices received from Sigma");
    }

    async fn setup() -> (Arc<dyn Database>, Company) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let company = Company::new("Acme", "in@acme.dev");
        db.insert_company(&company).await.unwrap();
        (db, company)
    }

    #[tokio::test]
    async fn notifies_admins_and_owners_only() {
        let (db, company) = setup().await;
        for (email, role) in [
            ("owner@acme.dev", CompanyRole::Owner),
            ("admin@acme.dev", CompanyRole::Admin),
            ("member@acme.dev", CompanyRole::Member),
        ] {
            db.insert_user(&CompanyUser::new(company.id, email, role))
                .await
                .unwrap();
        }

        let notifier = AdminNotifier::new(db.clone());
        let sent = notifier
            .notify(&company, &[summary("Sigma", dec!(121))], Some("Sigma Coatings"))
            .await;
        assert_eq!(sent, 2);

        let stored = db.list_notifications(company.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        for n in &stored {
            assert_eq!(n.kind, NOTIFICATION_INVOICE_RECEIVED);
            assert_eq!(n.link_to.as_deref(), Some(INVOICES_LINK));
            assert!(!n.read);
            assert_eq!(n.triggering_user_name.as_deref(), Some("Sigma Coatings"));
            assert_ne!(n.recipient_email, "member@acme.dev");
        }
    }

    #[tokio::test]
    async fn no_admins_or_no_invoices_is_a_no_op() {
        let (db, company) = setup().await;
        let notifier = AdminNotifier::new(db.clone());

        assert_eq!(notifier.notify(&company, &[summary("Sigma", dec!(1))], None).await, 0);

        db.insert_user(&CompanyUser::new(company.id, "owner@acme.dev", CompanyRole::Owner))
            .await
            .unwrap();
        assert_eq!(notifier.notify(&company, &[], None).await, 0);
        assert!(db.list_notifications(company.id).await.unwrap().is_empty());
    }
}
