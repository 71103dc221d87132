//! # Debt Ledger
//!
//! Applies a client's payment to their open (pending) sales, oldest first,
//! then records the payment.
//!
//! ## Flow
//! ```text
//! register_payment(client, amount = 12, open_sales = [A owes 10, B owes 5, C owes 20])
//!
//!   allocate_payment (tally-core, pure)
//!     A: +10 → Paid       B: +2 → Pending      C: untouched     unapplied: 0
//!
//!   for each allocation, in order:
//!     record_sale_payment(sale, expected_paid, applied)     ──► fails? stop,
//!                                                               PartialApplication
//!   insert_payment(amount = 12)                             ──► fails? PartialApplication
//!                                                               (failed_sale = None)
//!   PaymentReceipt { payment, allocations, unapplied }
//! ```
//!
//! ## Not Atomic
//! Each sale update commits on its own. A failure part way leaves the
//! earlier updates in place and says exactly which ones they were.
//!
//! ## Overpayment
//! A payment larger than the open debt is accepted and recorded in full. The
//! remainder is reported as `unapplied` and logged.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use tally_core::{
    allocate_payment, Allocation, ClientId, ClientRef, Money, Payment, PaymentId, Sale,
};
use tally_db::{CatalogStore, SaleFilter};

use crate::error::{ServiceError, ServiceResult};

/// Outcome of a fully applied payment.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    /// One entry per sale that received money, in application order.
    pub allocations: Vec<Allocation>,
    /// Part of the payment no open sale could absorb.
    pub unapplied: Money,
}

impl PaymentReceipt {
    pub fn applied_total(&self) -> Money {
        self.allocations.iter().map(|a| a.applied).sum()
    }
}

#[derive(Debug)]
pub struct DebtLedger<S> {
    store: Arc<S>,
}

impl<S> Clone for DebtLedger<S> {
    fn clone(&self) -> Self {
        DebtLedger {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: CatalogStore> DebtLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        DebtLedger { store }
    }

    /// A client's pending sales, oldest first.
    pub async fn open_sales_for(&self, client_id: &ClientId) -> ServiceResult<Vec<Sale>> {
        let filter = SaleFilter::pending().for_client(client_id.clone());
        Ok(self.store.list_sales(&filter).await?)
    }

    /// Total a client still owes.
    pub async fn outstanding_debt(&self, client_id: &ClientId) -> ServiceResult<Money> {
        let open = self.open_sales_for(client_id).await?;
        Ok(open.iter().map(Sale::debt).sum())
    }

    /// Applies `amount` to `open_sales` in the order given.
    ///
    /// `open_sales` should be the client's pending sales oldest first, as
    /// returned by [`DebtLedger::open_sales_for`].
    ///
    /// ## Errors
    /// - `NoClientSelected`, `NonPositiveAmount`: nothing was written
    /// - `PartialApplication`: the listed allocations committed, the rest
    ///   did not, and no payment was recorded
    pub async fn register_payment(
        &self,
        client: Option<&ClientRef>,
        amount: Money,
        open_sales: &[Sale],
    ) -> ServiceResult<PaymentReceipt> {
        let client = client.ok_or(ServiceError::NoClientSelected)?;
        if !amount.is_positive() {
            return Err(ServiceError::NonPositiveAmount(amount));
        }

        let plan = allocate_payment(amount, open_sales)?;
        if plan.is_overpayment() {
            warn!(
                client_id = %client.id,
                amount = %amount,
                unapplied = %plan.unapplied,
                "Payment exceeds open debt"
            );
        }

        let mut applied: Vec<Allocation> = Vec::with_capacity(plan.allocations.len());
        for allocation in plan.allocations {
            let result = self
                .store
                .record_sale_payment(
                    &allocation.sale_id,
                    allocation.previous_paid,
                    allocation.applied,
                )
                .await;

            match result {
                Ok(_) => {
                    debug!(
                        sale_id = %allocation.sale_id,
                        applied = %allocation.applied,
                        status = allocation.status.as_str(),
                        "Sale payment applied"
                    );
                    applied.push(allocation);
                }
                Err(source) => {
                    warn!(
                        sale_id = %allocation.sale_id,
                        committed = applied.len(),
                        error = %source,
                        "Sale update failed, payment partly applied"
                    );
                    return Err(ServiceError::PartialApplication {
                        applied,
                        failed_sale: Some(allocation.sale_id),
                        source,
                    });
                }
            }
        }

        let payment = Payment::new(PaymentId::new(), client, amount, Utc::now())?;
        if let Err(source) = self.store.insert_payment(&payment).await {
            warn!(
                client_id = %client.id,
                committed = applied.len(),
                error = %source,
                "Payment record failed after sale updates"
            );
            return Err(ServiceError::PartialApplication {
                applied,
                failed_sale: None,
                source,
            });
        }

        info!(
            payment_id = %payment.id(),
            client_id = %client.id,
            amount = %amount,
            sales = applied.len(),
            unapplied = %plan.unapplied,
            "Payment registered"
        );
        Ok(PaymentReceipt {
            payment,
            allocations: applied,
            unapplied: plan.unapplied,
        })
    }

    /// Fetches the client's open sales and applies `amount` to them.
    pub async fn settle(&self, client: &ClientRef, amount: Money) -> ServiceResult<PaymentReceipt> {
        if !amount.is_positive() {
            return Err(ServiceError::NonPositiveAmount(amount));
        }
        let open = self.open_sales_for(&client.id).await?;
        self.register_payment(Some(client), amount, &open).await
    }
}
