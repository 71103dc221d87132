//! # Payment Allocation
//!
//! Decides how a client's payment is spread across their open sales. The
//! plan is pure; applying it to the store is the debt ledger's job.
//!
//! ```text
//! payment 12 over debts [10, 5, 20] (oldest first)
//!
//!   sale A  debt 10  ── applied 10 ──►  Paid
//!   sale B  debt  5  ── applied  2 ──►  Pending (3 left)
//!   sale C  debt 20  ── untouched
//!
//!   unapplied = 0
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreResult;
use crate::money::Money;
use crate::types::{Sale, SaleId, SaleStatus};
use crate::validation::validate_payment_amount;

/// What a payment does to one sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Allocation {
    pub sale_id: SaleId,
    /// Portion of the payment applied to this sale.
    pub applied: Money,
    /// amount_paid before the payment. Used as the compare-and-set guard.
    pub previous_paid: Money,
    /// amount_paid after the payment.
    pub amount_paid: Money,
    pub status: SaleStatus,
}

/// Full allocation of one payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AllocationPlan {
    pub amount: Money,
    pub allocations: Vec<Allocation>,
    /// Part of the payment that no sale could absorb.
    pub unapplied: Money,
}

impl AllocationPlan {
    pub fn applied_total(&self) -> Money {
        self.allocations.iter().map(|a| a.applied).sum()
    }

    pub fn is_overpayment(&self) -> bool {
        self.unapplied.is_positive()
    }
}

/// Allocates `amount` over `sales` in the order given.
///
/// ## Rules
/// - order is preserved exactly (callers pass oldest first)
/// - sales with nothing owed are skipped
/// - each sale receives min(remaining, debt)
/// - allocation stops once nothing remains
///
/// `amount == Σ applied + unapplied` always holds.
pub fn allocate_payment(amount: Money, sales: &[Sale]) -> CoreResult<AllocationPlan> {
    validate_payment_amount(amount)?;

    let mut remaining = amount;
    let mut allocations = Vec::new();

    for sale in sales {
        if !remaining.is_positive() {
            break;
        }

        let debt = sale.debt();
        if !debt.is_positive() {
            continue;
        }

        let applied = remaining.min(debt);
        let mut settled = sale.clone();
        let (amount_paid, status) = settled.apply_payment(applied)?;

        allocations.push(Allocation {
            sale_id: sale.id().clone(),
            applied,
            previous_paid: sale.amount_paid(),
            amount_paid,
            status,
        });
        remaining -= applied;
    }

    Ok(AllocationPlan {
        amount,
        allocations,
        unapplied: remaining,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
