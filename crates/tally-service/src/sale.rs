//! # Sale Transaction Coordinator
//!
//! Turns a cart into a recorded sale. Either every product's stock is
//! reduced and exactly one sale is written, or nothing changes at all.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  complete_sale(cart, client, mode)                                      │
//! │       │                                                                 │
//! │       ├── cart empty / no client / bad qty / total overflow             │
//! │       │                              ──► Err (store untouched)          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  aggregate demand per product (duplicate lines summed)                  │
//! │       │                                                                 │
//! │       ▼             ┌──────────── one attempt ─────────────┐            │
//! │  RetryPolicy::run ─►│ txn = store.begin()                  │            │
//! │       ▲             │ reserve_stock(&mut txn, demand)      │            │
//! │       │             │   read stock through txn             │            │
//! │       │             │   missing  → ProductGone             │            │
//! │       │             │   too few  → InsufficientStock       │            │
//! │       │             │   set_stock(stock − demand)          │            │
//! │       │             │ stage_sale(&mut txn, lines, client)  │            │
//! │       │             │ txn.commit()                         │            │
//! │       │             └──────────────────┬───────────────────┘            │
//! │       └──────── Conflict (backoff) ────┤                                │
//! │                                        ▼                                │
//! │                               SaleRecord { sale, attempts }             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock is always read through the transaction, never taken from the cart.
//! The cart's stock snapshot is only a hint for the register screen.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use tally_core::validation::validate_quantity;
use tally_core::{CartItem, ClientRef, PaymentMode, ProductId, Sale, SaleId, SaleLine};
use tally_db::{CatalogStore, StoreTransaction};

use crate::error::{ServiceError, ServiceResult};
use crate::retry::RetryPolicy;

/// A committed sale.
#[derive(Debug, Clone, Serialize)]
pub struct SaleRecord {
    pub sale: Sale,
    /// Attempts it took, 1 when there was no contention.
    pub attempts: u32,
}

/// Total quantity wanted of one product across the whole cart.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Demand {
    product_id: ProductId,
    name: String,
    quantity: i64,
}

/// Sums quantities per product, keeping first-seen order.
///
/// Every line must hold 1..=`MAX_ITEM_QUANTITY` units.
fn aggregate_demand(cart: &[CartItem]) -> ServiceResult<Vec<Demand>> {
    let invalid = |item: &CartItem, quantity: i64| ServiceError::InvalidQuantity {
        product: item.name.clone(),
        quantity,
    };

    let mut demand: Vec<Demand> = Vec::new();
    for item in cart {
        validate_quantity(item.quantity).map_err(|_| invalid(item, item.quantity))?;
        match demand.iter_mut().find(|d| d.product_id == item.product_id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(item.quantity)
                    .ok_or_else(|| invalid(item, item.quantity))?;
            }
            None => demand.push(Demand {
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                quantity: item.quantity,
            }),
        }
    }
    Ok(demand)
}

/// Reads and decrements stock for every product in `demand`.
async fn reserve_stock<T: StoreTransaction>(
    txn: &mut T,
    demand: &[Demand],
) -> ServiceResult<()> {
    for wanted in demand {
        let product = txn
            .get_product(&wanted.product_id)
            .await?
            .ok_or_else(|| ServiceError::ProductGone(wanted.name.clone()))?;

        if product.stock() < wanted.quantity {
            return Err(ServiceError::InsufficientStock {
                product: product.name().to_string(),
                available: product.stock(),
                requested: wanted.quantity,
            });
        }

        txn.set_stock(&wanted.product_id, product.stock() - wanted.quantity)?;
        debug!(
            product_id = %wanted.product_id,
            stock = product.stock(),
            quantity = wanted.quantity,
            "Stock reserved"
        );
    }
    Ok(())
}

/// Builds the sale and stages it on `txn`.
fn stage_sale<T: StoreTransaction>(
    txn: &mut T,
    lines: &[SaleLine],
    client: &ClientRef,
    mode: PaymentMode,
) -> ServiceResult<Sale> {
    let sale = Sale::new(SaleId::new(), client, lines.to_vec(), mode, Utc::now())?;
    txn.insert_sale(sale.clone())?;
    Ok(sale)
}

/// Completes sales against a [`CatalogStore`].
#[derive(Debug)]
pub struct SaleCoordinator<S> {
    store: Arc<S>,
    policy: RetryPolicy,
}

impl<S> Clone for SaleCoordinator<S> {
    fn clone(&self) -> Self {
        SaleCoordinator {
            store: Arc::clone(&self.store),
            policy: self.policy,
        }
    }
}

impl<S: CatalogStore> SaleCoordinator<S> {
    pub fn new(store: Arc<S>, policy: RetryPolicy) -> Self {
        SaleCoordinator { store, policy }
    }

    /// Records a sale of `cart` to `client`.
    ///
    /// ## Errors
    /// - `EmptyCart`, `NoClientSelected`, `InvalidQuantity`: nothing was read
    /// - `Rule(AmountOverflow)`: the total does not fit, nothing was read
    /// - `ProductGone`, `InsufficientStock`: nothing was written
    /// - `Conflict { attempts }`: every attempt lost to a concurrent writer
    pub async fn complete_sale(
        &self,
        cart: &[CartItem],
        client: Option<&ClientRef>,
        mode: PaymentMode,
    ) -> ServiceResult<SaleRecord> {
        if cart.is_empty() {
            return Err(ServiceError::EmptyCart);
        }
        let client = client.ok_or(ServiceError::NoClientSelected)?;
        let demand = aggregate_demand(cart)?;
        let lines: Vec<SaleLine> = cart.iter().map(CartItem::to_sale_line).collect();
        Sale::total_of(&lines)?;

        let (demand, lines) = (&demand, &lines);
        let (sale, attempts) = self
            .policy
            .run("complete_sale", move |attempt| {
                self.attempt(demand, lines, client, mode, attempt)
            })
            .await?;

        info!(
            sale_id = %sale.id(),
            client_id = %sale.client_id(),
            total = %sale.total(),
            status = sale.status().as_str(),
            attempts,
            "Sale completed"
        );
        Ok(SaleRecord { sale, attempts })
    }

    async fn attempt(
        &self,
        demand: &[Demand],
        lines: &[SaleLine],
        client: &ClientRef,
        mode: PaymentMode,
        attempt: u32,
    ) -> ServiceResult<Sale> {
        debug!(attempt, "Starting sale transaction");
        let mut txn = self.store.begin().await?;
        reserve_stock(&mut txn, demand).await?;
        let sale = stage_sale(&mut txn, lines, client, mode)?;
        txn.commit().await?;
        Ok(sale)
    }
}
