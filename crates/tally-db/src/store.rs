//! # Catalog Store Contract
//!
//! Everything above this crate talks to storage through [`CatalogStore`].
//! Two backends implement it: [`crate::MemoryStore`] and the SQLite
//! [`crate::Database`].
//!
//! ## Optimistic Transactions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  let mut txn = store.begin().await?;                                    │
//! │                                                                         │
//! │  txn.get_product(a)   ──► reads current row, remembers its version     │
//! │  txn.get_product(b)   ──► (same)                                       │
//! │  txn.set_stock(a, 4)  ──► buffered, nothing written yet                │
//! │  txn.insert_sale(s)   ──► buffered                                     │
//! │                                                                         │
//! │  txn.commit().await                                                     │
//! │     ├── every remembered version still current → apply all, Ok(())     │
//! │     └── any version moved                      → apply none, Conflict  │
//! │                                                                         │
//! │  Dropping `txn` without commit leaves the store untouched.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock only ever changes through a committed transaction. Sales are only
//! ever created through one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use tally_core::report::DateRange;
use tally_core::{
    Client, ClientId, Money, Payment, Product, ProductDetails, ProductId, Sale, SaleId,
    SaleStatus,
};

use crate::error::DbResult;

/// Capacity of every backend's change channel. Slow subscribers see
/// `RecvError::Lagged` and are expected to reload.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Change Notifications
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Products,
    Clients,
    Sales,
    Payments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Published after a write is durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub id: String,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(collection: Collection, id: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            collection,
            id: id.into(),
            kind,
        }
    }
}

// =============================================================================
// Sale Filter
// =============================================================================

/// Filter for [`CatalogStore::list_sales`]. The default matches every sale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaleFilter {
    pub status: Option<SaleStatus>,
    pub client_id: Option<ClientId>,
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub until: Option<DateTime<Utc>>,
}

impl SaleFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn pending() -> Self {
        Self::default().with_status(SaleStatus::Pending)
    }

    pub fn with_status(mut self, status: SaleStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn for_client(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn in_range(mut self, range: DateRange) -> Self {
        self.from = Some(range.start());
        self.until = Some(range.end_exclusive());
        self
    }

    pub fn matches(&self, sale: &Sale) -> bool {
        self.status.map_or(true, |s| sale.status() == s)
            && self
                .client_id
                .as_ref()
                .map_or(true, |c| sale.client_id() == c)
            && self.from.map_or(true, |from| sale.created_at() >= from)
            && self.until.map_or(true, |until| sale.created_at() < until)
    }
}

// =============================================================================
// Store Traits
// =============================================================================

/// The document store.
///
/// ## Ordering
/// - `list_products` / `list_clients`: by name
/// - `list_sales` / `list_payments`: by `created_at` ascending (oldest first)
#[async_trait]
pub trait CatalogStore: Send + Sync + 'static {
    type Txn: StoreTransaction;

    // -- products -------------------------------------------------------------

    async fn get_product(&self, id: &ProductId) -> DbResult<Option<Product>>;

    async fn list_products(&self) -> DbResult<Vec<Product>>;

    async fn find_products_by_sku(&self, sku: &str) -> DbResult<Vec<Product>>;

    async fn insert_product(&self, product: &Product) -> DbResult<()>;

    /// Rewrites name/sku/price. Stock is untouched. Returns the stored product.
    async fn update_product_details(
        &self,
        id: &ProductId,
        details: &ProductDetails,
    ) -> DbResult<Product>;

    async fn delete_product(&self, id: &ProductId) -> DbResult<()>;

    // -- clients --------------------------------------------------------------

    async fn get_client(&self, id: &ClientId) -> DbResult<Option<Client>>;

    async fn list_clients(&self) -> DbResult<Vec<Client>>;

    async fn insert_client(&self, client: &Client) -> DbResult<()>;

    /// Rewrites the client's contact fields.
    async fn update_client(&self, client: &Client) -> DbResult<()>;

    async fn delete_client(&self, id: &ClientId) -> DbResult<()>;

    // -- sales ----------------------------------------------------------------

    async fn get_sale(&self, id: &SaleId) -> DbResult<Option<Sale>>;

    async fn list_sales(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>>;

    /// Adds `applied` to a sale's amount_paid if it still equals
    /// `expected_paid` and the result does not exceed the total.
    ///
    /// ## Errors
    /// - `NotFound` if the sale is gone
    /// - `Conflict` if amount_paid moved or the sale no longer owes `applied`
    async fn record_sale_payment(
        &self,
        id: &SaleId,
        expected_paid: Money,
        applied: Money,
    ) -> DbResult<Sale>;

    // -- payments -------------------------------------------------------------

    async fn insert_payment(&self, payment: &Payment) -> DbResult<()>;

    async fn list_payments(&self, client_id: Option<&ClientId>) -> DbResult<Vec<Payment>>;

    // -- changes / transactions -----------------------------------------------

    /// Subscribes to change events. Cancel by dropping the receiver.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;

    async fn begin(&self) -> DbResult<Self::Txn>;
}

/// An optimistic transaction. See the module docs.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Reads a product and records its version. Staged stock writes are
    /// visible to later reads in the same transaction.
    async fn get_product(&mut self, id: &ProductId) -> DbResult<Option<Product>>;

    /// Buffers a stock write. The product must have been read through this
    /// transaction first, and `stock` must not be negative.
    fn set_stock(&mut self, id: &ProductId, stock: i64) -> DbResult<()>;

    /// Buffers a new sale.
    fn insert_sale(&mut self, sale: Sale) -> DbResult<()>;

    /// Applies every buffered write, or none of them.
    async fn commit(self) -> DbResult<()>;
}
