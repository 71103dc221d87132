//! # In-Memory Store
//!
//! A complete [`CatalogStore`] kept in process memory. It is the reference
//! backend for tests and demos and implements exactly the same optimistic
//! protocol as the SQLite store.
//!
//! ## Versioning
//! ```text
//! clock: 41 ──► insert product A            A@42
//!           ──► txn1 reads A@42, txn2 reads A@42
//!           ──► txn1 commits                A@43   ok
//!           ──► txn2 commits: A is @43, read @42  → Conflict
//! ```
//!
//! ## Fault Injection
//! Tests can make the next N commits fail with `Conflict`, take the whole
//! store offline, or reject payment inserts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use tally_core::{
    Client, ClientId, Money, Payment, Product, ProductDetails, ProductId, Sale, SaleId,
};

use crate::error::{DbError, DbResult};
use crate::store::{
    CatalogStore, ChangeEvent, ChangeKind, Collection, SaleFilter, StoreTransaction,
    CHANGE_CHANNEL_CAPACITY,
};

// =============================================================================
// State
// =============================================================================

#[derive(Debug)]
struct Versioned<T> {
    version: u64,
    value: T,
}

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Versioned<Product>>,
    clients: HashMap<ClientId, Client>,
    sales: HashMap<SaleId, Sale>,
    payments: Vec<Payment>,
    clock: u64,
}

impl State {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

#[derive(Debug, Default)]
struct Faults {
    commit_conflicts: AtomicUsize,
    offline: AtomicBool,
    reject_payments: AtomicBool,
}

impl Faults {
    fn take_conflict(&self) -> bool {
        self.commit_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// Cheap to clone; clones share the same data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
    faults: Arc<Faults>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(State::default())),
            faults: Arc::new(Faults::default()),
            changes,
        }
    }

    /// Makes the next `count` commits fail with `Conflict`.
    pub fn inject_commit_conflicts(&self, count: usize) {
        self.faults.commit_conflicts.store(count, Ordering::SeqCst);
    }

    /// While offline every operation fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.faults.offline.store(offline, Ordering::SeqCst);
    }

    /// While set, `insert_payment` fails with `Unavailable`.
    pub fn reject_payments(&self, reject: bool) {
        self.faults.reject_payments.store(reject, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> DbResult<()> {
        if self.faults.offline.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn publish(&self, event: ChangeEvent) {
        // No subscribers is fine.
        let _ = self.changes.send(event);
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    type Txn = MemoryTransaction;

    async fn get_product(&self, id: &ProductId) -> DbResult<Option<Product>> {
        self.ensure_online()?;
        let state = self.state.read().await;
        Ok(state.products.get(id).map(|v| v.value.clone()))
    }

    async fn list_products(&self) -> DbResult<Vec<Product>> {
        self.ensure_online()?;
        let state = self.state.read().await;
        let mut products: Vec<Product> =
            state.products.values().map(|v| v.value.clone()).collect();
        products.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
        Ok(products)
    }

    async fn find_products_by_sku(&self, sku: &str) -> DbResult<Vec<Product>> {
        self.ensure_online()?;
        let sku = sku.trim();
        let state = self.state.read().await;
        Ok(state
            .products
            .values()
            .filter(|v| v.value.sku() == sku)
            .map(|v| v.value.clone())
            .collect())
    }

    async fn insert_product(&self, product: &Product) -> DbResult<()> {
        self.ensure_online()?;
        {
            let mut state = self.state.write().await;
            if state.products.contains_key(product.id()) {
                return Err(DbError::duplicate("products.id", product.id().as_str()));
            }
            let version = state.tick();
            state.products.insert(
                product.id().clone(),
                Versioned {
                    version,
                    value: product.clone(),
                },
            );
        }
        self.publish(ChangeEvent::new(
            Collection::Products,
            product.id().as_str(),
            ChangeKind::Created,
        ));
        Ok(())
    }

    async fn update_product_details(
        &self,
        id: &ProductId,
        details: &ProductDetails,
    ) -> DbResult<Product> {
        self.ensure_online()?;
        let updated = {
            let mut state = self.state.write().await;
            let version = state.tick();
            let entry = state
                .products
                .get_mut(id)
                .ok_or_else(|| DbError::not_found("Product", id.as_str()))?;
            let updated = entry
                .value
                .with_details(details.clone())
                .map_err(|e| DbError::InvalidWrite(e.to_string()))?;
            entry.value = updated.clone();
            entry.version = version;
            updated
        };
        self.publish(ChangeEvent::new(
            Collection::Products,
            id.as_str(),
            ChangeKind::Updated,
        ));
        Ok(updated)
    }

    async fn delete_product(&self, id: &ProductId) -> DbResult<()> {
        self.ensure_online()?;
        self.state
            .write()
            .await
            .products
            .remove(id)
            .ok_or_else(|| DbError::not_found("Product", id.as_str()))?;
        self.publish(ChangeEvent::new(
            Collection::Products,
            id.as_str(),
            ChangeKind::Deleted,
        ));
        Ok(())
    }

    async fn get_client(&self, id: &ClientId) -> DbResult<Option<Client>> {
        self.ensure_online()?;
        Ok(self.state.read().await.clients.get(id).cloned())
    }

    async fn list_clients(&self) -> DbResult<Vec<Client>> {
        self.ensure_online()?;
        let state = self.state.read().await;
        let mut clients: Vec<Client> = state.clients.values().cloned().collect();
        clients.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
        Ok(clients)
    }

    async fn insert_client(&self, client: &Client) -> DbResult<()> {
        self.ensure_online()?;
        {
            let mut state = self.state.write().await;
            if state.clients.contains_key(client.id()) {
                return Err(DbError::duplicate("clients.id", client.id().as_str()));
            }
            state.clients.insert(client.id().clone(), client.clone());
        }
        self.publish(ChangeEvent::new(
            Collection::Clients,
            client.id().as_str(),
            ChangeKind::Created,
        ));
        Ok(())
    }

    async fn update_client(&self, client: &Client) -> DbResult<()> {
        self.ensure_online()?;
        {
            let mut state = self.state.write().await;
            let slot = state
                .clients
                .get_mut(client.id())
                .ok_or_else(|| DbError::not_found("Client", client.id().as_str()))?;
            *slot = client.clone();
        }
        self.publish(ChangeEvent::new(
            Collection::Clients,
            client.id().as_str(),
            ChangeKind::Updated,
        ));
        Ok(())
    }

    async fn delete_client(&self, id: &ClientId) -> DbResult<()> {
        self.ensure_online()?;
        self.state
            .write()
            .await
            .clients
            .remove(id)
            .ok_or_else(|| DbError::not_found("Client", id.as_str()))?;
        self.publish(ChangeEvent::new(
            Collection::Clients,
            id.as_str(),
            ChangeKind::Deleted,
        ));
        Ok(())
    }

    async fn get_sale(&self, id: &SaleId) -> DbResult<Option<Sale>> {
        self.ensure_online()?;
        Ok(self.state.read().await.sales.get(id).cloned())
    }

    async fn list_sales(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        self.ensure_online()?;
        let state = self.state.read().await;
        let mut sales: Vec<Sale> = state
            .sales
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        sales.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(sales)
    }

    async fn record_sale_payment(
        &self,
        id: &SaleId,
        expected_paid: Money,
        applied: Money,
    ) -> DbResult<Sale> {
        self.ensure_online()?;
        if !applied.is_positive() {
            return Err(DbError::InvalidWrite(format!(
                "payment of {} on sale {}",
                applied, id
            )));
        }

        let updated = {
            let mut state = self.state.write().await;
            let sale = state
                .sales
                .get_mut(id)
                .ok_or_else(|| DbError::not_found("Sale", id.as_str()))?;
            if sale.amount_paid() != expected_paid || applied > sale.debt() {
                return Err(DbError::conflict("Sale", id.as_str()));
            }
            sale.apply_payment(applied)
                .map_err(|_| DbError::conflict("Sale", id.as_str()))?;
            sale.clone()
        };

        debug!(sale_id = %id, amount_paid = %updated.amount_paid(), "Sale payment recorded");
        self.publish(ChangeEvent::new(
            Collection::Sales,
            id.as_str(),
            ChangeKind::Updated,
        ));
        Ok(updated)
    }

    async fn insert_payment(&self, payment: &Payment) -> DbResult<()> {
        self.ensure_online()?;
        if self.faults.reject_payments.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("payments rejected".to_string()));
        }
        {
            let mut state = self.state.write().await;
            if state.payments.iter().any(|p| p.id() == payment.id()) {
                return Err(DbError::duplicate("payments.id", payment.id().as_str()));
            }
            state.payments.push(payment.clone());
        }
        self.publish(ChangeEvent::new(
            Collection::Payments,
            payment.id().as_str(),
            ChangeKind::Created,
        ));
        Ok(())
    }

    async fn list_payments(&self, client_id: Option<&ClientId>) -> DbResult<Vec<Payment>> {
        self.ensure_online()?;
        let state = self.state.read().await;
        let mut payments: Vec<Payment> = state
            .payments
            .iter()
            .filter(|p| client_id.map_or(true, |c| p.client_id() == c))
            .cloned()
            .collect();
        payments.sort_by_key(Payment::created_at);
        Ok(payments)
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    async fn begin(&self) -> DbResult<MemoryTransaction> {
        self.ensure_online()?;
        Ok(MemoryTransaction {
            store: self.clone(),
            reads: HashMap::new(),
            stock_writes: HashMap::new(),
            sales: Vec::new(),
        })
    }
}

// =============================================================================
// MemoryTransaction
// =============================================================================

#[derive(Debug)]
pub struct MemoryTransaction {
    store: MemoryStore,
    /// Version of every product read, as first seen.
    reads: HashMap<ProductId, u64>,
    stock_writes: HashMap<ProductId, i64>,
    sales: Vec<Sale>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get_product(&mut self, id: &ProductId) -> DbResult<Option<Product>> {
        self.store.ensure_online()?;
        let state = self.store.state.read().await;
        let Some(entry) = state.products.get(id) else {
            return Ok(None);
        };
        self.reads.entry(id.clone()).or_insert(entry.version);

        match self.stock_writes.get(id) {
            Some(&stock) => Ok(Some(entry.value.with_stock(stock)?)),
            None => Ok(Some(entry.value.clone())),
        }
    }

    fn set_stock(&mut self, id: &ProductId, stock: i64) -> DbResult<()> {
        if !self.reads.contains_key(id) {
            return Err(DbError::InvalidWrite(format!(
                "stock of {} written without being read",
                id
            )));
        }
        if stock < 0 {
            return Err(DbError::InvalidWrite(format!(
                "stock of {} would become {}",
                id, stock
            )));
        }
        self.stock_writes.insert(id.clone(), stock);
        Ok(())
    }

    fn insert_sale(&mut self, sale: Sale) -> DbResult<()> {
        self.sales.push(sale);
        Ok(())
    }

    async fn commit(self) -> DbResult<()> {
        let store = self.store;
        store.ensure_online()?;
        if store.faults.take_conflict() {
            debug!("Injected commit conflict");
            return Err(DbError::conflict("transaction", "injected"));
        }

        let mut events = Vec::new();
        {
            let mut state = store.state.write().await;

            for (id, version) in &self.reads {
                match state.products.get(id) {
                    Some(current) if current.version == *version => {}
                    _ => return Err(DbError::conflict("Product", id.as_str())),
                }
            }
            for sale in &self.sales {
                if state.sales.contains_key(sale.id()) {
                    return Err(DbError::duplicate("sales.id", sale.id().as_str()));
                }
            }

            // Validate every write before applying any of them.
            let mut restocked = Vec::with_capacity(self.stock_writes.len());
            for (id, stock) in &self.stock_writes {
                let current = state
                    .products
                    .get(id)
                    .ok_or_else(|| DbError::conflict("Product", id.as_str()))?;
                restocked.push(current.value.with_stock(*stock)?);
            }

            let version = state.tick();
            for product in restocked {
                events.push(ChangeEvent::new(
                    Collection::Products,
                    product.id().as_str(),
                    ChangeKind::Updated,
                ));
                state.products.insert(
                    product.id().clone(),
                    Versioned {
                        version,
                        value: product,
                    },
                );
            }
            for sale in self.sales {
                events.push(ChangeEvent::new(
                    Collection::Sales,
                    sale.id().as_str(),
                    ChangeKind::Created,
                ));
                state.sales.insert(sale.id().clone(), sale);
            }
        }

        for event in events {
            store.publish(event);
        }
        Ok(())
    }
}
