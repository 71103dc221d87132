//! # Runtime Backend Selection
//!
//! [`AnyStore`] lets a deployment pick its backend from configuration
//! (`memory` or `sqlite`) while the services stay generic over
//! [`CatalogStore`].

use async_trait::async_trait;
use tokio::sync::broadcast;

use tally_core::{
    Client, ClientId, Money, Payment, Product, ProductDetails, ProductId, Sale, SaleId,
};

use crate::error::DbResult;
use crate::memory::{MemoryStore, MemoryTransaction};
use crate::pool::Database;
use crate::store::{CatalogStore, ChangeEvent, SaleFilter, StoreTransaction};
use crate::transaction::SqliteTransaction;

#[derive(Debug, Clone)]
pub enum AnyStore {
    Memory(MemoryStore),
    Sqlite(Database),
}

#[derive(Debug)]
pub enum AnyTransaction {
    Memory(MemoryTransaction),
    Sqlite(SqliteTransaction),
}

impl From<MemoryStore> for AnyStore {
    fn from(store: MemoryStore) -> Self {
        AnyStore::Memory(store)
    }
}

impl From<Database> for AnyStore {
    fn from(db: Database) -> Self {
        AnyStore::Sqlite(db)
    }
}

macro_rules! dispatch {
    ($self:expr, $store:ident => $call:expr) => {
        match $self {
            AnyStore::Memory($store) => $call,
            AnyStore::Sqlite($store) => $call,
        }
    };
}

#[async_trait]
impl CatalogStore for AnyStore {
    type Txn = AnyTransaction;

    async fn get_product(&self, id: &ProductId) -> DbResult<Option<Product>> {
        dispatch!(self, s => s.get_product(id).await)
    }

    async fn list_products(&self) -> DbResult<Vec<Product>> {
        dispatch!(self, s => s.list_products().await)
    }

    async fn find_products_by_sku(&self, sku: &str) -> DbResult<Vec<Product>> {
        dispatch!(self, s => s.find_products_by_sku(sku).await)
    }

    async fn insert_product(&self, product: &Product) -> DbResult<()> {
        dispatch!(self, s => s.insert_product(product).await)
    }

    async fn update_product_details(
        &self,
        id: &ProductId,
        details: &ProductDetails,
    ) -> DbResult<Product> {
        dispatch!(self, s => s.update_product_details(id, details).await)
    }

    async fn delete_product(&self, id: &ProductId) -> DbResult<()> {
        dispatch!(self, s => s.delete_product(id).await)
    }

    async fn get_client(&self, id: &ClientId) -> DbResult<Option<Client>> {
        dispatch!(self, s => s.get_client(id).await)
    }

    async fn list_clients(&self) -> DbResult<Vec<Client>> {
        dispatch!(self, s => s.list_clients().await)
    }

    async fn insert_client(&self, client: &Client) -> DbResult<()> {
        dispatch!(self, s => s.insert_client(client).await)
    }

    async fn update_client(&self, client: &Client) -> DbResult<()> {
        dispatch!(self, s => s.update_client(client).await)
    }

    async fn delete_client(&self, id: &ClientId) -> DbResult<()> {
        dispatch!(self, s => s.delete_client(id).await)
    }

    async fn get_sale(&self, id: &SaleId) -> DbResult<Option<Sale>> {
        dispatch!(self, s => s.get_sale(id).await)
    }

    async fn list_sales(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        dispatch!(self, s => s.list_sales(filter).await)
    }

    async fn record_sale_payment(
        &self,
        id: &SaleId,
        expected_paid: Money,
        applied: Money,
    ) -> DbResult<Sale> {
        dispatch!(self, s => s.record_sale_payment(id, expected_paid, applied).await)
    }

    async fn insert_payment(&self, payment: &Payment) -> DbResult<()> {
        dispatch!(self, s => s.insert_payment(payment).await)
    }

    async fn list_payments(&self, client_id: Option<&ClientId>) -> DbResult<Vec<Payment>> {
        dispatch!(self, s => s.list_payments(client_id).await)
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        dispatch!(self, s => s.changes())
    }

    async fn begin(&self) -> DbResult<AnyTransaction> {
        match self {
            AnyStore::Memory(s) => s.begin().await.map(AnyTransaction::Memory),
            AnyStore::Sqlite(s) => s.begin().await.map(AnyTransaction::Sqlite),
        }
    }
}

#[async_trait]
impl StoreTransaction for AnyTransaction {
    async fn get_product(&mut self, id: &ProductId) -> DbResult<Option<Product>> {
        match self {
            AnyTransaction::Memory(t) => t.get_product(id).await,
            AnyTransaction::Sqlite(t) => t.get_product(id).await,
        }
    }

    fn set_stock(&mut self, id: &ProductId, stock: i64) -> DbResult<()> {
        match self {
            AnyTransaction::Memory(t) => t.set_stock(id, stock),
            AnyTransaction::Sqlite(t) => t.set_stock(id, stock),
        }
    }

    fn insert_sale(&mut self, sale: Sale) -> DbResult<()> {
        match self {
            AnyTransaction::Memory(t) => t.insert_sale(sale),
            AnyTransaction::Sqlite(t) => t.insert_sale(sale),
        }
    }

    async fn commit(self) -> DbResult<()> {
        match self {
            AnyTransaction::Memory(t) => t.commit().await,
            AnyTransaction::Sqlite(t) => t.commit().await,
        }
    }
}
