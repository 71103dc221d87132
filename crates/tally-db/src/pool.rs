//! # SQLite Store
//!
//! Connection pool setup and the SQLite implementation of [`CatalogStore`].
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DbConfig::new(path)  /  DbConfig::in_memory()                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌──────────────────────────────┐   ┌───────────────────────────────┐  │
//! │  │          SqlitePool          │   │  broadcast::Sender<ChangeEvent>│  │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐     │   │  one event per durable write  │  │
//! │  │  │Conn1│ │Conn2│ │Conn3│ ... │   └───────────────────────────────┘  │
//! │  │  └─────┘ └─────┘ └─────┘     │                                      │
//! │  └──────────────────────────────┘                                      │
//! │       │                                                                 │
//! │       ├── products() / clients() / sales() / payments()  repositories  │
//! │       └── begin()  → SqliteTransaction                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! File databases run in WAL mode so readers never block the single writer.
//! A writer that finds the database locked gets `DbError::Conflict` and the
//! caller's retry loop takes over.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::{debug, info};

use tally_core::{
    Client, ClientId, Money, Payment, Product, ProductDetails, ProductId, Sale, SaleId,
};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::client::ClientRepository;
use crate::repository::payment::PaymentRepository;
use crate::repository::product::ProductRepository;
use crate::repository::sale::SaleRepository;
use crate::store::{
    CatalogStore, ChangeEvent, ChangeKind, Collection, SaleFilter, CHANGE_CHANNEL_CAPACITY,
};
use crate::transaction::SqliteTransaction;

// =============================================================================
// Configuration
// =============================================================================

/// SQLite pool configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/tally.db").max_connections(5);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the database file. Ignored when `in_memory` is set.
    pub database_path: PathBuf,

    /// Private in-memory database (tests, demos).
    pub in_memory: bool,

    /// Default: 5
    pub max_connections: u32,

    /// Default: 1
    pub min_connections: u32,

    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// How long a writer waits on a locked database before giving up.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            in_memory: false,
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// In-memory database on a single connection that is never recycled.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            in_memory: true,
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = if self.in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.database_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        };

        Ok(options
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout))
    }
}

// =============================================================================
// Database
// =============================================================================

/// SQLite-backed [`CatalogStore`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Database {
    /// Creates the pool and, if configured, runs migrations.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            in_memory = config.in_memory,
            "Initializing database connection"
        );

        let connect_options = config.connect_options()?;
        debug!("Connection options configured");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout);
        if config.in_memory {
            // Closing the only connection would drop the whole database.
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(max_connections = config.max_connections, "Database pool created");

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let db = Database { pool, changes };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub fn clients(&self) -> ClientRepository {
        ClientRepository::new(self.pool.clone())
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone())
    }

    pub fn payments(&self) -> PaymentRepository {
        PaymentRepository::new(self.pool.clone())
    }

    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    fn publish(&self, collection: Collection, id: &str, kind: ChangeKind) {
        let _ = self.changes.send(ChangeEvent::new(collection, id, kind));
    }
}

#[async_trait]
impl CatalogStore for Database {
    type Txn = SqliteTransaction;

    async fn get_product(&self, id: &ProductId) -> DbResult<Option<Product>> {
        self.products().get_by_id(id).await
    }

    async fn list_products(&self) -> DbResult<Vec<Product>> {
        self.products().list().await
    }

    async fn find_products_by_sku(&self, sku: &str) -> DbResult<Vec<Product>> {
        self.products().find_by_sku(sku).await
    }

    async fn insert_product(&self, product: &Product) -> DbResult<()> {
        self.products().insert(product).await?;
        self.publish(Collection::Products, product.id().as_str(), ChangeKind::Created);
        Ok(())
    }

    async fn update_product_details(
        &self,
        id: &ProductId,
        details: &ProductDetails,
    ) -> DbResult<Product> {
        let product = self.products().update_details(id, details).await?;
        self.publish(Collection::Products, id.as_str(), ChangeKind::Updated);
        Ok(product)
    }

    async fn delete_product(&self, id: &ProductId) -> DbResult<()> {
        self.products().delete(id).await?;
        self.publish(Collection::Products, id.as_str(), ChangeKind::Deleted);
        Ok(())
    }

    async fn get_client(&self, id: &ClientId) -> DbResult<Option<Client>> {
        self.clients().get_by_id(id).await
    }

    async fn list_clients(&self) -> DbResult<Vec<Client>> {
        self.clients().list().await
    }

    async fn insert_client(&self, client: &Client) -> DbResult<()> {
        self.clients().insert(client).await?;
        self.publish(Collection::Clients, client.id().as_str(), ChangeKind::Created);
        Ok(())
    }

    async fn update_client(&self, client: &Client) -> DbResult<()> {
        self.clients().update_contact(client).await?;
        self.publish(Collection::Clients, client.id().as_str(), ChangeKind::Updated);
        Ok(())
    }

    async fn delete_client(&self, id: &ClientId) -> DbResult<()> {
        self.clients().delete(id).await?;
        self.publish(Collection::Clients, id.as_str(), ChangeKind::Deleted);
        Ok(())
    }

    async fn get_sale(&self, id: &SaleId) -> DbResult<Option<Sale>> {
        self.sales().get_by_id(id).await
    }

    async fn list_sales(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        self.sales().list(filter).await
    }

    async fn record_sale_payment(
        &self,
        id: &SaleId,
        expected_paid: Money,
        applied: Money,
    ) -> DbResult<Sale> {
        let sale = self.sales().record_payment(id, expected_paid, applied).await?;
        self.publish(Collection::Sales, id.as_str(), ChangeKind::Updated);
        Ok(sale)
    }

    async fn insert_payment(&self, payment: &Payment) -> DbResult<()> {
        self.payments().insert(payment).await?;
        self.publish(Collection::Payments, payment.id().as_str(), ChangeKind::Created);
        Ok(())
    }

    async fn list_payments(&self, client_id: Option<&ClientId>) -> DbResult<Vec<Payment>> {
        self.payments().list(client_id).await
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    async fn begin(&self) -> DbResult<SqliteTransaction> {
        Ok(SqliteTransaction::new(self.pool.clone(), self.changes.clone()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/tally.db")
            .max_connections(10)
            .min_connections(2)
            .busy_timeout(Duration::from_millis(250));

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(!config.in_memory);
    }
}
