//! # tally-db: Catalog Store for Tally POS
//!
//! Everything above this crate reads and writes products, clients, sales
//! and payments through the [`CatalogStore`] trait.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Data Flow                              │
//! │                                                                         │
//! │  tally-service (SaleCoordinator, DebtLedger, LiveView, ...)            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │ CatalogStore  │    │  MemoryStore  │    │   Database   │  │   │
//! │  │   │  (store.rs)   │◄───│  (memory.rs)  │    │  (pool.rs)   │  │   │
//! │  │   │               │◄───┼───────────────┼────│ repositories │  │   │
//! │  │   │ StoreTxn      │    │ fault hooks   │    │ migrations   │  │   │
//! │  │   │ ChangeEvent   │    │               │    │ SqliteTxn    │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - The `CatalogStore` / `StoreTransaction` contract, change events
//! - [`memory`] - In-memory backend
//! - [`pool`] - SQLite pool and backend
//! - [`transaction`] - SQLite optimistic transactions
//! - [`backend`] - `AnyStore`, a backend chosen at runtime
//! - [`repository`] - Per-table SQLite statements
//! - [`migrations`] - Embedded migrations
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{CatalogStore, Database, DbConfig, StoreTransaction};
//!
//! let db = Database::new(DbConfig::new("tally.db")).await?;
//!
//! let mut txn = db.begin().await?;
//! let rice = txn.get_product(&rice_id).await?.ok_or(...)?;
//! txn.set_stock(&rice_id, rice.stock() - 2)?;
//! txn.insert_sale(sale)?;
//! txn.commit().await?; // Err(DbError::Conflict { .. }) if rice moved
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backend;
pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;
pub mod transaction;

// =============================================================================
// Re-exports
// =============================================================================

pub use backend::{AnyStore, AnyTransaction};
pub use error::{DbError, DbResult};
pub use memory::{MemoryStore, MemoryTransaction};
pub use pool::{Database, DbConfig};
pub use store::{
    CatalogStore, ChangeEvent, ChangeKind, Collection, SaleFilter, StoreTransaction,
    CHANGE_CHANNEL_CAPACITY,
};
pub use transaction::SqliteTransaction;

// Repository re-exports for convenience
pub use repository::client::ClientRepository;
pub use repository::payment::PaymentRepository;
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
