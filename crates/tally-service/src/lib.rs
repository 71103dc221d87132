//! # tally-service: Business Operations for Tally POS
//!
//! The operations a register, back office or report screen calls. Each
//! service holds an `Arc` of one [`CatalogStore`] and is cheap to clone.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Layers                                 │
//! │                                                                         │
//! │  UI / CLI / API                                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  tally-service (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │  SaleCoordinator   DebtLedger   CatalogService   ReportService  │   │
//! │  │  LiveViews         RetryPolicy  TallyConfig      ServiceError   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                            │                                    │
//! │       ▼                            ▼                                    │
//! │  tally-db (CatalogStore)      tally-core (types, rules, reports)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`sale`] - Sale completion (atomic stock check + decrement + sale)
//! - [`debt`] - Payment application, oldest sale first
//! - [`catalog`] - Product and client maintenance
//! - [`live`] - Self-refreshing read models
//! - [`reports`] - Sales / debt reports and the dashboard
//! - [`retry`] - Conflict retry with backoff
//! - [`config`] - `tally.toml` + environment
//! - [`error`] - Service error type and UI payload
//!
//! ## Usage
//!
//! ```rust,ignore
//! tally_service::init_tracing();
//!
//! let tally = tally_service::open(&TallyConfig::load(None)?).await?;
//! let record = tally
//!     .sales()
//!     .complete_sale(cart.items(), Some(&client.to_ref()), PaymentMode::Credit)
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod config;
pub mod debt;
pub mod error;
pub mod live;
pub mod reports;
pub mod retry;
pub mod sale;

// =============================================================================
// Re-exports
// =============================================================================

pub use catalog::CatalogService;
pub use config::{StoreBackend, TallyConfig};
pub use debt::{DebtLedger, PaymentReceipt};
pub use error::{ErrorCode, ErrorPayload, ServiceError, ServiceResult};
pub use live::{LiveView, LiveViews};
pub use reports::ReportService;
pub use retry::RetryPolicy;
pub use sale::{SaleCoordinator, SaleRecord};

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use tally_db::{AnyStore, CatalogStore, Database, MemoryStore};

/// Installs the global tracing subscriber.
///
/// Default filter `info,tally=debug,sqlx=warn`, overridable with `RUST_LOG`.
/// Does nothing if a subscriber is already installed.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tally=debug,sqlx=warn"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// =============================================================================
// Facade
// =============================================================================

/// Every service over one shared store.
#[derive(Debug)]
pub struct Tally<S> {
    store: Arc<S>,
    sales: SaleCoordinator<S>,
    debts: DebtLedger<S>,
    catalog: CatalogService<S>,
    reports: ReportService<S>,
    live: LiveViews<S>,
}

impl<S> Clone for Tally<S> {
    fn clone(&self) -> Self {
        Tally {
            store: Arc::clone(&self.store),
            sales: self.sales.clone(),
            debts: self.debts.clone(),
            catalog: self.catalog.clone(),
            reports: self.reports.clone(),
            live: self.live.clone(),
        }
    }
}

impl<S: CatalogStore> Tally<S> {
    pub fn new(store: S, config: &TallyConfig) -> Self {
        let store = Arc::new(store);
        let policy = config.retry_policy();

        Tally {
            sales: SaleCoordinator::new(Arc::clone(&store), policy),
            debts: DebtLedger::new(Arc::clone(&store)),
            catalog: CatalogService::new(Arc::clone(&store), policy)
                .enforce_unique_sku(config.catalog.enforce_unique_sku),
            reports: ReportService::new(Arc::clone(&store))
                .low_stock_threshold(config.catalog.low_stock_threshold),
            live: LiveViews::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn sales(&self) -> &SaleCoordinator<S> {
        &self.sales
    }

    pub fn debts(&self) -> &DebtLedger<S> {
        &self.debts
    }

    pub fn catalog(&self) -> &CatalogService<S> {
        &self.catalog
    }

    pub fn reports(&self) -> &ReportService<S> {
        &self.reports
    }

    pub fn live(&self) -> &LiveViews<S> {
        &self.live
    }

    /// The underlying store, for reads no service wraps.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

/// Opens the store named by `config` and wires every service to it.
///
/// For SQLite the database directory is created if needed and pending
/// migrations are applied.
pub async fn open(config: &TallyConfig) -> ServiceResult<Tally<AnyStore>> {
    config.validate()?;

    let store = match config.database.backend {
        StoreBackend::Memory => AnyStore::from(MemoryStore::new()),
        StoreBackend::Sqlite => {
            let db_config = config.db_config();
            if let Some(parent) = db_config.database_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| ServiceError::StoreUnavailable(e.to_string()))?;
                }
            }
            AnyStore::from(Database::new(db_config).await?)
        }
    };

    info!(backend = %config.database.backend, "Tally store opened");
    Ok(Tally::new(store, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{ClientContact, Money, NewProduct};

    #[tokio::test]
    async fn test_open_memory_backend() {
        let tally = open(&TallyConfig::in_memory()).await.unwrap();
        assert!(matches!(tally.store().as_ref(), AnyStore::Memory(_)));

        let product = tally
            .catalog()
            .create_product(NewProduct {
                name: "Tea".to_string(),
                sku: "BEV-TEA".to_string(),
                price: Money::from_cents(120),
                stock: 4,
            })
            .await
            .unwrap();
        let client = tally
            .catalog()
            .create_client(ClientContact {
                name: "Ana".to_string(),
                phone: "555-0101".to_string(),
                email: None,
            })
            .await
            .unwrap();

        assert_eq!(tally.catalog().list_products().await.unwrap(), vec![product]);
        assert_eq!(tally.catalog().list_clients().await.unwrap(), vec![client]);
    }

    #[tokio::test]
    async fn test_open_sqlite_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TallyConfig::default();
        config.database.path = Some(dir.path().join("data").join("tally.db"));

        let tally = open(&config).await.unwrap();
        assert!(matches!(tally.store().as_ref(), AnyStore::Sqlite(_)));
        assert!(dir.path().join("data").join("tally.db").exists());
    }

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }
}
