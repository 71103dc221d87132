//! # SQLite Transactions
//!
//! Reads go straight to the pool and remember each product's `version`.
//! Writes are buffered. `commit` opens a real SQLite transaction, re-checks
//! every remembered version while writing, and either commits everything or
//! rolls everything back.
//!
//! ```text
//! commit()
//!   BEGIN
//!   for each product read:
//!     written?  UPDATE ... WHERE version = v   0 rows → ROLLBACK, Conflict
//!     else      SELECT version                 moved  → ROLLBACK, Conflict
//!   INSERT sales / sale_lines
//!   COMMIT
//!   publish change events
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::debug;

use tally_core::{Product, ProductId, Sale};

use crate::error::{DbError, DbResult};
use crate::repository::product::{self, ProductRepository};
use crate::repository::sale;
use crate::store::{ChangeEvent, ChangeKind, Collection, StoreTransaction};

#[derive(Debug)]
pub struct SqliteTransaction {
    pool: SqlitePool,
    changes: broadcast::Sender<ChangeEvent>,
    reads: HashMap<ProductId, i64>,
    stock_writes: HashMap<ProductId, i64>,
    sales: Vec<Sale>,
}

impl SqliteTransaction {
    pub(crate) fn new(pool: SqlitePool, changes: broadcast::Sender<ChangeEvent>) -> Self {
        Self {
            pool,
            changes,
            reads: HashMap::new(),
            stock_writes: HashMap::new(),
            sales: Vec::new(),
        }
    }
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    async fn get_product(&mut self, id: &ProductId) -> DbResult<Option<Product>> {
        let row = ProductRepository::new(self.pool.clone()).get_row(id).await?;
        let Some(row) = row else {
            return Ok(None);
        };
        self.reads.entry(id.clone()).or_insert(row.version());

        let product = row.into_product()?;
        match self.stock_writes.get(id) {
            Some(&stock) => Ok(Some(product.with_stock(stock)?)),
            None => Ok(Some(product)),
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
        let mut tx = self.pool.begin().await?;

        for (id, version) in &self.reads {
            let still_current = match self.stock_writes.get(id) {
                Some(&stock) => product::set_stock_if_version(&mut tx, id, stock, *version).await?,
                None => product::version_of(&mut tx, id).await? == Some(*version),
            };
            if !still_current {
                debug!(product_id = %id, "Product changed since read, rolling back");
                // Dropping `tx` rolls back.
                return Err(DbError::conflict("Product", id.as_str()));
            }
        }

        for s in &self.sales {
            sale::insert_sale(&mut tx, s).await?;
        }

        tx.commit().await?;

        for id in self.stock_writes.keys() {
            let _ = self.changes.send(ChangeEvent::new(
                Collection::Products,
                id.as_str(),
                ChangeKind::Updated,
            ));
        }
        for s in &self.sales {
            let _ = self.changes.send(ChangeEvent::new(
                Collection::Sales,
                s.id().as_str(),
                ChangeKind::Created,
            ));
        }
        Ok(())
    }
}
