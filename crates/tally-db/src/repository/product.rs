//! # Product Repository
//!
//! ## Versioned Rows
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Every write bumps `version`.                                       │
//! │                                                                     │
//! │  Details edit:  UPDATE ... SET name, sku, price, version + 1        │
//! │  Stock write:   UPDATE ... SET stock, version + 1                   │
//! │                 WHERE id = ? AND version = <version read>           │
//! │                 0 rows → someone else got there first → Conflict    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock is never written through the repository directly; only
//! [`set_stock_if_version`] touches it, and only the transaction calls that.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use tally_core::{Money, Product, ProductDetails, ProductId};

use crate::error::{DbError, DbResult};

const SELECT_PRODUCT: &str = "SELECT id, name, sku, price_cents, stock, version FROM products";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    id: String,
    name: String,
    sku: String,
    price_cents: i64,
    stock: i64,
    version: i64,
}

impl ProductRow {
    pub(crate) fn version(&self) -> i64 {
        self.version
    }

    pub(crate) fn into_product(self) -> DbResult<Product> {
        Ok(Product::restore(
            ProductId::from(self.id),
            self.name,
            self.sku,
            Money::from_cents(self.price_cents),
            self.stock,
        )?)
    }
}

/// Repository for product rows.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    pub async fn get_by_id(&self, id: &ProductId) -> DbResult<Option<Product>> {
        self.get_row(id)
            .await?
            .map(ProductRow::into_product)
            .transpose()
    }

    pub(crate) async fn get_row(&self, id: &ProductId) -> DbResult<Option<ProductRow>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("{SELECT_PRODUCT} WHERE id = ?1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// All products ordered by name.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!("{SELECT_PRODUCT} ORDER BY name, id"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ProductRow::into_product).collect()
    }

    pub async fn find_by_sku(&self, sku: &str) -> DbResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "{SELECT_PRODUCT} WHERE sku = ?1 ORDER BY name, id"
        ))
        .bind(sku.trim())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ProductRow::into_product).collect()
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(product_id = %product.id(), sku = %product.sku(), "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (id, name, sku, price_cents, stock, version)
            VALUES (?1, ?2, ?3, ?4, ?5, 0)
            "#,
        )
        .bind(product.id().as_str())
        .bind(product.name())
        .bind(product.sku())
        .bind(product.price().cents())
        .bind(product.stock())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rewrites name, sku and price. Returns the stored product.
    pub async fn update_details(
        &self,
        id: &ProductId,
        details: &ProductDetails,
    ) -> DbResult<Product> {
        details
            .validate()
            .map_err(|e| DbError::InvalidWrite(e.to_string()))?;
        debug!(product_id = %id, "Updating product details");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                sku = ?3,
                price_cents = ?4,
                version = version + 1
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .bind(details.name.trim())
        .bind(details.sku.trim())
        .bind(details.price.cents())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id.as_str()));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id.as_str()))
    }

    pub async fn delete(&self, id: &ProductId) -> DbResult<()> {
        debug!(product_id = %id, "Deleting product");

        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id.as_str()));
        }
        Ok(())
    }
}

// =============================================================================
// Transaction Statements
// =============================================================================

/// Current version of a product, `None` if it no longer exists.
pub(crate) async fn version_of(conn: &mut SqliteConnection, id: &ProductId) -> DbResult<Option<i64>> {
    let version: Option<i64> = sqlx::query_scalar("SELECT version FROM products WHERE id = ?1")
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(version)
}

/// Writes `stock` if the row is still at `version`. Returns false when the
/// row moved on (or vanished).
pub(crate) async fn set_stock_if_version(
    conn: &mut SqliteConnection,
    id: &ProductId,
    stock: i64,
    version: i64,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE products SET
            stock = ?2,
            version = version + 1
        WHERE id = ?1 AND version = ?3
        "#,
    )
    .bind(id.as_str())
    .bind(stock)
    .bind(version)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}
