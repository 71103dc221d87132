//! # Sale Repository
//!
//! Sales are created only inside a transaction ([`insert_sale`]) and only
//! ever modified by a payment compare-and-set ([`SaleRepository::record_payment`]).
//!
//! ## Loading
//! ```text
//! SELECT sales      WHERE <filter>  ORDER BY created_at_ns   ──┐
//! SELECT sale_lines JOIN sales WHERE <filter> ORDER BY position ├─► Sale::restore
//!                                                              ──┘
//! ```

use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use tally_core::{ClientId, ClientRef, Money, ProductId, Sale, SaleId, SaleLine, SaleStatus};

use super::{from_nanos, to_nanos};
use crate::error::{DbError, DbResult};
use crate::store::SaleFilter;

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: String,
    client_id: String,
    client_name: String,
    total_cents: i64,
    amount_paid_cents: i64,
    status: SaleStatus,
    created_at_ns: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    sale_id: String,
    product_id: String,
    product_name: String,
    quantity: i64,
    unit_price_cents: i64,
}

impl SaleRow {
    fn into_sale(self, lines: Vec<SaleLine>) -> DbResult<Sale> {
        let stored_status = self.status;
        let sale = Sale::restore(
            SaleId::from(self.id),
            ClientRef {
                id: ClientId::from(self.client_id),
                name: self.client_name,
            },
            lines,
            Money::from_cents(self.total_cents),
            Money::from_cents(self.amount_paid_cents),
            from_nanos(self.created_at_ns)?,
        )?;

        if sale.status() != stored_status {
            return Err(DbError::Corrupt(format!(
                "sale {} stored as {} but amounts say {}",
                sale.id(),
                stored_status.as_str(),
                sale.status().as_str()
            )));
        }
        Ok(sale)
    }
}

impl From<LineRow> for SaleLine {
    fn from(row: LineRow) -> Self {
        SaleLine {
            product_id: ProductId::from(row.product_id),
            product_name: row.product_name,
            quantity: row.quantity,
            unit_price: Money::from_cents(row.unit_price_cents),
        }
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &SaleFilter) -> DbResult<()> {
    qb.push(" WHERE 1 = 1");
    if let Some(status) = filter.status {
        qb.push(" AND s.status = ").push_bind(status);
    }
    if let Some(client_id) = &filter.client_id {
        qb.push(" AND s.client_id = ")
            .push_bind(client_id.as_str().to_string());
    }
    if let Some(from) = filter.from {
        qb.push(" AND s.created_at_ns >= ").push_bind(to_nanos(from)?);
    }
    if let Some(until) = filter.until {
        qb.push(" AND s.created_at_ns < ").push_bind(to_nanos(until)?);
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    pub async fn get_by_id(&self, id: &SaleId) -> DbResult<Option<Sale>> {
        let row = sqlx::query_as::<_, SaleRow>(
            r#"
            SELECT id, client_id, client_name, total_cents, amount_paid_cents, status, created_at_ns
            FROM sales
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, LineRow>(
            r#"
            SELECT sale_id, product_id, product_name, quantity, unit_price_cents
            FROM sale_lines
            WHERE sale_id = ?1
            ORDER BY position
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        row.into_sale(lines.into_iter().map(SaleLine::from).collect())
            .map(Some)
    }

    /// Matching sales, oldest first.
    pub async fn list(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        let mut sales_query = QueryBuilder::<Sqlite>::new(
            "SELECT s.id, s.client_id, s.client_name, s.total_cents, s.amount_paid_cents, \
             s.status, s.created_at_ns FROM sales s",
        );
        push_filter(&mut sales_query, filter)?;
        sales_query.push(" ORDER BY s.created_at_ns, s.id");

        let rows: Vec<SaleRow> = sales_query
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        let mut lines_query = QueryBuilder::<Sqlite>::new(
            "SELECT l.sale_id, l.product_id, l.product_name, l.quantity, l.unit_price_cents \
             FROM sale_lines l JOIN sales s ON s.id = l.sale_id",
        );
        push_filter(&mut lines_query, filter)?;
        lines_query.push(" ORDER BY l.sale_id, l.position");

        let line_rows: Vec<LineRow> = lines_query
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        let mut lines_by_sale: HashMap<String, Vec<SaleLine>> = HashMap::new();
        for row in line_rows {
            lines_by_sale
                .entry(row.sale_id.clone())
                .or_default()
                .push(SaleLine::from(row));
        }

        rows.into_iter()
            .map(|row| {
                let lines = lines_by_sale.remove(&row.id).unwrap_or_default();
                row.into_sale(lines)
            })
            .collect()
    }

    /// Compare-and-set of amount_paid. See
    /// [`crate::CatalogStore::record_sale_payment`].
    pub async fn record_payment(
        &self,
        id: &SaleId,
        expected_paid: Money,
        applied: Money,
    ) -> DbResult<Sale> {
        if !applied.is_positive() {
            return Err(DbError::InvalidWrite(format!(
                "payment of {} on sale {}",
                applied, id
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE sales SET
                amount_paid_cents = amount_paid_cents + ?2,
                status = CASE
                    WHEN amount_paid_cents + ?2 >= total_cents THEN 'paid'
                    ELSE 'pending'
                END
            WHERE id = ?1
              AND amount_paid_cents = ?3
              AND amount_paid_cents + ?2 <= total_cents
            "#,
        )
        .bind(id.as_str())
        .bind(applied.cents())
        .bind(expected_paid.cents())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM sales WHERE id = ?1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
            return Err(match exists {
                Some(_) => DbError::conflict("Sale", id.as_str()),
                None => DbError::not_found("Sale", id.as_str()),
            });
        }

        debug!(sale_id = %id, applied = %applied, "Sale payment recorded");

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id.as_str()))
    }
}

// =============================================================================
// Transaction Statements
// =============================================================================

/// Inserts a sale and its lines on an open transaction.
pub(crate) async fn insert_sale(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sales (
            id, client_id, client_name, total_cents, amount_paid_cents, status, created_at_ns
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(sale.id().as_str())
    .bind(sale.client_id().as_str())
    .bind(sale.client_name())
    .bind(sale.total().cents())
    .bind(sale.amount_paid().cents())
    .bind(sale.status())
    .bind(to_nanos(sale.created_at())?)
    .execute(&mut *conn)
    .await?;

    for (position, line) in sale.lines().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO sale_lines (
                sale_id, position, product_id, product_name, quantity, unit_price_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(sale.id().as_str())
        .bind(position as i64)
        .bind(line.product_id.as_str())
        .bind(line.product_name.as_str())
        .bind(line.quantity)
        .bind(line.unit_price.cents())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
