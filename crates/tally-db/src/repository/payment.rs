//! # Payment Repository
//!
//! Payments are append-only.

use sqlx::SqlitePool;
use tracing::debug;

use tally_core::{ClientId, ClientRef, Money, Payment, PaymentId};

use super::{from_nanos, to_nanos};
use crate::error::DbResult;

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: String,
    client_id: String,
    client_name: String,
    amount_cents: i64,
    created_at_ns: i64,
}

impl PaymentRow {
    fn into_payment(self) -> DbResult<Payment> {
        let client = ClientRef {
            id: ClientId::from(self.client_id),
            name: self.client_name,
        };
        Ok(Payment::new(
            PaymentId::from(self.id),
            &client,
            Money::from_cents(self.amount_cents),
            from_nanos(self.created_at_ns)?,
        )?)
    }
}

#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    pub async fn insert(&self, payment: &Payment) -> DbResult<()> {
        debug!(
            payment_id = %payment.id(),
            client_id = %payment.client_id(),
            amount = %payment.amount(),
            "Inserting payment"
        );

        sqlx::query(
            r#"
            INSERT INTO payments (id, client_id, client_name, amount_cents, created_at_ns)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(payment.id().as_str())
        .bind(payment.client_id().as_str())
        .bind(payment.client_name())
        .bind(payment.amount().cents())
        .bind(to_nanos(payment.created_at())?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Oldest first; optionally only one client's.
    pub async fn list(&self, client_id: Option<&ClientId>) -> DbResult<Vec<Payment>> {
        let rows = match client_id {
            Some(client_id) => {
                sqlx::query_as::<_, PaymentRow>(
                    r#"
                    SELECT id, client_id, client_name, amount_cents, created_at_ns
                    FROM payments
                    WHERE client_id = ?1
                    ORDER BY created_at_ns, id
                    "#,
                )
                .bind(client_id.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, PaymentRow>(
                    r#"
                    SELECT id, client_id, client_name, amount_cents, created_at_ns
                    FROM payments
                    ORDER BY created_at_ns, id
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(PaymentRow::into_payment).collect()
    }
}
