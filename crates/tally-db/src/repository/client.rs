//! # Client Repository

use sqlx::SqlitePool;
use tracing::debug;

use tally_core::{Client, ClientId};

use super::{from_nanos, to_nanos};
use crate::error::{DbError, DbResult};

const SELECT_CLIENT: &str = "SELECT id, name, phone, email, created_at_ns FROM clients";

#[derive(Debug, sqlx::FromRow)]
struct ClientRow {
    id: String,
    name: String,
    phone: String,
    email: Option<String>,
    created_at_ns: i64,
}

impl ClientRow {
    fn into_client(self) -> DbResult<Client> {
        Ok(Client::restore(
            ClientId::from(self.id),
            self.name,
            self.phone,
            self.email,
            from_nanos(self.created_at_ns)?,
        )?)
    }
}

#[derive(Debug, Clone)]
pub struct ClientRepository {
    pool: SqlitePool,
}

impl ClientRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ClientRepository { pool }
    }

    pub async fn get_by_id(&self, id: &ClientId) -> DbResult<Option<Client>> {
        sqlx::query_as::<_, ClientRow>(&format!("{SELECT_CLIENT} WHERE id = ?1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(ClientRow::into_client)
            .transpose()
    }

    pub async fn list(&self) -> DbResult<Vec<Client>> {
        let rows = sqlx::query_as::<_, ClientRow>(&format!("{SELECT_CLIENT} ORDER BY name, id"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ClientRow::into_client).collect()
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clients")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn insert(&self, client: &Client) -> DbResult<()> {
        debug!(client_id = %client.id(), "Inserting client");

        sqlx::query(
            r#"
            INSERT INTO clients (id, name, phone, email, created_at_ns)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(client.id().as_str())
        .bind(client.name())
        .bind(client.phone())
        .bind(client.email())
        .bind(to_nanos(client.created_at())?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rewrites contact fields. `created_at` is never touched.
    pub async fn update_contact(&self, client: &Client) -> DbResult<()> {
        debug!(client_id = %client.id(), "Updating client contact");

        let result = sqlx::query(
            "UPDATE clients SET name = ?2, phone = ?3, email = ?4 WHERE id = ?1",
        )
        .bind(client.id().as_str())
        .bind(client.name())
        .bind(client.phone())
        .bind(client.email())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Client", client.id().as_str()));
        }
        Ok(())
    }

    pub async fn delete(&self, id: &ClientId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM clients WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Client", id.as_str()));
        }
        Ok(())
    }
}
