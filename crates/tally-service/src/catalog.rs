//! # Catalog Maintenance
//!
//! Create, edit and delete products and clients.
//!
//! ## Stock
//! ```text
//! create_product(stock = 40)       initial stock, written once
//! update_product_details(...)      name / sku / price only
//! adjust_stock(id, -5)             transaction + conflict retry, like a sale
//! complete_sale(...)               (crate::sale)
//! ```
//! Stock never moves outside a store transaction, so a restock racing a
//! sale cannot lose either update.
//!
//! ## SKU Uniqueness
//! SKUs are free text and duplicates are allowed unless
//! `catalog.enforce_unique_sku` is set.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use tally_core::{
    Client, ClientContact, ClientId, NewClient, NewProduct, Product, ProductDetails, ProductId,
    ValidationError,
};
use tally_db::{CatalogStore, StoreTransaction};

use crate::error::{ServiceError, ServiceResult};
use crate::retry::RetryPolicy;

#[derive(Debug)]
pub struct CatalogService<S> {
    store: Arc<S>,
    policy: RetryPolicy,
    enforce_unique_sku: bool,
}

impl<S> Clone for CatalogService<S> {
    fn clone(&self) -> Self {
        CatalogService {
            store: Arc::clone(&self.store),
            policy: self.policy,
            enforce_unique_sku: self.enforce_unique_sku,
        }
    }
}

impl<S: CatalogStore> CatalogService<S> {
    pub fn new(store: Arc<S>, policy: RetryPolicy) -> Self {
        CatalogService {
            store,
            policy,
            enforce_unique_sku: false,
        }
    }

    pub fn enforce_unique_sku(mut self, enforce: bool) -> Self {
        self.enforce_unique_sku = enforce;
        self
    }

    // =========================================================================
    // Products
    // =========================================================================

    pub async fn get_product(&self, id: &ProductId) -> ServiceResult<Product> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id.as_str()))
    }

    pub async fn list_products(&self) -> ServiceResult<Vec<Product>> {
        Ok(self.store.list_products().await?)
    }

    pub async fn create_product(&self, input: NewProduct) -> ServiceResult<Product> {
        let product = Product::new(ProductId::new(), input)?;
        self.check_sku(product.sku(), None).await?;
        self.store.insert_product(&product).await?;

        info!(
            product_id = %product.id(),
            sku = product.sku(),
            stock = product.stock(),
            "Product created"
        );
        Ok(product)
    }

    /// Rewrites name, SKU and price. Stock is left alone.
    pub async fn update_product_details(
        &self,
        id: &ProductId,
        details: ProductDetails,
    ) -> ServiceResult<Product> {
        details.validate()?;
        self.check_sku(details.sku.trim(), Some(id)).await?;
        let product = self.store.update_product_details(id, &details).await?;

        info!(product_id = %id, sku = product.sku(), "Product updated");
        Ok(product)
    }

    /// Adds `delta` (negative to remove) to a product's stock.
    ///
    /// Runs in a store transaction and retries on conflict. A result below
    /// zero is rejected with `InsufficientStock`, one past `i64::MAX` with a
    /// validation error. Either way nothing is written.
    pub async fn adjust_stock(&self, id: &ProductId, delta: i64) -> ServiceResult<Product> {
        let (product, attempts) = self
            .policy
            .run("adjust_stock", move |_| self.adjust_stock_once(id, delta))
            .await?;

        info!(
            product_id = %id,
            delta,
            stock = product.stock(),
            attempts,
            "Stock adjusted"
        );
        Ok(product)
    }

    async fn adjust_stock_once(&self, id: &ProductId, delta: i64) -> ServiceResult<Product> {
        let mut txn = self.store.begin().await?;
        let product = txn
            .get_product(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id.as_str()))?;

        let stock = product.stock().checked_add(delta).ok_or_else(|| {
            ValidationError::OutOfRange {
                field: "stock".to_string(),
                min: 0,
                max: i64::MAX,
            }
        })?;
        if stock < 0 {
            return Err(ServiceError::InsufficientStock {
                product: product.name().to_string(),
                available: product.stock(),
                requested: delta.saturating_neg(),
            });
        }

        txn.set_stock(id, stock)?;
        txn.commit().await?;
        Ok(product.with_stock(stock)?)
    }

    pub async fn delete_product(&self, id: &ProductId) -> ServiceResult<()> {
        self.store.delete_product(id).await?;
        info!(product_id = %id, "Product deleted");
        Ok(())
    }

    async fn check_sku(&self, sku: &str, editing: Option<&ProductId>) -> ServiceResult<()> {
        if !self.enforce_unique_sku {
            return Ok(());
        }
        let taken = self
            .store
            .find_products_by_sku(sku)
            .await?
            .into_iter()
            .any(|p| Some(p.id()) != editing);
        if taken {
            debug!(sku, "Duplicate SKU rejected");
            return Err(ValidationError::Duplicate {
                field: "sku".to_string(),
                value: sku.to_string(),
            }
            .into());
        }
        Ok(())
    }

    // =========================================================================
    // Clients
    // =========================================================================

    pub async fn get_client(&self, id: &ClientId) -> ServiceResult<Client> {
        self.store
            .get_client(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Client", id.as_str()))
    }

    pub async fn list_clients(&self) -> ServiceResult<Vec<Client>> {
        Ok(self.store.list_clients().await?)
    }

    pub async fn create_client(&self, input: NewClient) -> ServiceResult<Client> {
        let client = Client::new(ClientId::new(), input, Utc::now())?;
        self.store.insert_client(&client).await?;

        info!(client_id = %client.id(), "Client created");
        Ok(client)
    }

    /// Replaces a client's contact fields. Past sales keep the name they
    /// were made under.
    pub async fn update_client_contact(
        &self,
        id: &ClientId,
        contact: ClientContact,
    ) -> ServiceResult<Client> {
        contact.validate()?;
        let updated = self.get_client(id).await?.with_contact(contact)?;
        self.store.update_client(&updated).await?;

        info!(client_id = %id, "Client updated");
        Ok(updated)
    }

    pub async fn delete_client(&self, id: &ClientId) -> ServiceResult<()> {
        self.store.delete_client(id).await?;
        info!(client_id = %id, "Client deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::Money;
    use tally_db::MemoryStore;

    fn service(store: MemoryStore) -> CatalogService<MemoryStore> {
        CatalogService::new(Arc::new(store), RetryPolicy::immediate(3))
    }

    fn rice(stock: i64) -> NewProduct {
        NewProduct {
            name: "Rice 1kg".to_string(),
            sku: "GRO-RICE".to_string(),
            price: Money::from_cents(250),
            stock,
        }
    }

    #[tokio::test]
    async fn test_adjust_stock_rejects_negative_result() {
        let catalog = service(MemoryStore::new());
        let product = catalog.create_product(rice(3)).await.unwrap();

        let err = catalog.adjust_stock(product.id(), -4).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InsufficientStock {
                available: 3,
                requested: 4,
                ..
            }
        ));
        assert_eq!(catalog.get_product(product.id()).await.unwrap().stock(), 3);

        let product = catalog.adjust_stock(product.id(), -3).await.unwrap();
        assert_eq!(product.stock(), 0);
    }

    #[tokio::test]
    async fn test_adjust_stock_rejects_out_of_range_deltas() {
        let catalog = service(MemoryStore::new());
        let product = catalog.create_product(rice(1)).await.unwrap();

        let err = catalog.adjust_stock(product.id(), i64::MAX).await.unwrap_err();
        assert!(err.is_validation());

        let err = catalog.adjust_stock(product.id(), i64::MIN).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InsufficientStock {
                available: 1,
                requested: i64::MAX,
                ..
            }
        ));
        assert_eq!(catalog.get_product(product.id()).await.unwrap().stock(), 1);
    }

    #[tokio::test]
    async fn test_adjust_stock_retries_conflicts() {
        let store = MemoryStore::new();
        let catalog = service(store.clone());
        let product = catalog.create_product(rice(5)).await.unwrap();

        store.inject_commit_conflicts(2);
        let product = catalog.adjust_stock(product.id(), 10).await.unwrap();
        assert_eq!(product.stock(), 15);
        assert_eq!(catalog.get_product(product.id()).await.unwrap().stock(), 15);
    }

    #[tokio::test]
    async fn test_adjust_missing_product_is_not_found() {
        let catalog = service(MemoryStore::new());
        let err = catalog
            .adjust_stock(&ProductId::from("ghost"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_sku_only_rejected_when_enforced() {
        let permissive = service(MemoryStore::new());
        permissive.create_product(rice(1)).await.unwrap();
        permissive.create_product(rice(1)).await.unwrap();
        assert_eq!(permissive.list_products().await.unwrap().len(), 2);

        let strict = service(MemoryStore::new()).enforce_unique_sku(true);
        let first = strict.create_product(rice(1)).await.unwrap();
        let err = strict.create_product(rice(1)).await.unwrap_err();
        assert!(err.is_validation());

        // Re-saving a product with its own SKU is fine.
        let details = ProductDetails {
            name: "Rice 1kg (bag)".to_string(),
            sku: "GRO-RICE".to_string(),
            price: Money::from_cents(260),
        };
        let updated = strict.update_product_details(first.id(), details).await.unwrap();
        assert_eq!(updated.stock(), 1);
    }
}
