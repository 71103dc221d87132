//! # Live Read Models
//!
//! Self-refreshing lists for screens that stay open: inventory, clients,
//! pending sales, the debts screen.
//!
//! ## How It Works
//! ```text
//! ┌────────────────┐  ChangeEvent   ┌──────────────────────────┐  Arc<Vec<T>>
//! │  CatalogStore  │ ─────────────► │  refresh task            │ ────────────►  watch
//! │  (broadcast)   │                │  matching collection?    │                 │
//! └────────────────┘                │    yes → re-list, send   │                 ▼
//!                                   │  lagged → re-list, send  │           LiveView<T>
//!                                   └──────────────────────────┘           snapshot()
//!                                                                          changed()
//! ```
//!
//! The view subscribes to changes *before* its first load, so no write
//! between the two is missed. Snapshots are eventually consistent. A
//! snapshot is never mutated after it is published.
//!
//! Dropping the view (or calling [`LiveView::unsubscribe`]) stops its task.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tally_core::report::{client_debts, ClientDebt};
use tally_core::{Client, ClientId, Payment, Product, Sale};
use tally_db::{CatalogStore, Collection, DbResult, SaleFilter};

use crate::error::{ServiceError, ServiceResult};

/// A list that re-reads itself whenever its collection changes.
#[derive(Debug)]
pub struct LiveView<T> {
    rx: watch::Receiver<Arc<Vec<T>>>,
    task: JoinHandle<()>,
}

impl<T: Send + Sync + 'static> LiveView<T> {
    async fn spawn<S, F, Fut>(
        store: Arc<S>,
        collection: Collection,
        load: F,
    ) -> ServiceResult<Self>
    where
        S: CatalogStore,
        F: Fn(Arc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = DbResult<Vec<T>>> + Send + 'static,
    {
        let mut changes = store.changes();
        let initial = load(Arc::clone(&store)).await?;
        let (tx, rx) = watch::channel(Arc::new(initial));

        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(event) if event.collection != collection => continue,
                    Ok(event) => {
                        debug!(
                            ?collection,
                            id = %event.id,
                            kind = ?event.kind,
                            "Refreshing live view"
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(?collection, skipped, "Live view lagged, reloading");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }

                match load(Arc::clone(&store)).await {
                    Ok(items) => {
                        if tx.send(Arc::new(items)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(?collection, error = %e, "Live view reload failed"),
                }
            }
            debug!(?collection, "Live view stopped");
        });

        Ok(LiveView { rx, task })
    }

    /// The most recent snapshot.
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.rx.borrow())
    }

    /// Waits for the next snapshot and returns it.
    pub async fn changed(&mut self) -> ServiceResult<Arc<Vec<T>>> {
        self.rx
            .changed()
            .await
            .map_err(|_| ServiceError::StoreUnavailable("live view stopped".to_string()))?;
        Ok(Arc::clone(&self.rx.borrow_and_update()))
    }

    /// Waits until a snapshot satisfies `predicate`, checking the current
    /// one first.
    pub async fn wait_for<P>(&mut self, mut predicate: P) -> ServiceResult<Arc<Vec<T>>>
    where
        P: FnMut(&[T]) -> bool,
    {
        let current = Arc::clone(&self.rx.borrow_and_update());
        if predicate(&current) {
            return Ok(current);
        }
        loop {
            let next = self.changed().await?;
            if predicate(&next) {
                return Ok(next);
            }
        }
    }

    /// Stops the refresh task. Same as dropping the view.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Drop for LiveView<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// View Factory
// =============================================================================

/// Opens live views over one store.
#[derive(Debug)]
pub struct LiveViews<S> {
    store: Arc<S>,
}

impl<S> Clone for LiveViews<S> {
    fn clone(&self) -> Self {
        LiveViews {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: CatalogStore> LiveViews<S> {
    pub fn new(store: Arc<S>) -> Self {
        LiveViews { store }
    }

    /// Products by name.
    pub async fn watch_products(&self) -> ServiceResult<LiveView<Product>> {
        LiveView::spawn(Arc::clone(&self.store), Collection::Products, |store| async move {
            store.list_products().await
        })
        .await
    }

    /// Clients by name.
    pub async fn watch_clients(&self) -> ServiceResult<LiveView<Client>> {
        LiveView::spawn(Arc::clone(&self.store), Collection::Clients, |store| async move {
            store.list_clients().await
        })
        .await
    }

    /// Sales matching `filter`, oldest first.
    pub async fn watch_sales(&self, filter: SaleFilter) -> ServiceResult<LiveView<Sale>> {
        LiveView::spawn(Arc::clone(&self.store), Collection::Sales, move |store| {
            let filter = filter.clone();
            async move { store.list_sales(&filter).await }
        })
        .await
    }

    /// The debts screen: pending sales grouped per client.
    pub async fn watch_client_debts(&self) -> ServiceResult<LiveView<ClientDebt>> {
        LiveView::spawn(Arc::clone(&self.store), Collection::Sales, |store| async move {
            let pending = store.list_sales(&SaleFilter::pending()).await?;
            Ok(client_debts(&pending))
        })
        .await
    }

    /// Payments, optionally for one client, oldest first.
    pub async fn watch_payments(
        &self,
        client_id: Option<ClientId>,
    ) -> ServiceResult<LiveView<Payment>> {
        LiveView::spawn(Arc::clone(&self.store), Collection::Payments, move |store| {
            let client_id = client_id.clone();
            async move { store.list_payments(client_id.as_ref()).await }
        })
        .await
    }
}
