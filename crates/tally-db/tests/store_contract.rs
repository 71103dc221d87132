//! Behaviour every `CatalogStore` backend must share.
//!
//! Each scenario is written once against the trait and run against
//! `MemoryStore`, an in-memory SQLite `Database`, and that database again
//! behind `AnyStore`.

use chrono::{Duration, TimeZone, Utc};
use tally_core::{
    Client, ClientContact, ClientId, ClientRef, Money, NewProduct, Payment, PaymentId,
    PaymentMode, Product, ProductDetails, ProductId, Sale, SaleId, SaleLine, SaleStatus,
};
use tally_db::{
    AnyStore, CatalogStore, ChangeKind, Collection, Database, DbConfig, DbError, MemoryStore,
    SaleFilter, StoreTransaction,
};

// =============================================================================
// Fixtures
// =============================================================================

async fn sqlite() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

fn product(name: &str, sku: &str, price: i64, stock: i64) -> Product {
    Product::new(
        ProductId::new(),
        NewProduct {
            name: name.to_string(),
            sku: sku.to_string(),
            price: Money::from_cents(price),
            stock,
        },
    )
    .unwrap()
}

fn client(name: &str) -> Client {
    Client::new(
        ClientId::new(),
        ClientContact {
            name: name.to_string(),
            phone: "555-0100".to_string(),
            email: None,
        },
        Utc::now(),
    )
    .unwrap()
}

fn sale_of(client: &Client, product: &Product, quantity: i64, mode: PaymentMode) -> Sale {
    sale_at(client, product, quantity, mode, Utc::now())
}

fn sale_at(
    client: &Client,
    product: &Product,
    quantity: i64,
    mode: PaymentMode,
    at: chrono::DateTime<Utc>,
) -> Sale {
    Sale::new(
        SaleId::new(),
        &client.to_ref(),
        vec![SaleLine {
            product_id: product.id().clone(),
            product_name: product.name().to_string(),
            quantity,
            unit_price: product.price(),
        }],
        mode,
        at,
    )
    .unwrap()
}

/// Commits a sale through a transaction, decrementing stock.
async fn commit_sale<S: CatalogStore>(store: &S, sale: Sale) {
    let mut txn = store.begin().await.unwrap();
    for line in sale.lines() {
        let current = txn.get_product(&line.product_id).await.unwrap().unwrap();
        txn.set_stock(&line.product_id, current.stock() - line.quantity)
            .unwrap();
    }
    txn.insert_sale(sale).unwrap();
    txn.commit().await.unwrap();
}

// =============================================================================
// Scenarios
// =============================================================================

async fn committed_transaction_applies_everything<S: CatalogStore>(store: S) {
    let rice = product("Rice", "R-1", 250, 10);
    let ana = client("Ana");
    store.insert_product(&rice).await.unwrap();
    store.insert_client(&ana).await.unwrap();

    let sale = sale_of(&ana, &rice, 3, PaymentMode::Pending);
    let sale_id = sale.id().clone();
    commit_sale(&store, sale).await;

    assert_eq!(store.get_product(rice.id()).await.unwrap().unwrap().stock(), 7);
    let stored = store.get_sale(&sale_id).await.unwrap().unwrap();
    assert_eq!(stored.total(), Money::from_cents(750));
    assert_eq!(stored.status(), SaleStatus::Pending);
    assert_eq!(stored.lines().len(), 1);
    assert_eq!(stored.client_name(), "Ana");
}

async fn stale_read_conflicts_and_writes_nothing<S: CatalogStore>(store: S) {
    let rice = product("Rice", "R-1", 250, 10);
    let ana = client("Ana");
    store.insert_product(&rice).await.unwrap();

    let mut slow = store.begin().await.unwrap();
    let seen = slow.get_product(rice.id()).await.unwrap().unwrap();
    slow.set_stock(rice.id(), seen.stock() - 4).unwrap();
    let lost_sale = sale_of(&ana, &rice, 4, PaymentMode::Paid);
    let lost_id = lost_sale.id().clone();
    slow.insert_sale(lost_sale).unwrap();

    commit_sale(&store, sale_of(&ana, &rice, 2, PaymentMode::Paid)).await;

    let err = slow.commit().await.unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err:?}");

    assert_eq!(store.get_product(rice.id()).await.unwrap().unwrap().stock(), 8);
    assert!(store.get_sale(&lost_id).await.unwrap().is_none());
}

async fn staged_stock_is_visible_inside_transaction<S: CatalogStore>(store: S) {
    let rice = product("Rice", "R-1", 250, 10);
    store.insert_product(&rice).await.unwrap();

    let mut txn = store.begin().await.unwrap();
    txn.get_product(rice.id()).await.unwrap();
    txn.set_stock(rice.id(), 6).unwrap();
    assert_eq!(txn.get_product(rice.id()).await.unwrap().unwrap().stock(), 6);

    // Not committed.
    drop(txn);
    assert_eq!(store.get_product(rice.id()).await.unwrap().unwrap().stock(), 10);
}

async fn unread_or_negative_stock_writes_rejected<S: CatalogStore>(store: S) {
    let rice = product("Rice", "R-1", 250, 10);
    store.insert_product(&rice).await.unwrap();

    let mut txn = store.begin().await.unwrap();
    assert!(matches!(
        txn.set_stock(rice.id(), 5),
        Err(DbError::InvalidWrite(_))
    ));
    txn.get_product(rice.id()).await.unwrap();
    assert!(matches!(
        txn.set_stock(rice.id(), -1),
        Err(DbError::InvalidWrite(_))
    ));
}

async fn payment_compare_and_set<S: CatalogStore>(store: S) {
    let rice = product("Rice", "R-1", 1000, 10);
    let ana = client("Ana");
    store.insert_product(&rice).await.unwrap();
    let sale = sale_of(&ana, &rice, 1, PaymentMode::Pending);
    let sale_id = sale.id().clone();
    commit_sale(&store, sale).await;

    let partly = store
        .record_sale_payment(&sale_id, Money::zero(), Money::from_cents(400))
        .await
        .unwrap();
    assert_eq!(partly.amount_paid(), Money::from_cents(400));
    assert_eq!(partly.status(), SaleStatus::Pending);

    // Stale expectation.
    let stale = store
        .record_sale_payment(&sale_id, Money::zero(), Money::from_cents(100))
        .await
        .unwrap_err();
    assert!(stale.is_conflict());

    // More than is owed.
    let over = store
        .record_sale_payment(&sale_id, Money::from_cents(400), Money::from_cents(700))
        .await
        .unwrap_err();
    assert!(over.is_conflict());

    let settled = store
        .record_sale_payment(&sale_id, Money::from_cents(400), Money::from_cents(600))
        .await
        .unwrap();
    assert_eq!(settled.status(), SaleStatus::Paid);
    assert!(settled.debt().is_zero());

    let missing = store
        .record_sale_payment(&SaleId::new(), Money::zero(), Money::from_cents(1))
        .await
        .unwrap_err();
    assert!(matches!(missing, DbError::NotFound { .. }));
}

async fn sale_filters_and_ordering<S: CatalogStore>(store: S) {
    let rice = product("Rice", "R-1", 100, 100);
    let ana = client("Ana");
    let ben = client("Ben");
    store.insert_product(&rice).await.unwrap();

    let base = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
    let newest = sale_at(&ana, &rice, 1, PaymentMode::Pending, base + Duration::hours(2));
    let oldest = sale_at(&ana, &rice, 2, PaymentMode::Pending, base);
    let paid = sale_at(&ana, &rice, 3, PaymentMode::Paid, base + Duration::hours(1));
    let other = sale_at(&ben, &rice, 4, PaymentMode::Pending, base + Duration::days(40));
    for sale in [newest.clone(), oldest.clone(), paid.clone(), other.clone()] {
        commit_sale(&store, sale).await;
    }

    let pending_for_ana = store
        .list_sales(&SaleFilter::pending().for_client(ana.id().clone()))
        .await
        .unwrap();
    let ids: Vec<&SaleId> = pending_for_ana.iter().map(Sale::id).collect();
    assert_eq!(ids, vec![oldest.id(), newest.id()]);

    let march = tally_core::report::DateRange::month_of(base).unwrap();
    let in_march = store
        .list_sales(&SaleFilter::all().in_range(march))
        .await
        .unwrap();
    assert_eq!(in_march.len(), 3);
    assert!(in_march.iter().all(|s| s.client_id() == ana.id()));

    assert_eq!(store.list_sales(&SaleFilter::all()).await.unwrap().len(), 4);
}

async fn catalog_crud_and_change_events<S: CatalogStore>(store: S) {
    let mut events = store.changes();

    let rice = product("Rice", "R-1", 250, 10);
    store.insert_product(&rice).await.unwrap();

    let updated = store
        .update_product_details(
            rice.id(),
            &ProductDetails {
                name: "Basmati Rice".to_string(),
                sku: "R-2".to_string(),
                price: Money::from_cents(300),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name(), "Basmati Rice");
    assert_eq!(updated.stock(), 10);
    assert_eq!(store.find_products_by_sku("R-2").await.unwrap().len(), 1);
    assert!(store.find_products_by_sku("R-1").await.unwrap().is_empty());

    store.delete_product(rice.id()).await.unwrap();
    assert!(store.get_product(rice.id()).await.unwrap().is_none());
    assert!(matches!(
        store.delete_product(rice.id()).await,
        Err(DbError::NotFound { .. })
    ));

    let kinds: Vec<(Collection, ChangeKind)> = (0..3)
        .map(|_| {
            let event = events.try_recv().unwrap();
            assert_eq!(event.id, rice.id().as_str());
            (event.collection, event.kind)
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            (Collection::Products, ChangeKind::Created),
            (Collection::Products, ChangeKind::Updated),
            (Collection::Products, ChangeKind::Deleted),
        ]
    );
}

async fn clients_and_payments<S: CatalogStore>(store: S) {
    let ben = client("Ben");
    let ana = client("Ana");
    store.insert_client(&ben).await.unwrap();
    store.insert_client(&ana).await.unwrap();

    let names: Vec<String> = store
        .list_clients()
        .await
        .unwrap()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    assert_eq!(names, vec!["Ana", "Ben"]);

    let renamed = ana
        .with_contact(ClientContact {
            name: "Ana Costa".to_string(),
            phone: "555-0199".to_string(),
            email: Some("ana@example.com".to_string()),
        })
        .unwrap();
    store.update_client(&renamed).await.unwrap();
    let stored = store.get_client(ana.id()).await.unwrap().unwrap();
    assert_eq!(stored.name(), "Ana Costa");
    assert_eq!(stored.email(), Some("ana@example.com"));

    let ana_ref: ClientRef = stored.to_ref();
    let now = Utc::now();
    let payment = |client: &ClientRef, cents: i64, at| {
        Payment::new(PaymentId::new(), client, Money::from_cents(cents), at).unwrap()
    };
    let first = payment(&ana_ref, 500, now - Duration::minutes(5));
    let second = payment(&ana_ref, 200, now);
    let bens = payment(&ben.to_ref(), 100, now);
    store.insert_payment(&second).await.unwrap();
    store.insert_payment(&first).await.unwrap();
    store.insert_payment(&bens).await.unwrap();

    let for_ana = store.list_payments(Some(ana.id())).await.unwrap();
    assert_eq!(for_ana.len(), 2);
    assert_eq!(for_ana[0].id(), first.id());
    assert_eq!(store.list_payments(None).await.unwrap().len(), 3);

    store.delete_client(ben.id()).await.unwrap();
    assert!(store.get_client(ben.id()).await.unwrap().is_none());
}

// =============================================================================
// Runners
// =============================================================================

macro_rules! against_every_backend {
    ($($scenario:ident),* $(,)?) => {
        mod memory {
            $(
                #[tokio::test]
                async fn $scenario() {
                    super::$scenario(super::MemoryStore::new()).await;
                }
            )*
        }

        mod sqlite {
            $(
                #[tokio::test]
                async fn $scenario() {
                    super::$scenario(super::sqlite().await).await;
                }
            )*
        }

        mod any_store {
            $(
                #[tokio::test]
                async fn $scenario() {
                    super::$scenario(super::AnyStore::from(super::sqlite().await)).await;
                }
            )*
        }
    };
}

against_every_backend!(
    committed_transaction_applies_everything,
    stale_read_conflicts_and_writes_nothing,
    staged_stock_is_visible_inside_transaction,
    unread_or_negative_stock_writes_rejected,
    payment_compare_and_set,
    sale_filters_and_ordering,
    catalog_crud_and_change_events,
    clients_and_payments,
);

// =============================================================================
// Backend-specific
// =============================================================================

#[tokio::test]
async fn memory_store_fault_hooks() {
    let store = MemoryStore::new();
    let rice = product("Rice", "R-1", 250, 10);
    store.insert_product(&rice).await.unwrap();

    store.inject_commit_conflicts(1);
    let mut txn = store.begin().await.unwrap();
    txn.get_product(rice.id()).await.unwrap();
    txn.set_stock(rice.id(), 9).unwrap();
    assert!(txn.commit().await.unwrap_err().is_conflict());

    store.set_offline(true);
    assert!(store.list_products().await.unwrap_err().is_unavailable());
    store.set_offline(false);

    store.reject_payments(true);
    let payment = Payment::new(
        PaymentId::new(),
        &client("Ana").to_ref(),
        Money::from_cents(100),
        Utc::now(),
    )
    .unwrap();
    assert!(store.insert_payment(&payment).await.unwrap_err().is_unavailable());
}

#[tokio::test]
async fn sqlite_file_database_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tally.db");
    let rice = product("Rice", "R-1", 250, 10);

    {
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        db.insert_product(&rice).await.unwrap();
        db.close().await;
    }

    let db = Database::new(DbConfig::new(&path)).await.unwrap();
    let stored = db.get_product(rice.id()).await.unwrap().unwrap();
    assert_eq!(stored, rice);
}
