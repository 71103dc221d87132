//! Payment application: oldest-first allocation, overpayment and partial
//! failure reporting.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tally_core::{
    Client, ClientContact, ClientId, ClientRef, Money, PaymentMode, ProductId, Sale, SaleId,
    SaleLine, SaleStatus,
};
use tally_db::{CatalogStore, Database, DbConfig, DbError, MemoryStore, StoreTransaction};
use tally_service::{DebtLedger, ServiceError};

// =============================================================================
// Fixtures
// =============================================================================

fn dollars(amount: i64) -> Money {
    Money::from_cents(amount * 100)
}

async fn add_client<S: CatalogStore>(store: &S, name: &str) -> ClientRef {
    let client = Client::new(
        ClientId::new(),
        ClientContact {
            name: name.to_string(),
            phone: "555-0100".to_string(),
            email: Some(format!("{}@example.com", name.to_lowercase())),
        },
        Utc::now(),
    )
    .unwrap();
    store.insert_client(&client).await.unwrap();
    client.to_ref()
}

/// A credit sale of `total`, made `hours_ago` hours ago. Not stored.
fn credit_sale(client: &ClientRef, total: Money, hours_ago: i64) -> Sale {
    Sale::new(
        SaleId::new(),
        client,
        vec![SaleLine {
            product_id: ProductId::from("p-goods"),
            product_name: "Goods".to_string(),
            quantity: 1,
            unit_price: total,
        }],
        PaymentMode::Pending,
        Utc::now() - Duration::hours(hours_ago),
    )
    .unwrap()
}

async fn store_sales<S: CatalogStore>(store: &S, sales: &[Sale]) {
    let mut txn = store.begin().await.unwrap();
    for sale in sales {
        txn.insert_sale(sale.clone()).unwrap();
    }
    txn.commit().await.unwrap();
}

/// Stores credit sales of the given dollar totals, oldest first.
async fn open_debts<S: CatalogStore>(
    store: &S,
    client: &ClientRef,
    totals: &[i64],
) -> Vec<Sale> {
    let count = totals.len() as i64;
    let sales: Vec<Sale> = totals
        .iter()
        .enumerate()
        .map(|(i, &total)| credit_sale(client, dollars(total), count - i as i64))
        .collect();
    store_sales(store, &sales).await;
    sales
}

async fn paid_so_far<S: CatalogStore>(store: &S, sale: &Sale) -> (Money, SaleStatus) {
    let stored = store.get_sale(sale.id()).await.unwrap().unwrap();
    (stored.amount_paid(), stored.status())
}

// =============================================================================
// Allocation
// =============================================================================

#[tokio::test]
async fn payment_goes_to_oldest_sales_first() {
    let store = MemoryStore::new();
    let ana = add_client(&store, "Ana").await;
    let sales = open_debts(&store, &ana, &[10, 5, 20]).await;
    let ledger = DebtLedger::new(Arc::new(store.clone()));

    let open = ledger.open_sales_for(&ana.id).await.unwrap();
    let ids: Vec<&SaleId> = open.iter().map(Sale::id).collect();
    assert_eq!(ids, sales.iter().map(Sale::id).collect::<Vec<_>>());

    let receipt = ledger
        .register_payment(Some(&ana), dollars(12), &open)
        .await
        .unwrap();

    assert_eq!(receipt.allocations.len(), 2);
    assert_eq!(receipt.allocations[0].applied, dollars(10));
    assert_eq!(receipt.allocations[0].status, SaleStatus::Paid);
    assert_eq!(receipt.allocations[1].applied, dollars(2));
    assert_eq!(receipt.allocations[1].status, SaleStatus::Pending);
    assert!(receipt.unapplied.is_zero());
    assert_eq!(receipt.applied_total(), dollars(12));

    assert_eq!(paid_so_far(&store, &sales[0]).await, (dollars(10), SaleStatus::Paid));
    assert_eq!(paid_so_far(&store, &sales[1]).await, (dollars(2), SaleStatus::Pending));
    assert_eq!(paid_so_far(&store, &sales[2]).await, (Money::zero(), SaleStatus::Pending));

    let payments = store.list_payments(Some(&ana.id)).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount(), dollars(12));
    assert_eq!(payments[0].client_name(), "Ana");

    assert_eq!(ledger.outstanding_debt(&ana.id).await.unwrap(), dollars(23));
}

#[tokio::test]
async fn overpayment_is_recorded_in_full() {
    let store = MemoryStore::new();
    let ana = add_client(&store, "Ana").await;
    let sales = open_debts(&store, &ana, &[10, 5]).await;
    let ledger = DebtLedger::new(Arc::new(store.clone()));

    let receipt = ledger.settle(&ana, dollars(50)).await.unwrap();

    assert_eq!(receipt.applied_total(), dollars(15));
    assert_eq!(receipt.unapplied, dollars(35));
    assert_eq!(receipt.payment.amount(), dollars(50));
    for sale in &sales {
        assert_eq!(paid_so_far(&store, sale).await.1, SaleStatus::Paid);
    }
    assert!(ledger.open_sales_for(&ana.id).await.unwrap().is_empty());

    let payments = store.list_payments(None).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount(), dollars(50));
}

#[tokio::test]
async fn payment_without_debt_is_still_recorded() {
    let store = MemoryStore::new();
    let ana = add_client(&store, "Ana").await;
    let ledger = DebtLedger::new(Arc::new(store.clone()));

    let receipt = ledger.register_payment(Some(&ana), dollars(5), &[]).await.unwrap();
    assert!(receipt.allocations.is_empty());
    assert_eq!(receipt.unapplied, dollars(5));
    assert_eq!(store.list_payments(Some(&ana.id)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn rejected_input_writes_nothing() {
    let store = MemoryStore::new();
    let ana = add_client(&store, "Ana").await;
    let sales = open_debts(&store, &ana, &[10]).await;
    let ledger = DebtLedger::new(Arc::new(store.clone()));

    let err = ledger
        .register_payment(None, dollars(5), &sales)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NoClientSelected));

    let err = ledger
        .register_payment(Some(&ana), Money::zero(), &sales)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NonPositiveAmount(_)));

    let err = ledger
        .register_payment(Some(&ana), Money::from_cents(-100), &sales)
        .await
        .unwrap_err();
    assert!(err.is_validation());

    assert_eq!(paid_so_far(&store, &sales[0]).await.0, Money::zero());
    assert!(store.list_payments(None).await.unwrap().is_empty());
}

// =============================================================================
// Partial Application
// =============================================================================

#[tokio::test]
async fn missing_sale_stops_application_and_reports_progress() {
    let store = MemoryStore::new();
    let ana = add_client(&store, "Ana").await;
    let first = credit_sale(&ana, dollars(10), 3);
    let ghost = credit_sale(&ana, dollars(5), 2);
    let last = credit_sale(&ana, dollars(20), 1);
    store_sales(&store, &[first.clone(), last.clone()]).await;
    let ledger = DebtLedger::new(Arc::new(store.clone()));

    let err = ledger
        .register_payment(
            Some(&ana),
            dollars(30),
            &[first.clone(), ghost.clone(), last.clone()],
        )
        .await
        .unwrap_err();

    match err {
        ServiceError::PartialApplication {
            applied,
            failed_sale,
            source,
        } => {
            assert_eq!(applied.len(), 1);
            assert_eq!(&applied[0].sale_id, first.id());
            assert_eq!(applied[0].applied, dollars(10));
            assert_eq!(failed_sale.as_ref(), Some(ghost.id()));
            assert!(matches!(source, DbError::NotFound { .. }));
        }
        other => panic!("expected PartialApplication, got {other:?}"),
    }

    assert_eq!(paid_so_far(&store, &first).await, (dollars(10), SaleStatus::Paid));
    assert_eq!(paid_so_far(&store, &last).await.0, Money::zero());
    assert!(store.list_payments(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_payment_record_keeps_sale_updates() {
    let store = MemoryStore::new();
    let ana = add_client(&store, "Ana").await;
    let sales = open_debts(&store, &ana, &[10, 5]).await;
    let ledger = DebtLedger::new(Arc::new(store.clone()));
    store.reject_payments(true);

    let err = ledger.settle(&ana, dollars(15)).await.unwrap_err();

    match &err {
        ServiceError::PartialApplication {
            applied,
            failed_sale,
            ..
        } => {
            assert_eq!(applied.len(), 2);
            assert!(failed_sale.is_none());
        }
        other => panic!("expected PartialApplication, got {other:?}"),
    }
    assert_eq!(err.to_payload().code, tally_service::ErrorCode::PartialApplication);

    for sale in &sales {
        assert_eq!(paid_so_far(&store, sale).await.1, SaleStatus::Paid);
    }
    assert!(store.list_payments(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_open_sales_are_not_double_paid() {
    let store = MemoryStore::new();
    let ana = add_client(&store, "Ana").await;
    let sales = open_debts(&store, &ana, &[10]).await;
    let ledger = DebtLedger::new(Arc::new(store.clone()));

    let stale = ledger.open_sales_for(&ana.id).await.unwrap();
    ledger
        .register_payment(Some(&ana), dollars(4), &stale)
        .await
        .unwrap();

    let err = ledger
        .register_payment(Some(&ana), dollars(10), &stale)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::PartialApplication {
            ref applied,
            source: DbError::Conflict { .. },
            ..
        } if applied.is_empty()
    ));

    assert_eq!(paid_so_far(&store, &sales[0]).await, (dollars(4), SaleStatus::Pending));
    assert_eq!(store.list_payments(None).await.unwrap().len(), 1);
}

// =============================================================================
// SQLite
// =============================================================================

#[tokio::test]
async fn sqlite_allocation_matches_memory() {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let ana = add_client(&db, "Ana").await;
    let sales = open_debts(&db, &ana, &[10, 5, 20]).await;
    let ledger = DebtLedger::new(Arc::new(db.clone()));

    let receipt = ledger.settle(&ana, dollars(12)).await.unwrap();
    assert_eq!(receipt.allocations.len(), 2);

    assert_eq!(paid_so_far(&db, &sales[0]).await, (dollars(10), SaleStatus::Paid));
    assert_eq!(paid_so_far(&db, &sales[1]).await, (dollars(2), SaleStatus::Pending));
    assert_eq!(paid_so_far(&db, &sales[2]).await, (Money::zero(), SaleStatus::Pending));
    assert_eq!(db.list_payments(Some(&ana.id)).await.unwrap().len(), 1);
}
