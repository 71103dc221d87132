//! # Reports & Dashboard
//!
//! Fetches what a report needs and hands it to the pure aggregations in
//! `tally_core::report`. Date ranges cover whole UTC days.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use tally_core::report::{self, ClientDebt, DashboardStats, DateRange, DebtReport, SalesReport};
use tally_core::LOW_STOCK_THRESHOLD;
use tally_db::{CatalogStore, SaleFilter};

use crate::error::ServiceResult;

#[derive(Debug)]
pub struct ReportService<S> {
    store: Arc<S>,
    low_stock_threshold: i64,
}

impl<S> Clone for ReportService<S> {
    fn clone(&self) -> Self {
        ReportService {
            store: Arc::clone(&self.store),
            low_stock_threshold: self.low_stock_threshold,
        }
    }
}

impl<S: CatalogStore> ReportService<S> {
    pub fn new(store: Arc<S>) -> Self {
        ReportService {
            store,
            low_stock_threshold: LOW_STOCK_THRESHOLD,
        }
    }

    pub fn low_stock_threshold(mut self, threshold: i64) -> Self {
        self.low_stock_threshold = threshold;
        self
    }

    /// Sales made from the start of `from` to the end of `to`, inclusive.
    pub async fn sales_report(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ServiceResult<SalesReport> {
        let range = DateRange::from_days(from, to)?;
        let sales = self.store.list_sales(&SaleFilter::all().in_range(range)).await?;
        debug!(%from, %to, sales = sales.len(), "Building sales report");
        Ok(report::sales_report(range, &sales))
    }

    /// Debt created in the range that is still outstanding.
    pub async fn debt_report(&self, from: NaiveDate, to: NaiveDate) -> ServiceResult<DebtReport> {
        let range = DateRange::from_days(from, to)?;
        let pending = self
            .store
            .list_sales(&SaleFilter::pending().in_range(range))
            .await?;
        debug!(%from, %to, sales = pending.len(), "Building debt report");
        Ok(report::debt_report(range, &pending))
    }

    pub async fn client_debts(&self) -> ServiceResult<Vec<ClientDebt>> {
        let pending = self.store.list_sales(&SaleFilter::pending()).await?;
        Ok(report::client_debts(&pending))
    }

    pub async fn dashboard(&self, now: DateTime<Utc>) -> ServiceResult<DashboardStats> {
        let products = self.store.list_products().await?;
        let clients = self.store.list_clients().await?;
        let sales = self.store.list_sales(&SaleFilter::all()).await?;
        Ok(report::dashboard(
            now,
            &products,
            &clients,
            &sales,
            self.low_stock_threshold,
        )?)
    }
}
