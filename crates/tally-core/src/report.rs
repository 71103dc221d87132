//! # Reports
//!
//! Pure aggregations over records the caller already fetched: the sales
//! report, the debt report, the per-client debt list and the dashboard.
//!
//! ## Date Ranges
//! ```text
//! DateRange::from_days(2024-03-01, 2024-03-31)
//!
//!   2024-03-01 00:00:00.000 UTC  ≤  t  <  2024-04-01 00:00:00.000 UTC
//!
//!   i.e. the whole of the end day is included
//! ```

use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Client, ClientId, ClientRef, Product, ProductId, Sale};

// =============================================================================
// Date Range
// =============================================================================

/// Inclusive range of calendar days (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: DateTime<Utc>,
    end_exclusive: DateTime<Utc>,
}

impl DateRange {
    /// Start of `start` through the end of `end`.
    pub fn from_days(start: NaiveDate, end: NaiveDate) -> CoreResult<Self> {
        let invalid = || CoreError::InvalidDateRange {
            start: start.to_string(),
            end: end.to_string(),
        };

        if start > end {
            return Err(invalid());
        }
        let day_after = end.checked_add_days(Days::new(1)).ok_or_else(invalid)?;

        Ok(Self {
            start: start.and_time(NaiveTime::MIN).and_utc(),
            end_exclusive: day_after.and_time(NaiveTime::MIN).and_utc(),
        })
    }

    /// The single day containing `at`.
    pub fn day_of(at: DateTime<Utc>) -> CoreResult<Self> {
        let day = at.date_naive();
        Self::from_days(day, day)
    }

    /// The calendar month containing `at`.
    pub fn month_of(at: DateTime<Utc>) -> CoreResult<Self> {
        let day = at.date_naive();
        let first = day.with_day(1).unwrap_or(day);
        let next_month = first
            .checked_add_months(chrono::Months::new(1))
            .ok_or_else(|| CoreError::InvalidDateRange {
                start: first.to_string(),
                end: first.to_string(),
            })?;
        let last = next_month.pred_opt().unwrap_or(first);
        Self::from_days(first, last)
    }

    #[inline]
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// First instant after the range.
    #[inline]
    pub fn end_exclusive(&self) -> DateTime<Utc> {
        self.end_exclusive
    }

    #[inline]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end_exclusive
    }
}

// =============================================================================
// Product Ranking
// =============================================================================

/// Units and revenue of one product over a set of sales.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSales {
    pub product_id: ProductId,
    pub name: String,
    pub units: i64,
    pub revenue: Money,
}

/// Products ranked by units sold (descending), ties by name.
pub fn top_products<'a, I>(sales: I, limit: usize) -> Vec<ProductSales>
where
    I: IntoIterator<Item = &'a Sale>,
{
    let mut by_product: HashMap<&ProductId, ProductSales> = HashMap::new();

    for sale in sales {
        for line in sale.lines() {
            let entry = by_product
                .entry(&line.product_id)
                .or_insert_with(|| ProductSales {
                    product_id: line.product_id.clone(),
                    name: line.product_name.clone(),
                    units: 0,
                    revenue: Money::zero(),
                });
            entry.units += line.quantity;
            entry.revenue += line.line_total().unwrap_or(Money::MAX);
        }
    }

    let mut ranked: Vec<ProductSales> = by_product.into_values().collect();
    ranked.sort_by(|a, b| b.units.cmp(&a.units).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(limit);
    ranked
}

fn newest_first(mut sales: Vec<Sale>) -> Vec<Sale> {
    sales.sort_by_key(|s| Reverse(s.created_at()));
    sales
}

// =============================================================================
// Sales Report
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct SalesReport {
    pub range: DateRange,
    pub total_revenue: Money,
    pub number_of_sales: usize,
    pub top_product: Option<ProductSales>,
    /// Newest first.
    pub sales: Vec<Sale>,
}

pub fn sales_report(range: DateRange, sales: &[Sale]) -> SalesReport {
    let in_range: Vec<Sale> = sales
        .iter()
        .filter(|s| range.contains(s.created_at()))
        .cloned()
        .collect();

    SalesReport {
        range,
        total_revenue: in_range.iter().map(Sale::total).sum(),
        number_of_sales: in_range.len(),
        top_product: top_products(&in_range, 1).into_iter().next(),
        sales: newest_first(in_range),
    }
}

// =============================================================================
// Debt Report
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientDebtSummary {
    pub client_id: ClientId,
    pub client_name: String,
    pub total_owed: Money,
    pub sales_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebtReport {
    pub range: DateRange,
    pub total_debt: Money,
    pub clients_in_debt: usize,
    /// Largest debt first.
    pub clients: Vec<ClientDebtSummary>,
}

/// Debt created in `range` that is still outstanding.
pub fn debt_report(range: DateRange, sales: &[Sale]) -> DebtReport {
    let mut by_client: HashMap<&ClientId, ClientDebtSummary> = HashMap::new();

    for sale in sales
        .iter()
        .filter(|s| s.is_pending() && range.contains(s.created_at()))
    {
        let entry = by_client
            .entry(sale.client_id())
            .or_insert_with(|| ClientDebtSummary {
                client_id: sale.client_id().clone(),
                client_name: sale.client_name().to_string(),
                total_owed: Money::zero(),
                sales_count: 0,
            });
        entry.total_owed += sale.debt();
        entry.sales_count += 1;
    }

    let mut clients: Vec<ClientDebtSummary> = by_client.into_values().collect();
    clients.sort_by(|a, b| {
        b.total_owed
            .cmp(&a.total_owed)
            .then_with(|| a.client_name.cmp(&b.client_name))
    });

    DebtReport {
        range,
        total_debt: clients.iter().map(|c| c.total_owed).sum(),
        clients_in_debt: clients.len(),
        clients,
    }
}

// =============================================================================
// Client Debts
// =============================================================================

/// One client's open sales, as shown on the debts screen.
#[derive(Debug, Clone, Serialize)]
pub struct ClientDebt {
    pub client: ClientRef,
    pub total_debt: Money,
    /// Oldest first. This is the order payments are allocated in.
    pub sales: Vec<Sale>,
}

/// Groups every pending sale by client; clients with the most debt first.
pub fn client_debts(sales: &[Sale]) -> Vec<ClientDebt> {
    let mut by_client: HashMap<&ClientId, ClientDebt> = HashMap::new();

    for sale in sales.iter().filter(|s| s.is_pending()) {
        let entry = by_client
            .entry(sale.client_id())
            .or_insert_with(|| ClientDebt {
                client: sale.client(),
                total_debt: Money::zero(),
                sales: Vec::new(),
            });
        entry.total_debt += sale.debt();
        entry.sales.push(sale.clone());
    }

    let mut debts: Vec<ClientDebt> = by_client.into_values().collect();
    for debt in &mut debts {
        debt.sales.sort_by_key(Sale::created_at);
    }
    debts.sort_by(|a, b| {
        b.total_debt
            .cmp(&a.total_debt)
            .then_with(|| a.client.name.cmp(&b.client.name))
    });
    debts
}

// =============================================================================
// Dashboard
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub sales_today: Money,
    pub sales_this_month: Money,
    pub new_clients_today: usize,
    /// Lowest stock first.
    pub low_stock: Vec<Product>,
    pub top_products: Vec<ProductSales>,
    pub recent_sales: Vec<Sale>,
}

const DASHBOARD_TOP_PRODUCTS: usize = 5;
const DASHBOARD_RECENT_SALES: usize = 5;

pub fn dashboard(
    now: DateTime<Utc>,
    products: &[Product],
    clients: &[Client],
    sales: &[Sale],
    low_stock_threshold: i64,
) -> CoreResult<DashboardStats> {
    let today = DateRange::day_of(now)?;
    let month = DateRange::month_of(now)?;

    let month_sales: Vec<&Sale> = sales
        .iter()
        .filter(|s| month.contains(s.created_at()))
        .collect();

    let mut low_stock: Vec<Product> = products
        .iter()
        .filter(|p| p.stock() <= low_stock_threshold)
        .cloned()
        .collect();
    low_stock.sort_by(|a, b| a.stock().cmp(&b.stock()).then_with(|| a.name().cmp(b.name())));

    let mut recent_sales = newest_first(sales.to_vec());
    recent_sales.truncate(DASHBOARD_RECENT_SALES);

    Ok(DashboardStats {
        sales_today: sales
            .iter()
            .filter(|s| today.contains(s.created_at()))
            .map(Sale::total)
            .sum(),
        sales_this_month: month_sales.iter().map(|s| s.total()).sum(),
        new_clients_today: clients
            .iter()
            .filter(|c| today.contains(c.created_at()))
            .count(),
        low_stock,
        top_products: top_products(month_sales.iter().copied(), DASHBOARD_TOP_PRODUCTS),
        recent_sales,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClientContact, NewProduct, PaymentMode, SaleId, SaleLine};
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn client(id: &str, name: &str) -> ClientRef {
        ClientRef {
            id: ClientId::from(id),
            name: name.to_string(),
        }
    }

    fn sale(who: &ClientRef, lines: &[(&ProductId, &str, i64, i64)], mode: PaymentMode, when: DateTime<Utc>) -> Sale {
        let lines = lines
            .iter()
            .map(|(id, name, qty, cents)| SaleLine {
                product_id: (*id).clone(),
                product_name: name.to_string(),
                quantity: *qty,
                unit_price: Money::from_cents(*cents),
            })
            .collect();
        Sale::new(SaleId::new(), who, lines, mode, when).unwrap()
    }

    #[test]
    fn test_date_range_includes_whole_end_day() {
        let range = DateRange::from_days(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
        .unwrap();
        assert!(range.contains(at(2024, 3, 1, 0)));
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap()));
        assert!(!range.contains(at(2024, 4, 1, 0)));
        assert!(!range.contains(at(2024, 2, 29, 23)));
    }

    #[test]
    fn test_date_range_rejects_reversed_days() {
        let result = DateRange::from_days(
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        );
        assert!(matches!(result, Err(CoreError::InvalidDateRange { .. })));
    }

    #[test]
    fn test_sales_report_totals_and_order() {
        let ana = client("c-1", "Ana");
        let rice = ProductId::from("p-rice");
        let beans = ProductId::from("p-beans");
        let sales = vec![
            sale(&ana, &[(&rice, "Rice", 2, 100)], PaymentMode::Paid, at(2024, 3, 2, 10)),
            sale(&ana, &[(&beans, "Beans", 2, 300)], PaymentMode::Pending, at(2024, 3, 5, 10)),
            sale(&ana, &[(&rice, "Rice", 9, 100)], PaymentMode::Paid, at(2024, 4, 1, 10)),
        ];
        let range = DateRange::from_days(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
        .unwrap();

        let report = sales_report(range, &sales);
        assert_eq!(report.number_of_sales, 2);
        assert_eq!(report.total_revenue.cents(), 800);
        // 2 units each: tie broken by name
        assert_eq!(report.top_product.unwrap().name, "Beans");
        assert_eq!(report.sales[0].created_at(), at(2024, 3, 5, 10));
    }

    #[test]
    fn test_debt_report_groups_pending_by_client() {
        let ana = client("c-1", "Ana");
        let luis = client("c-2", "Luis");
        let p = ProductId::from("p-1");
        let sales = vec![
            sale(&ana, &[(&p, "Rice", 1, 500)], PaymentMode::Pending, at(2024, 3, 2, 10)),
            sale(&ana, &[(&p, "Rice", 1, 500)], PaymentMode::Pending, at(2024, 3, 3, 10)),
            sale(&luis, &[(&p, "Rice", 1, 2000)], PaymentMode::Pending, at(2024, 3, 4, 10)),
            sale(&luis, &[(&p, "Rice", 1, 9999)], PaymentMode::Paid, at(2024, 3, 4, 11)),
        ];
        let range = DateRange::month_of(at(2024, 3, 20, 0)).unwrap();

        let report = debt_report(range, &sales);
        assert_eq!(report.total_debt.cents(), 3000);
        assert_eq!(report.clients_in_debt, 2);
        assert_eq!(report.clients[0].client_name, "Luis");
        assert_eq!(report.clients[1].sales_count, 2);
    }

    #[test]
    fn test_client_debts_are_oldest_first_within_client() {
        let ana = client("c-1", "Ana");
        let p = ProductId::from("p-1");
        let newer = sale(&ana, &[(&p, "Rice", 1, 300)], PaymentMode::Pending, at(2024, 3, 9, 10));
        let older = sale(&ana, &[(&p, "Rice", 1, 200)], PaymentMode::Pending, at(2024, 3, 1, 10));

        let debts = client_debts(&[newer, older.clone()]);
        assert_eq!(debts.len(), 1);
        assert_eq!(debts[0].total_debt.cents(), 500);
        assert_eq!(debts[0].sales[0].id(), older.id());
    }

    #[test]
    fn test_dashboard() {
        let now = at(2024, 3, 15, 18);
        let ana = client("c-1", "Ana");
        let p = ProductId::from("p-1");
        let sales = vec![
            sale(&ana, &[(&p, "Rice", 1, 500)], PaymentMode::Paid, at(2024, 3, 15, 9)),
            sale(&ana, &[(&p, "Rice", 3, 500)], PaymentMode::Pending, at(2024, 3, 2, 9)),
            sale(&ana, &[(&p, "Rice", 1, 700)], PaymentMode::Paid, at(2024, 2, 28, 9)),
        ];
        let products = vec![
            Product::new(
                ProductId::new(),
                NewProduct { name: "Low".into(), sku: "L".into(), price: Money::from_cents(1), stock: 10 },
            )
            .unwrap(),
            Product::new(
                ProductId::new(),
                NewProduct { name: "Plenty".into(), sku: "P".into(), price: Money::from_cents(1), stock: 11 },
            )
            .unwrap(),
        ];
        let clients = vec![Client::new(
            ClientId::new(),
            ClientContact { name: "Ana".into(), phone: "1".into(), email: None },
            at(2024, 3, 15, 8),
        )
        .unwrap()];

        let stats = dashboard(now, &products, &clients, &sales, 10).unwrap();
        assert_eq!(stats.sales_today.cents(), 500);
        assert_eq!(stats.sales_this_month.cents(), 2000);
        assert_eq!(stats.new_clients_today, 1);
        assert_eq!(stats.low_stock.len(), 1);
        assert_eq!(stats.top_products[0].units, 4);
        assert_eq!(stats.recent_sales.len(), 3);
    }
}
