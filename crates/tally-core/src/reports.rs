//! # Reports
//!
//! Dashboard figures computed from the sale and customer sets: debt list,
//! profit & loss, KPI cards, inactive customers, per-service profitability
//! and the daily alerts.
//!
//! All functions take `today` explicitly so results are reproducible.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::ledger_view::CustomerView;
use crate::money::Money;
use crate::types::Sale;

// =============================================================================
// Debt
// =============================================================================

/// Unpaid sales and their total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DebtReport {
    pub sales: Vec<Sale>,
    pub total_debt: Money,
}

pub fn debt_list(sales: &[Sale]) -> DebtReport {
    let unpaid: Vec<Sale> = sales.iter().filter(|s| s.is_unpaid()).cloned().collect();
    let total_debt = unpaid.iter().map(|s| s.price).sum();
    DebtReport {
        sales: unpaid,
        total_debt,
    }
}

// =============================================================================
// Profit & Loss
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReportPeriod {
    Monthly,
    Quarterly,
}

impl ReportPeriod {
    /// First day of the period containing `today`.
    pub fn start(&self, today: NaiveDate) -> NaiveDate {
        let month = match self {
            ReportPeriod::Monthly => today.month(),
            ReportPeriod::Quarterly => (today.month0() / 3) * 3 + 1,
        };
        NaiveDate::from_ymd_opt(today.year(), month, 1).unwrap_or(today)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProfitAndLoss {
    pub period: ReportPeriod,
    #[ts(as = "String")]
    pub start: NaiveDate,
    pub income: Money,
    pub expenses: Money,
    pub net: Money,
}

/// Income and service costs of every sale dated on or after the period start.
pub fn profit_and_loss(sales: &[Sale], period: ReportPeriod, today: NaiveDate) -> ProfitAndLoss {
    let start = period.start(today);
    let (income, expenses) = sales
        .iter()
        .filter(|s| s.date >= start)
        .fold((Money::zero(), Money::zero()), |(inc, exp), s| {
            (inc + s.price, exp + s.service_cost)
        });

    ProfitAndLoss {
        period,
        start,
        income,
        expenses,
        net: income - expenses,
    }
}

// =============================================================================
// KPIs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct KpiSummary {
    pub total_revenue: Money,
    pub total_profit: Money,
    /// Profit over revenue in basis points; 0 when there is no revenue.
    pub profit_margin_bps: i64,
    /// Contacts whose first-ever sale falls in the current month.
    pub new_customers_this_month: u32,
    pub total_orders: u32,
    /// Client with the highest spend this month.
    pub top_client_this_month: Option<String>,
    /// Most frequent service type overall.
    pub top_service: Option<String>,
}

fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

pub fn kpi_summary(sales: &[Sale], today: NaiveDate) -> KpiSummary {
    let total_revenue: Money = sales.iter().map(|s| s.price).sum();
    let total_profit: Money = sales.iter().map(|s| s.profit).sum();
    let profit_margin_bps = if total_revenue.is_positive() {
        (total_profit.cents() as i128 * 10_000 / total_revenue.cents() as i128) as i64
    } else {
        0
    };

    let mut first_sale: BTreeMap<&str, NaiveDate> = BTreeMap::new();
    for sale in sales {
        if let Some(contact) = sale.whatsapp_number.as_deref() {
            first_sale
                .entry(contact)
                .and_modify(|d| *d = (*d).min(sale.date))
                .or_insert(sale.date);
        }
    }
    let new_customers_this_month = first_sale
        .values()
        .filter(|d| same_month(**d, today))
        .count() as u32;

    let mut month_spend: BTreeMap<&str, Money> = BTreeMap::new();
    for sale in sales.iter().filter(|s| same_month(s.date, today)) {
        *month_spend.entry(sale.client_name.as_str()).or_default() += sale.price;
    }
    let top_client_this_month = month_spend
        .into_iter()
        .max_by_key(|(_, spend)| *spend)
        .map(|(name, _)| name.to_string());

    let mut service_counts: BTreeMap<&str, u32> = BTreeMap::new();
    for sale in sales {
        *service_counts.entry(sale.service_type.as_str()).or_default() += 1;
    }
    let top_service = service_counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(service, _)| service.to_string());

    KpiSummary {
        total_revenue,
        total_profit,
        profit_margin_bps,
        new_customers_this_month,
        total_orders: sales.len() as u32,
        top_client_this_month,
        top_service,
    }
}

// =============================================================================
// Customers
// =============================================================================

/// Customers with no purchase in the last `days` days (or none at all).
pub fn inactive_customers(views: &BTreeMap<String, CustomerView>, days: u32, today: NaiveDate) -> Vec<CustomerView> {
    let threshold = today - Duration::days(i64::from(days));
    views
        .values()
        .filter(|v| !v.customer.whatsapp_number.is_empty())
        .filter(|v| v.last_purchase.map_or(true, |last| last < threshold))
        .cloned()
        .collect()
}

/// Contacts of every customer carrying `tag`, for marketing exports.
pub fn customers_with_tag(views: &BTreeMap<String, CustomerView>, tag: &str) -> Vec<String> {
    views
        .values()
        .filter(|v| v.customer.has_tag(tag))
        .map(|v| v.customer.whatsapp_number.clone())
        .collect()
}

// =============================================================================
// Services
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub service_type: String,
    pub orders: u32,
    pub revenue: Money,
    pub profit: Money,
}

impl ServiceStats {
    pub fn average_profit(&self) -> Money {
        if self.orders == 0 {
            return Money::zero();
        }
        Money::from_cents(self.profit.cents() / i64::from(self.orders))
    }
}

/// Per-service totals, highest revenue first.
pub fn service_profitability(sales: &[Sale]) -> Vec<ServiceStats> {
    let mut stats: BTreeMap<&str, ServiceStats> = BTreeMap::new();
    for sale in sales {
        let entry = stats
            .entry(sale.service_type.as_str())
            .or_insert_with(|| ServiceStats {
                service_type: sale.service_type.clone(),
                orders: 0,
                revenue: Money::zero(),
                profit: Money::zero(),
            });
        entry.orders += 1;
        entry.revenue += sale.price;
        entry.profit += sale.profit;
    }

    let mut rows: Vec<ServiceStats> = stats.into_values().collect();
    rows.sort_by(|a, b| b.revenue.cmp(&a.revenue));
    rows
}

// =============================================================================
// Daily Alerts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DailyAlert {
    /// Today's sales are below yesterday's.
    SalesDrop,
    /// Today's profit has not reached the daily goal.
    TargetNotMet,
}

pub fn daily_alerts(sales: &[Sale], today: NaiveDate, daily_goal: Money) -> Vec<DailyAlert> {
    let yesterday = today - Duration::days(1);
    let day_total = |day: NaiveDate, pick: fn(&Sale) -> Money| -> Money {
        sales.iter().filter(|s| s.date == day).map(pick).sum()
    };

    let today_sales = day_total(today, |s| s.price);
    let yesterday_sales = day_total(yesterday, |s| s.price);
    let today_profit = day_total(today, |s| s.profit);

    let mut alerts = Vec::new();
    if yesterday_sales.is_positive() && today_sales < yesterday_sales {
        alerts.push(DailyAlert::SalesDrop);
    }
    if today_profit < daily_goal {
        alerts.push(DailyAlert::TargetNotMet);
    }
    alerts
}

// =============================================================================
// Unit Tests
// =============================================================================
