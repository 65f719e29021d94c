//! # Report Commands
//!
//! Every report loads both collections once through
//! [`LoyaltyEngine::refresh_from_store`](tally_engine::LoyaltyEngine::refresh_from_store),
//! which also persists any tier changes found, then runs the pure report
//! functions over the resulting state.

use clap::Subcommand;
use tracing::info;

use tally_core::reports::{
    customers_with_tag, daily_alerts, debt_list, inactive_customers, kpi_summary, profit_and_loss,
    service_profitability, DailyAlert, ReportPeriod,
};
use tally_core::Money;

use super::Context;

#[derive(Subcommand)]
pub enum ReportCommand {
    /// Unpaid sales and total debt.
    Debts,

    /// Income, expenses and net for the current month.
    Pnl {
        /// Use the current quarter instead.
        #[arg(long)]
        quarterly: bool,
    },

    /// Dashboard KPI cards.
    Kpis,

    /// Customers without a recent purchase.
    Inactive {
        /// Days without a purchase (defaults to the configured value).
        #[arg(long)]
        days: Option<u32>,
    },

    /// Revenue and profit per service type.
    Services,

    /// Sales-drop and daily-target alerts.
    Alerts,

    /// Contacts carrying a tag, one per line.
    Segment { tag: String },

    /// Points, tier and spend of every customer.
    Customers,

    /// Most recent activity log entries.
    Activity {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

pub async fn run(ctx: &Context, cmd: ReportCommand) -> anyhow::Result<()> {
    if let ReportCommand::Activity { limit } = cmd {
        let events = ctx.engine.audit().recent(limit).await?;
        return ctx.emit(&events, |events| {
            for e in events {
                let amount = e.amount.map(|a| a.to_string()).unwrap_or_default();
                let client = e.client.as_deref().unwrap_or("");
                println!(
                    "{}  {:<12} {:<40} {:>10} {}",
                    e.timestamp.format("%Y-%m-%d %H:%M"),
                    e.user,
                    e.action,
                    amount,
                    client
                );
            }
        });
    }

    let tier_changes = ctx.engine.refresh_from_store().await?;
    if !tier_changes.is_empty() {
        info!(changes = tier_changes.len(), "Tiers updated while loading");
    }

    let state = ctx.engine.state();
    let state = state.read();
    let today = ctx.today();

    match cmd {
        ReportCommand::Debts => ctx.emit(&debt_list(state.sales()), |report| {
            for sale in &report.sales {
                println!("{}  {:<24} {:>10}", sale.date, sale.client_name, sale.price);
            }
            println!("Total debt: {}", report.total_debt);
        }),

        ReportCommand::Pnl { quarterly } => {
            let period = if quarterly {
                ReportPeriod::Quarterly
            } else {
                ReportPeriod::Monthly
            };
            ctx.emit(&profit_and_loss(state.sales(), period, today), |pnl| {
                println!("Since {}", pnl.start);
                println!("  Income:   {:>12}", pnl.income);
                println!("  Expenses: {:>12}", pnl.expenses);
                println!("  Net:      {:>12}", pnl.net);
            })
        }

        ReportCommand::Kpis => ctx.emit(&kpi_summary(state.sales(), today), |k| {
            println!("Revenue:             {}", k.total_revenue);
            println!("Profit:              {}", k.total_profit);
            println!(
                "Margin:              {}.{:02}%",
                k.profit_margin_bps / 100,
                (k.profit_margin_bps % 100).abs()
            );
            println!("Orders:              {}", k.total_orders);
            println!("New this month:      {}", k.new_customers_this_month);
            println!("Top client (month):  {}", k.top_client_this_month.as_deref().unwrap_or("-"));
            println!("Top service:         {}", k.top_service.as_deref().unwrap_or("-"));
        }),

        ReportCommand::Inactive { days } => {
            let days = days.unwrap_or(ctx.config.reports.inactivity_days);
            ctx.emit(&inactive_customers(state.views(), days, today), |views| {
                for v in views {
                    let last = v
                        .last_purchase
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "never".to_string());
                    println!("{:<16} {:<24} {}", v.customer.whatsapp_number, v.customer.name, last);
                }
            })
        }

        ReportCommand::Services => ctx.emit(&service_profitability(state.sales()), |rows| {
            for s in rows {
                println!(
                    "{:<28} {:>5} orders  revenue {:>12}  profit {:>12}  avg {:>10}",
                    s.service_type,
                    s.orders,
                    s.revenue,
                    s.profit,
                    s.average_profit()
                );
            }
        }),

        ReportCommand::Alerts => {
            let goal = ctx.config.daily_goal();
            ctx.emit(&daily_alerts(state.sales(), today, goal), |alerts| {
                if alerts.is_empty() {
                    println!("No alerts");
                }
                for alert in alerts {
                    match alert {
                        DailyAlert::SalesDrop => println!("Sales today are below yesterday's"),
                        DailyAlert::TargetNotMet => println!("Today's profit is below the {} goal", goal),
                    }
                }
            })
        }

        ReportCommand::Segment { tag } => ctx.emit(&customers_with_tag(state.views(), tag.trim()), |contacts| {
            for contact in contacts {
                println!("{}", contact);
            }
        }),

        ReportCommand::Customers => {
            let views: Vec<_> = state.views().values().collect();
            ctx.emit(&views, |views| {
                for v in views {
                    println!(
                        "{:<16} {:<24} {:<7} {:>7} pts  {:>4} orders  {:>12}",
                        v.customer.whatsapp_number,
                        v.customer.name,
                        v.customer.tier,
                        v.customer.loyalty_points,
                        v.total_orders,
                        v.total_spent
                    );
                }
                let points: i64 = views.iter().map(|v| v.customer.loyalty_points).sum();
                println!("Outstanding points: {} (worth {} at cash-back)", points, cash_value(ctx, points));
            })
        }

        ReportCommand::Activity { .. } => Ok(()),
    }
}

fn cash_value(ctx: &Context, points: i64) -> Money {
    tally_core::loyalty::points_value(points, ctx.config.loyalty.cashback_rate)
}
