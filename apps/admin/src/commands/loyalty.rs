//! # Loyalty Commands
//!
//! Bonus grants, cash-back payouts and full reconciliation.

use serde_json::json;

use super::Context;

pub async fn bonus(ctx: &Context, contact: &str, points: i64, reason: &str) -> anyhow::Result<()> {
    let balance = ctx.engine.on_bonus_grant(contact, points, reason).await?;
    ctx.emit(&json!({ "contact": contact, "balance": balance }), |_| {
        println!("Granted {} points; balance is now {}", points, balance);
    })
}

pub async fn cash_back(ctx: &Context, contact: &str, points: i64) -> anyhow::Result<()> {
    let outcome = ctx.engine.on_cash_back_redeem(contact, points).await?;
    ctx.emit(&outcome, |o| {
        println!(
            "Pay {} in cash ({} points). Remaining balance: {}",
            o.cash_value, points, o.remaining_points
        );
    })
}

/// Recomputes every balance. Exits with an error if the batch stopped part
/// way, after printing what was committed.
pub async fn reconcile(ctx: &Context) -> anyhow::Result<()> {
    let report = ctx.engine.on_reconcile_all().await?;

    ctx.emit(&report, |r| {
        if r.corrections.is_empty() {
            println!("All balances are correct");
            return;
        }
        for c in &r.corrections {
            println!("{:<16} {:>8} -> {:<8}", c.contact, c.from, c.to);
        }
        println!("Updated {} of {} balances", r.updated_count, r.corrections.len());
    })?;

    report.batch.into_result()?;
    Ok(())
}
