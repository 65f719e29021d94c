//! # Sale Commands

use clap::Subcommand;
use chrono::NaiveDate;
use anyhow::bail;
use tracing::{debug, warn};

use tally_core::{Money, PaymentStatus, SaleForm};

use super::Context;

#[derive(Subcommand)]
pub enum SaleCommand {
    /// Record a new sale, or edit one with --edit.
    ///
    /// When editing, fields not given keep their stored value.
    Record {
        /// Service performed. Required for a new sale.
        #[arg(short, long)]
        service: Option<String>,

        /// Price charged, e.g. 150.00. Required for a new sale.
        #[arg(short, long)]
        price: Option<String>,

        /// Cost of the service (0 for a new sale).
        #[arg(long)]
        cost: Option<String>,

        #[arg(long)]
        client: Option<String>,

        /// Client's WhatsApp number. Sales without one earn no points;
        /// pass an empty value to detach an edited sale from its customer.
        #[arg(long)]
        contact: Option<String>,

        /// Sale date (YYYY-MM-DD), today for a new sale.
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long, conflicts_with = "paid")]
        unpaid: bool,

        /// Mark an edited sale as paid.
        #[arg(long)]
        paid: bool,

        #[arg(long)]
        notes: Option<String>,

        /// Key of the sale being edited.
        #[arg(long)]
        edit: Option<String>,

        /// Points to redeem as a discount on this sale.
        #[arg(long)]
        redeem: Option<i64>,
    },

    /// Delete a sale and reverse the points it earned.
    Delete { id: String },

    /// Mark an unpaid sale as paid.
    MarkPaid { id: String },
}

/// Form fields given on the command line. `None` means "not given".
struct FormFlags {
    service: Option<String>,
    price: Option<String>,
    cost: Option<String>,
    client: Option<String>,
    contact: Option<String>,
    date: Option<NaiveDate>,
    status: Option<PaymentStatus>,
    notes: Option<String>,
}

impl FormFlags {
    /// Overrides the given fields of `form`.
    fn apply(self, form: &mut SaleForm) -> anyhow::Result<()> {
        if let Some(service) = self.service {
            form.service_type = service;
        }
        if let Some(price) = self.price {
            form.price = Money::parse_decimal(&price)?;
        }
        if let Some(cost) = self.cost {
            form.service_cost = Money::parse_decimal(&cost)?;
        }
        if let Some(client) = self.client {
            form.client_name = client;
        }
        if let Some(contact) = self.contact {
            form.whatsapp_number = contact;
        }
        if let Some(date) = self.date {
            form.date = Some(date);
        }
        if let Some(status) = self.status {
            form.payment_status = status;
        }
        if let Some(notes) = self.notes {
            form.notes = notes;
        }
        Ok(())
    }
}

/// Builds the form to save: the stored sale when editing, otherwise a blank
/// form dated today that must be given a service and a price.
async fn build_form(ctx: &Context, edit: Option<&str>, flags: FormFlags) -> anyhow::Result<SaleForm> {
    let mut form = match edit {
        Some(id) => {
            let stored = ctx.engine.sale(id).await?;
            debug!(sale_id = id, "Editing stored sale");
            SaleForm::from_sale(&stored)
        }
        None => {
            if flags.service.is_none() || flags.price.is_none() {
                bail!("--service and --price are required for a new sale");
            }
            SaleForm {
                date: Some(ctx.today()),
                ..SaleForm::default()
            }
        }
    };
    flags.apply(&mut form)?;
    Ok(form)
}

pub async fn run(ctx: &Context, cmd: SaleCommand) -> anyhow::Result<()> {
    match cmd {
        SaleCommand::Record {
            service,
            price,
            cost,
            client,
            contact,
            date,
            unpaid,
            paid,
            notes,
            edit,
            redeem,
        } => {
            let status = match (unpaid, paid) {
                (true, _) => Some(PaymentStatus::Unpaid),
                (false, true) => Some(PaymentStatus::Paid),
                (false, false) => None,
            };
            let flags = FormFlags {
                service,
                price,
                cost,
                client,
                contact,
                date,
                status,
                notes,
            };
            let mut form = build_form(ctx, edit.as_deref(), flags).await?;

            let pending = match redeem {
                Some(points) => {
                    let pending = ctx
                        .engine
                        .on_redeem_for_discount(&form.whatsapp_number, points)
                        .await?;
                    form.price = (form.price - pending.discount).max(Money::zero());
                    debug!(discount = %pending.discount, price = %form.price, "Discount applied to price");
                    Some(pending)
                }
                None => None,
            };

            let outcome = ctx
                .engine
                .on_sale_saved(&form, edit.as_deref(), pending)
                .await?;
            if let Some(err) = &outcome.loyalty_error {
                warn!(error = %err, "Points were not updated; run `reconcile` to repair balances");
            }

            ctx.emit(&outcome, |o| {
                println!("Saved sale {}", o.sale_id);
                if o.created_customer {
                    println!("New customer created");
                }
                for (contact, delta) in o.balance_changes.iter().filter(|(_, d)| **d != 0) {
                    println!("Points change for {}: {:+}", contact, delta);
                }
                if o.redeemed_points > 0 {
                    println!("Redeemed {} points", o.redeemed_points);
                }
            })
        }

        SaleCommand::Delete { id } => {
            let outcome = ctx.engine.on_sale_deleted(&id).await?;
            ctx.emit(&outcome, |o| {
                println!("Deleted sale {} ({} points reversed)", o.sale_id, o.points_reversed);
            })
        }

        SaleCommand::MarkPaid { id } => {
            ctx.engine.on_sale_marked_paid(&id).await?;
            ctx.emit(&id, |id| println!("Sale {} marked as paid", id))
        }
    }
}
