//! # Customer Commands

use anyhow::Context as _;
use clap::Subcommand;
use std::path::Path;
use tracing::info;

use tally_core::TagChange;
use tally_engine::parse_contacts_csv;

use super::Context;

#[derive(Subcommand)]
pub enum CustomerCommand {
    /// Add a customer with the starting balance.
    Add {
        name: String,
        contact: String,
    },

    /// Delete a customer together with all of their sales.
    Delete {
        contact: String,
        /// Required; the deletion cannot be undone.
        #[arg(long)]
        yes: bool,
    },

    /// Add a tag.
    Tag { contact: String, tag: String },

    /// Remove a tag.
    Untag { contact: String, tag: String },

    /// Append a note.
    Note { contact: String, text: String },
}

pub async fn run(ctx: &Context, cmd: CustomerCommand) -> anyhow::Result<()> {
    match cmd {
        CustomerCommand::Add { name, contact } => {
            let customer = ctx.engine.on_customer_added(&name, &contact).await?;
            ctx.emit(&customer, |c| {
                println!(
                    "Added {} ({}) with {} points",
                    c.name, c.whatsapp_number, c.loyalty_points
                );
            })
        }

        CustomerCommand::Delete { contact, yes } => {
            if !yes {
                anyhow::bail!("Refusing to delete {} without --yes", contact);
            }
            let removed = ctx.engine.on_customer_deleted(&contact).await?;
            ctx.emit(&removed, |n| {
                println!("Deleted customer {} and {} sales", contact, n);
            })
        }

        CustomerCommand::Tag { contact, tag } => {
            ctx.engine
                .on_customer_tag_change(&contact, &tag, TagChange::Add)
                .await?;
            println!("Tagged {} with '{}'", contact, tag.trim());
            Ok(())
        }

        CustomerCommand::Untag { contact, tag } => {
            ctx.engine
                .on_customer_tag_change(&contact, &tag, TagChange::Remove)
                .await?;
            println!("Removed '{}' from {}", tag.trim(), contact);
            Ok(())
        }

        CustomerCommand::Note { contact, text } => {
            ctx.engine.on_customer_note_added(&contact, &text).await?;
            println!("Note added to {}", contact);
            Ok(())
        }
    }
}

pub async fn import(ctx: &Context, file: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let rows = parse_contacts_csv(&text)?;
    info!(rows = rows.len(), file = %file.display(), "Contacts parsed");

    let report = ctx.engine.import_customers(&rows).await;
    ctx.emit(&report, |r| {
        println!("Imported {} of {} customers", r.succeeded, r.total);
    })?;
    report.into_result()?;
    Ok(())
}

pub async fn purge(ctx: &Context) -> anyhow::Result<()> {
    let report = ctx.engine.purge_imported_customers().await?;
    ctx.emit(&report, |r| {
        println!("Deleted {} of {} imported customers", r.succeeded, r.total);
    })?;
    report.into_result()?;
    Ok(())
}
