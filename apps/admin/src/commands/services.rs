//! # Service Catalog Commands
//!
//! Services are saved from a JSON file shaped like the stored document:
//!
//! ```text
//! {
//!   "name": "Printing",
//!   "categories": [
//!     { "name": "A4", "items": [ { "name": "Color", "price": 5 } ] }
//!   ]
//! }
//! ```

use anyhow::{anyhow, Context as _};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use tracing::debug;

use tally_core::catalog::{quote, search, Discount};
use tally_core::Service;

use super::Context;

#[derive(Subcommand)]
pub enum ServiceCommand {
    /// List catalog services.
    List {
        /// Only services whose name, categories or items contain this text.
        #[arg(long)]
        search: Option<String>,
    },

    /// Print one service's price list.
    Show {
        id: String,
        /// Percentage off every price, e.g. 10 or 12.5.
        #[arg(long)]
        discount: Option<String>,
    },

    /// Create a service from a JSON file, or replace one with --edit.
    Save {
        file: PathBuf,
        /// Key of the service being replaced.
        #[arg(long)]
        edit: Option<String>,
    },

    /// Remove a service from the catalog.
    Delete {
        id: String,
        /// Required; the deletion cannot be undone.
        #[arg(long)]
        yes: bool,
    },

    /// Price selected items for a customer message.
    Quote {
        id: String,
        /// Item name; repeat for several items.
        #[arg(long = "item", required = true)]
        items: Vec<String>,
        #[arg(long)]
        discount: Option<String>,
    },
}

pub async fn run(ctx: &Context, cmd: ServiceCommand) -> anyhow::Result<()> {
    match cmd {
        ServiceCommand::List { search: term } => {
            let services = ctx.engine.services().await?;
            let matching: Vec<&Service> = search(&services, term.as_deref().unwrap_or(""));
            ctx.emit(&matching, |services| {
                for s in services {
                    let items: usize = s.categories.iter().map(|c| c.items.len()).sum();
                    println!("{:<24} {:<32} {:>3} categories {:>4} items", s.id, s.name, s.categories.len(), items);
                }
            })
        }

        ServiceCommand::Show { id, discount } => {
            let discount = parse_discount(discount.as_deref())?;
            let service = ctx.engine.service(&id).await?;
            ctx.emit(&service, |s| {
                println!("{}", s.name);
                for category in &s.categories {
                    println!("  {}", category.name);
                    for item in &category.items {
                        println!("    {:<32} {:>10}", item.name, discount.apply(item.price));
                    }
                }
            })
        }

        ServiceCommand::Save { file, edit } => {
            let service = read_service(&file)?;
            let id = ctx.engine.on_service_saved(&service, edit.as_deref()).await?;
            ctx.emit(&id, |id| println!("Saved service {}", id))
        }

        ServiceCommand::Delete { id, yes } => {
            if !yes {
                anyhow::bail!("Refusing to delete service {} without --yes", id);
            }
            ctx.engine.on_service_deleted(&id).await?;
            ctx.emit(&id, |id| println!("Deleted service {}", id))
        }

        ServiceCommand::Quote { id, items, discount } => {
            let discount = parse_discount(discount.as_deref())?;
            let service = ctx.engine.service(&id).await?;
            let selected = items
                .iter()
                .map(|name| {
                    service
                        .item(name)
                        .ok_or_else(|| anyhow!("No item '{}' in service {}", name.trim(), service.name))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            let q = quote(&selected, discount);
            ctx.emit(&q, |q| {
                println!("{}", q.summary());
                println!("Total: {}", q.total);
            })
        }
    }
}

fn parse_discount(input: Option<&str>) -> anyhow::Result<Discount> {
    match input {
        Some(text) => Ok(Discount::parse(text)?),
        None => Ok(Discount::none()),
    }
}

fn read_service(file: &Path) -> anyhow::Result<Service> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let service: Service = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a service document", file.display()))?;
    debug!(name = %service.name, categories = service.categories.len(), "Service file parsed");
    Ok(service)
}
