//! # tally-admin
//!
//! Operator CLI for the Tally loyalty engine.
//!
//! ## Module Organization
//! ```text
//! tally-admin/
//! ├── main.rs         ◄─── You are here (CLI parsing, tracing, startup)
//! └── commands/
//!     ├── mod.rs      ◄─── Shared context and output helpers
//!     ├── sales.rs    ◄─── Record, delete, mark paid
//!     ├── loyalty.rs  ◄─── Bonus, cash back, reconciliation
//!     ├── customers.rs◄─── Add, delete, tags, notes, import, purge
//!     ├── reports.rs  ◄─── Debts, P&L, KPIs, alerts, segments
//!     ├── services.rs ◄─── Catalog CRUD and discounted quotes
//!     └── watch.rs    ◄─── Live tier sync until Ctrl-C
//! ```
//!
//! ## Startup Sequence
//! 1. Parse arguments
//! 2. Initialize tracing (`RUST_LOG` overrides the default filter)
//! 3. Load `TallyConfig` (file, then `TALLY_*` environment)
//! 4. Open the SQLite store and build the engine
//! 5. Dispatch the subcommand

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use tally_engine::{LoyaltyEngine, TallyConfig};
use tally_store::SqliteStore;

use crate::commands::{customers, loyalty, reports, sales, services, watch, Context};

/// Loyalty points, tiers and reports for a service shop.
#[derive(Parser)]
#[command(name = "tally-admin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config directory).
    #[arg(short, long, env = "TALLY_CONFIG")]
    config: Option<PathBuf>,

    /// Name recorded on audit events.
    #[arg(short, long, env = "TALLY_USER", default_value = "admin")]
    user: String,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record, delete or settle sales.
    #[command(subcommand)]
    Sale(sales::SaleCommand),

    /// Grant bonus points to a customer.
    Bonus {
        contact: String,
        points: i64,
        /// Reason stored in the customer's notes.
        #[arg(short, long, default_value = "")]
        reason: String,
    },

    /// Pay out points as cash.
    CashBack { contact: String, points: i64 },

    /// Recompute every balance from the sale history.
    Reconcile,

    /// Manage customers.
    #[command(subcommand)]
    Customer(customers::CustomerCommand),

    /// Import customers from a contacts CSV export.
    Import {
        /// CSV file with "Name" and "Phone 1 - Value" columns.
        file: PathBuf,
    },

    /// Delete every imported customer.
    PurgeImported,

    /// Manage the service catalog.
    #[command(subcommand)]
    Service(services::ServiceCommand),

    /// Print dashboard reports.
    #[command(subcommand)]
    Report(reports::ReportCommand),

    /// Keep tiers in step with the store until interrupted.
    Watch {
        /// Seconds between full reloads of the store.
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },

    /// Write the effective configuration to the config file.
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = TallyConfig::load(cli.config.clone()).context("Failed to load configuration")?;
    debug!(?config, "Configuration loaded");

    if let Commands::InitConfig = cli.command {
        let path = config.save(cli.config)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    if let Some(parent) = config.store.path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
    }
    let store = SqliteStore::connect(config.store_config())
        .await
        .with_context(|| format!("Failed to open store at {}", config.store.path.display()))?;
    info!(path = %config.store.path.display(), "Store ready");

    let engine = LoyaltyEngine::new(Arc::new(store.clone()), &config).with_user(cli.user);
    let ctx = Context {
        engine: Arc::new(engine),
        config,
        json: cli.json,
    };

    let result = match cli.command {
        Commands::Sale(cmd) => sales::run(&ctx, cmd).await,
        Commands::Bonus {
            contact,
            points,
            reason,
        } => loyalty::bonus(&ctx, &contact, points, &reason).await,
        Commands::CashBack { contact, points } => loyalty::cash_back(&ctx, &contact, points).await,
        Commands::Reconcile => loyalty::reconcile(&ctx).await,
        Commands::Customer(cmd) => customers::run(&ctx, cmd).await,
        Commands::Import { file } => customers::import(&ctx, &file).await,
        Commands::PurgeImported => customers::purge(&ctx).await,
        Commands::Service(cmd) => services::run(&ctx, cmd).await,
        Commands::Report(cmd) => reports::run(&ctx, cmd).await,
        Commands::Watch { interval } => watch::run(&ctx, interval).await,
        Commands::InitConfig => Ok(()),
    };

    store.close().await;
    result
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=tally_engine=trace` - Trace the engine only
/// - Default: INFO (DEBUG for tally crates with `--verbose`)
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,tally_core=debug,tally_store=debug,tally_engine=debug,tally_admin=debug,sqlx=warn"
    } else {
        "info,sqlx=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
