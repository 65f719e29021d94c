//! # Commands
//!
//! One module per command group. Each handler takes the shared [`Context`],
//! calls into the engine and prints the result as text or, with `--json`,
//! as a JSON document on stdout.

pub mod customers;
pub mod loyalty;
pub mod reports;
pub mod sales;
pub mod services;
pub mod watch;

use serde::Serialize;
use std::sync::Arc;

use tally_engine::{LoyaltyEngine, TallyConfig};

/// Everything a command handler needs.
pub struct Context {
    pub engine: Arc<LoyaltyEngine>,
    pub config: TallyConfig,
    pub json: bool,
}

impl Context {
    /// Prints `value` as JSON in `--json` mode, otherwise runs `text`.
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text(value);
        }
        Ok(())
    }

    pub fn today(&self) -> chrono::NaiveDate {
        chrono::Local::now().date_naive()
    }
}
