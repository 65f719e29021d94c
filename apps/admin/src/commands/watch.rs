//! # Watch Command
//!
//! Runs the [`FeedWatcher`] in the foreground so tier changes are persisted
//! as soon as sales land. Stops on Ctrl-C.
//!
//! The change feed only carries writes made through this process's store,
//! so the whole state is also reloaded every `interval` seconds to pick up
//! sales recorded by other `tally-admin` invocations.

use anyhow::Context as _;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use tally_engine::FeedWatcher;

use super::Context;

pub async fn run(ctx: &Context, refresh_secs: u64) -> anyhow::Result<()> {
    let (watcher, handle) = FeedWatcher::new(ctx.engine.clone());
    let task = tokio::spawn(watcher.run());
    info!(refresh_secs, "Watching for changes, press Ctrl-C to stop");

    let mut refresh = interval(Duration::from_secs(refresh_secs.max(1)));
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the watcher already loads on start.
    refresh.tick().await;

    let mut refreshed_tiers = 0usize;
    loop {
        tokio::select! {
            _ = refresh.tick() => {
                match ctx.engine.refresh_from_store().await {
                    Ok(changes) => refreshed_tiers += changes.len(),
                    Err(e) => error!(error = %e, "Periodic refresh failed"),
                }
            }

            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    handle.shutdown().await?;
    let summary = task.await.context("Watcher task panicked")??;
    println!(
        "Applied {} snapshots, wrote {} tier changes, {} feed errors",
        summary.snapshots_applied,
        summary.tiers_written as usize + refreshed_tiers,
        summary.feed_errors
    );
    Ok(())
}
