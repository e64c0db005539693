//! `storectl check`: start the configured store, ping it, shut it down.

use anyhow::{Context, Result};
use storectl_core::{parse_database_config, ConsoleConfig, StoreRegistry};
use tracing::{info, warn};

use super::describe;

pub async fn run_check(registry: &StoreRegistry, config: &ConsoleConfig, skip_ping: bool) -> Result<()> {
    let store = registry
        .get(&config.store.name)
        .with_context(|| format!("store {:?} is not registered", config.store.name))?;

    if let Err(err) = store.initialize(&config.store).await {
        // A replica failure leaves master handles open until destroy
        if let Err(destroy_err) = store.destroy().await {
            warn!(error = %destroy_err, "destroy reported an error");
        }
        return Err(err).with_context(|| format!("failed to initialize store {}", store.name()));
    }
    info!(store = store.name(), "store started");

    let pinged = if skip_ping {
        Ok(())
    } else {
        store.ping().await
    };

    // Always release pools, even when the ping failed
    if let Err(err) = store.destroy().await {
        warn!(error = %err, "destroy reported an error");
    }

    pinged.with_context(|| format!("store {} is not reachable", store.name()))?;

    // Already validated by initialize
    let (master, replica) = parse_database_config(store.name(), &config.store.option)?;
    println!("writes:  {}", describe(&master));
    match &replica {
        Some(replica) => println!("reads:   {}", describe(replica)),
        None => println!("reads:   (master)"),
    }

    if skip_ping {
        println!("{}: started (ping skipped)", store.name());
    } else {
        println!("{}: ok", store.name());
    }
    Ok(())
}
