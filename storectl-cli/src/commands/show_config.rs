//! `storectl show-config`: parse the store section without connecting.

use anyhow::{Context, Result};
use serde_json::json;
use storectl_core::{parse_database_config, ConsoleConfig, StoreRegistry};

use super::describe;

pub fn run_show_config(registry: &StoreRegistry, config: &ConsoleConfig, as_json: bool) -> Result<()> {
    let store = &config.store;
    registry
        .get(&store.name)
        .with_context(|| format!("store {:?} is not registered", store.name))?;

    let (master, replica) = parse_database_config(&store.name, &store.option)?;

    if as_json {
        let doc = json!({
            "store": store.name,
            "master": master,
            "replica": replica,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("store:   {}", store.name);
    println!("master:  {}", describe(&master));
    match &replica {
        Some(replica) => println!("replica: {}", describe(replica)),
        None => println!("replica: (master)"),
    }
    Ok(())
}
