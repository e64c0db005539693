use anyhow::Result;
use storectl_core::StoreRegistry;

/// Print every registered store name, one per line.
pub fn run_stores(registry: &StoreRegistry) -> Result<()> {
    for name in registry.names() {
        println!("{name}");
    }
    Ok(())
}
