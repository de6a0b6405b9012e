//! Adapters command - list registered PassThru adapters

use anyhow::Result;
use kline_passthru::AdapterCatalog;

use crate::config::MergedConfig;
use crate::output::{AdapterRow, OutputContext};

/// List the adapters registered in the configuration file
pub fn adapters(config: &MergedConfig, ctx: &OutputContext) -> Result<()> {
    let catalog = AdapterCatalog::new(config.adapters.clone());
    if catalog.is_empty() {
        ctx.warn("No J2534 adapters configured");
    }

    let rows: Vec<AdapterRow> = catalog
        .iter()
        .enumerate()
        .map(|(i, adapter)| AdapterRow {
            index: i + 1,
            name: adapter.name.clone(),
            family: adapter.family().to_string(),
            library: adapter.library.display().to_string(),
            installed: if adapter.is_installed() { "yes" } else { "no" }.to_string(),
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}
