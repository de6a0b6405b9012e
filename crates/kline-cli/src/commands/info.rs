//! Info command - adapter version and battery voltage

use anyhow::{Context, Result};

use crate::commands::open_session;
use crate::config::MergedConfig;
use crate::output::OutputContext;

/// Open the adapter and report its versions and the battery voltage
pub fn info(config: &MergedConfig, mock: bool, ctx: &OutputContext) -> Result<()> {
    let mut session = open_session(config, mock, ctx)?;

    let version = session
        .read_version()
        .context("Failed to read adapter version")?;
    let voltage = match session.read_battery_voltage() {
        Ok(mv) => format!("{:.2} V", f64::from(mv) / 1000.0),
        Err(e) => {
            ctx.warn(&format!("Battery voltage unavailable: {}", e));
            "-".to_string()
        }
    };

    let device = session
        .device()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());

    let pairs = vec![
        ("Device", device),
        ("Family", session.adapter_family().to_string()),
        ("API", version.api),
        ("DLL", version.driver),
        ("Firmware", version.firmware),
        ("Battery", voltage),
    ];
    ctx.print_kv(&pairs);

    session.close();
    Ok(())
}
