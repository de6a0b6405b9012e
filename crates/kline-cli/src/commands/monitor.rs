//! Monitor command - passive K-Line traffic logging

use anyhow::Result;

use crate::commands::{ctrl_c_token, establish_session};
use crate::config::MergedConfig;
use crate::output::OutputContext;

/// Log all bus traffic until Ctrl+C
pub fn monitor(config: &MergedConfig, mock: bool, ctx: &OutputContext) -> Result<()> {
    let mut session = establish_session(config, mock, ctx)?;
    let cancel = ctrl_c_token()?;

    ctx.info("Monitoring K-Line traffic, press Ctrl+C to stop");
    ctx.frame_header();

    let mut monitor = session.monitor(&cancel)?;
    for frame in monitor.by_ref() {
        ctx.print_frame(&frame);
    }
    let stats = monitor.stats();
    drop(monitor);

    ctx.success(&format!(
        "Monitoring stopped: {} messages, {} bytes",
        stats.messages, stats.bytes
    ));
    session.close();
    Ok(())
}
