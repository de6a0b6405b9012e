//! Periodic command - keep-alive transmission

use anyhow::{Context, Result};
use kline_passthru::format_hex;

use crate::commands::{ctrl_c_token, establish_session, resolve_payload, Preset};
use crate::config::MergedConfig;
use crate::output::OutputContext;

/// Transmit a message every `interval_ms` until Ctrl+C, printing bus traffic
pub fn periodic(
    config: &MergedConfig,
    mock: bool,
    payload: Option<&str>,
    preset: Option<Preset>,
    interval_ms: u32,
    ctx: &OutputContext,
) -> Result<()> {
    let data = resolve_payload(payload, preset)?;
    let mut session = establish_session(config, mock, ctx)?;
    let cancel = ctrl_c_token()?;

    let handle = session
        .start_periodic(&data, interval_ms)
        .context("Failed to start periodic message")?;
    ctx.success(&format!(
        "Periodic message {} started: [{}] every {} ms, press Ctrl+C to stop",
        handle,
        format_hex(&data),
        interval_ms
    ));

    ctx.frame_header();
    for frame in session.monitor(&cancel)? {
        ctx.print_frame(&frame);
    }

    session.stop_periodic();
    ctx.success("Periodic message stopped");
    session.close();
    Ok(())
}
