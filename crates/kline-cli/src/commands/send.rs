//! Send and listen commands

use std::time::Duration;

use anyhow::{Context, Result};
use kline_passthru::format_hex;

use crate::commands::{ctrl_c_token, establish_session, resolve_payload, Preset};
use crate::config::MergedConfig;
use crate::output::{FrameRow, OutputContext};

/// Transmit one message
pub fn send(
    config: &MergedConfig,
    mock: bool,
    payload: Option<&str>,
    preset: Option<Preset>,
    ctx: &OutputContext,
) -> Result<()> {
    let data = resolve_payload(payload, preset)?;
    let mut session = establish_session(config, mock, ctx)?;

    let sent = session.send(&data).context("Send failed")?;
    ctx.success(&format!("Sent [{}] ({} bytes)", format_hex(&data[..sent]), sent));

    session.close();
    Ok(())
}

/// Transmit one message and print everything received for `duration_ms`
pub fn listen(
    config: &MergedConfig,
    mock: bool,
    payload: Option<&str>,
    preset: Option<Preset>,
    duration_ms: u64,
    ctx: &OutputContext,
) -> Result<()> {
    let data = resolve_payload(payload, preset)?;
    let mut session = establish_session(config, mock, ctx)?;
    let cancel = ctrl_c_token()?;

    ctx.info(&format!(
        "Sending [{}], listening for {} ms",
        format_hex(&data),
        duration_ms
    ));
    let responses =
        session.send_and_listen(&data, Duration::from_millis(duration_ms), &cancel)?;

    if cancel.is_cancelled() {
        ctx.warn("Stopped by user");
    }
    let rows: Vec<FrameRow> = responses.iter().map(FrameRow::from).collect();
    ctx.print(&rows);
    ctx.info(&format!("{} response frame(s)", rows.len()));

    session.close();
    Ok(())
}
