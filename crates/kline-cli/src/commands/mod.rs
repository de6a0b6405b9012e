//! Command implementations for kline-cli

pub mod adapters;
pub mod info;
pub mod monitor;
pub mod periodic;
pub mod send;

pub use adapters::adapters;
pub use info::info;
pub use monitor::monitor;
pub use periodic::periodic;
pub use send::{listen, send};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use kline_passthru::{
    parse_hex, AdapterCatalog, AdapterSession, CancelToken, MockProvider, TransactionLog,
};
use tracing::info;

use crate::config::MergedConfig;
use crate::output::OutputContext;

/// Named request payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// ISO9141 init probe (C1 33 F1 81)
    Init,
    /// KWP2000 StartCommunication (81 11 F1)
    StartComm,
    /// KWP2000 read VIN (22 F1 90)
    ReadVin,
    /// KWP2000 SecurityAccess request seed (27 01)
    SecuritySeed,
}

impl Preset {
    pub fn bytes(self) -> &'static [u8] {
        match self {
            Preset::Init => &[0xC1, 0x33, 0xF1, 0x81],
            Preset::StartComm => &[0x81, 0x11, 0xF1],
            Preset::ReadVin => &[0x22, 0xF1, 0x90],
            Preset::SecuritySeed => &[0x27, 0x01],
        }
    }
}

/// Resolve the payload from a hex argument or a preset
pub fn resolve_payload(hex: Option<&str>, preset: Option<Preset>) -> Result<Vec<u8>> {
    match (hex, preset) {
        (Some(text), _) => parse_hex(text).context("Invalid payload"),
        (None, Some(preset)) => Ok(preset.bytes().to_vec()),
        (None, None) => Ok(Preset::Init.bytes().to_vec()),
    }
}

/// Build and open a session for the selected adapter
pub fn open_session(config: &MergedConfig, mock: bool, ctx: &OutputContext) -> Result<AdapterSession> {
    let mut session = if mock {
        let provider = MockProvider::interactive(&config.session.mock);
        let (log, _) = TransactionLog::create_in(&config.session.log_dir)
            .context("Failed to create transaction log")?;
        AdapterSession::new(Box::new(provider), "mock", config.session.clone(), log)
    } else {
        let catalog = AdapterCatalog::new(config.adapters.clone());
        let adapter = match &config.adapter {
            Some(selector) => catalog
                .select(selector)
                .with_context(|| format!("Adapter not found: {}", selector))?,
            None => match catalog.iter().find(|a| a.is_installed()) {
                Some(adapter) => adapter,
                None => bail!("No J2534 adapters configured; add [[adapters]] to the config file"),
            },
        };
        info!(adapter = %adapter.name, family = %adapter.family(), "Selected adapter");
        ctx.info(&format!("Adapter: {} ({})", adapter.name, adapter.family()));
        AdapterSession::load(adapter, config.session.clone())
            .with_context(|| format!("Failed to load adapter {}", adapter.name))?
    };

    if let Some(path) = session.log_path() {
        ctx.info(&format!("Log file: {}", path.display()));
    }
    session.open().context("Failed to open adapter")?;
    Ok(session)
}

/// Open, connect, configure timing and install the pass-all filter
pub fn establish_session(
    config: &MergedConfig,
    mock: bool,
    ctx: &OutputContext,
) -> Result<AdapterSession> {
    let mut session = open_session(config, mock, ctx)?;
    let channel = session.establish().context("Failed to set up K-Line channel")?;

    let flags = session
        .connect_flags()
        .map(|f| f.to_string())
        .unwrap_or_default();
    ctx.success(&format!(
        "Connected: {} @ {} baud, channel {}, flags {}",
        config.session.protocol, config.session.baud_rate, channel, flags
    ));
    for degradation in session.degradations() {
        ctx.warn(&format!("Warning: {}", degradation));
    }
    Ok(session)
}

/// Cancellation token set by Ctrl+C
pub fn ctrl_c_token() -> Result<CancelToken> {
    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("Failed to install Ctrl+C handler")?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_session_reports_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut file_config = crate::config::Config::default();
        file_config.session.log_dir = dir.path().join("Logs");
        let config = file_config.merge_with_args(&crate::config::ArgOverrides::default());
        let ctx = OutputContext::new(crate::output::OutputFormat::Table, true, true);

        let session = open_session(&config, true, &ctx).unwrap();

        let path = session.log_path().unwrap();
        assert!(path.starts_with(dir.path().join("Logs")));
        assert!(path.exists());
    }

    #[test]
    fn test_resolve_payload() {
        assert_eq!(
            resolve_payload(None, None).unwrap(),
            vec![0xC1, 0x33, 0xF1, 0x81]
        );
        assert_eq!(
            resolve_payload(None, Some(Preset::ReadVin)).unwrap(),
            vec![0x22, 0xF1, 0x90]
        );
        assert_eq!(
            resolve_payload(Some("27 01"), Some(Preset::Init)).unwrap(),
            vec![0x27, 0x01]
        );
        assert!(resolve_payload(Some("XYZ"), None).is_err());
    }
}
