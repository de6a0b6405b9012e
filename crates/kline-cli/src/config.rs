//! Configuration file handling for kline-cli
//!
//! ```toml
//! adapter = "Tactrix OpenPort 2.0"
//! output = "table"
//!
//! [session]
//! baud_rate = 10400
//! log_dir = "Logs"
//!
//! [[adapters]]
//! name = "Tactrix OpenPort 2.0"
//! library = "C:/Windows/SysWOW64/op20pt32.dll"
//! ```

use anyhow::{Context, Result};
use kline_passthru::{AdapterInfo, KLineProtocol, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default adapter (name or 1-based index)
    pub adapter: Option<String>,
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
    /// Session parameters
    #[serde(default)]
    pub session: SessionConfig,
    /// Registered PassThru adapters
    #[serde(default)]
    pub adapters: Vec<AdapterInfo>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("kline-cli");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(&self, args: &ArgOverrides) -> MergedConfig {
        let mut session = self.session.clone();
        if let Some(baud) = args.baud_rate {
            session.baud_rate = baud;
        }
        if let Some(protocol) = args.protocol {
            session.protocol = protocol;
        }
        if let Some(dir) = &args.log_dir {
            session.log_dir = dir.clone();
        }

        MergedConfig {
            adapter: args.adapter.clone().or_else(|| self.adapter.clone()),
            output: args
                .output
                .map(String::from)
                .or_else(|| self.output.clone())
                .unwrap_or_else(|| "table".to_string()),
            no_color: args.no_color || self.no_color.unwrap_or(false),
            session,
            adapters: self.adapters.clone(),
        }
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct ArgOverrides {
    pub adapter: Option<String>,
    pub baud_rate: Option<u32>,
    pub protocol: Option<KLineProtocol>,
    pub log_dir: Option<PathBuf>,
    pub output: Option<&'static str>,
    pub no_color: bool,
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct MergedConfig {
    pub adapter: Option<String>,
    pub output: String,
    pub no_color: bool,
    pub session: SessionConfig,
    pub adapters: Vec<AdapterInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_file_values() {
        let config: Config = toml::from_str(
            r#"
            adapter = "2"
            no_color = true

            [session]
            baud_rate = 9600

            [[adapters]]
            name = "Tactrix OpenPort 2.0"
            library = "op20pt32.dll"
            "#,
        )
        .unwrap();

        let merged = config.merge_with_args(&ArgOverrides {
            baud_rate: Some(10400),
            protocol: Some(KLineProtocol::Iso14230),
            ..Default::default()
        });

        assert_eq!(merged.adapter.as_deref(), Some("2"));
        assert_eq!(merged.session.baud_rate, 10400);
        assert_eq!(merged.session.protocol, KLineProtocol::Iso14230);
        assert_eq!(merged.output, "table");
        assert!(merged.no_color);
        assert_eq!(merged.adapters.len(), 1);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let merged = Config::default().merge_with_args(&ArgOverrides::default());
        assert_eq!(merged.adapter, None);
        assert_eq!(merged.session, SessionConfig::default());
        assert!(!merged.no_color);
    }
}
