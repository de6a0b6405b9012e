//! Session configuration
//!
//! Link parameters, I/O timeouts and logging settings for an
//! [`AdapterSession`](crate::session::AdapterSession). Every field has a
//! default so a partial TOML table is enough.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::j2534::{KLineProtocol, Parity};

/// Configuration for one adapter session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// K-Line bit rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub protocol: KLineProtocol,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub io: IoConfig,
    /// What a rejected pass-all filter does to the session
    #[serde(default)]
    pub filter_policy: FilterPolicy,
    /// Directory for transaction log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Mock adapter settings (used with `--mock`)
    #[serde(default)]
    pub mock: MockConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            protocol: KLineProtocol::default(),
            timing: TimingConfig::default(),
            io: IoConfig::default(),
            filter_policy: FilterPolicy::default(),
            log_dir: default_log_dir(),
            mock: MockConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

fn default_baud_rate() -> u32 {
    10400
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("Logs")
}

/// Inter-byte timing applied with SET_CONFIG after connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Base timeout; P1_MAX is set to twice this value
    #[serde(default = "default_timing_timeout")]
    pub timeout_ms: u32,
    #[serde(default)]
    pub parity: Parity,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timing_timeout(),
            parity: Parity::default(),
        }
    }
}

fn default_timing_timeout() -> u32 {
    20
}

/// Timeouts for blocking provider calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoConfig {
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u32,
    /// Bound on each read while monitoring
    #[serde(default = "default_monitor_read_timeout")]
    pub monitor_read_timeout_ms: u32,
    /// Upper bound on each read inside send-and-listen
    #[serde(default = "default_listen_read_timeout")]
    pub listen_read_timeout_ms: u32,
    /// Pause between send-and-listen polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: default_write_timeout(),
            monitor_read_timeout_ms: default_monitor_read_timeout(),
            listen_read_timeout_ms: default_listen_read_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_write_timeout() -> u32 {
    1000
}

fn default_monitor_read_timeout() -> u32 {
    1000
}

fn default_listen_read_timeout() -> u32 {
    100
}

fn default_poll_interval() -> u64 {
    10
}

/// Outcome of a rejected pass-all filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterPolicy {
    /// Log the failure and keep going without a filter
    #[default]
    Lenient,
    /// Fail the operation; the session does not become active
    Strict,
}

/// Mock adapter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated latency per write in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
    /// Echo transmitted frames back as TX loopback messages
    #[serde(default = "default_loopback")]
    pub loopback: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            loopback: default_loopback(),
        }
    }
}

fn default_loopback() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.baud_rate, 10400);
        assert_eq!(config.protocol, KLineProtocol::Iso9141);
        assert_eq!(config.timing.timeout_ms, 20);
        assert_eq!(config.io.write_timeout_ms, 1000);
        assert_eq!(config.io.listen_read_timeout_ms, 100);
        assert_eq!(config.filter_policy, FilterPolicy::Lenient);
        assert_eq!(config.log_dir, PathBuf::from("Logs"));
    }

    #[test]
    fn test_partial_toml() {
        let config = SessionConfig::from_toml_str(
            r#"
            baud_rate = 9600
            protocol = "iso14230"
            filter_policy = "strict"

            [timing]
            parity = "even"
            "#,
        )
        .unwrap();

        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.protocol, KLineProtocol::Iso14230);
        assert_eq!(config.filter_policy, FilterPolicy::Strict);
        assert_eq!(config.timing.parity, Parity::Even);
        assert_eq!(config.timing.timeout_ms, 20);
        assert_eq!(config.io, IoConfig::default());
    }
}
