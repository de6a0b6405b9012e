//! Adapter session state machine

use std::path::Path;

use tracing::{debug, info, warn};

use super::handle::{ChannelHandle, DeviceHandle, FilterHandle, PeriodicHandle};
use super::profile::{AdapterFamily, ConnectProfile};
use super::SessionState;
use crate::config::{FilterPolicy, SessionConfig};
use crate::discovery::AdapterInfo;
use crate::error::{ConnectFailure, Degradation, SessionError};
use crate::frame::Frame;
use crate::j2534::{config_param, filter_type, ConnectFlags, Parity, StatusCode};
use crate::log::{LogCategory, TransactionLog};
use crate::provider::{IoctlRequest, NativeProvider, PassThruApi, SConfig, VersionInfo};

/// One session with one PassThru adapter
///
/// ```text
/// Unopened ─open─▶ Opened ─connect─▶ Connected ─configure_timing─▶ Configured
///                                                                      │
///                                          install_pass_all_filter ◀───┘
///                                                     │
///                                                     ▼
///                                                   Active        (any) ─close─▶ Closed
/// ```
///
/// Dropping the session runs [`close`](Self::close).
pub struct AdapterSession {
    pub(super) provider: Option<Box<dyn PassThruApi>>,
    pub(super) adapter_name: String,
    pub(super) config: SessionConfig,
    pub(super) log: TransactionLog,
    pub(super) state: SessionState,
    pub(super) device: Option<DeviceHandle>,
    pub(super) channel: Option<ChannelHandle>,
    pub(super) filter: Option<FilterHandle>,
    pub(super) periodic: Option<PeriodicHandle>,
    pub(super) connect_flags: Option<ConnectFlags>,
    pub(super) degradations: Vec<Degradation>,
}

impl AdapterSession {
    /// Create a session over an already loaded provider
    ///
    /// `adapter_name` picks the connect flags, see
    /// [`classify_adapter`](super::classify_adapter).
    pub fn new(
        provider: Box<dyn PassThruApi>,
        adapter_name: impl Into<String>,
        config: SessionConfig,
        log: TransactionLog,
    ) -> Self {
        Self {
            provider: Some(provider),
            adapter_name: adapter_name.into(),
            config,
            log,
            state: SessionState::Unopened,
            device: None,
            channel: None,
            filter: None,
            periodic: None,
            connect_flags: None,
            degradations: Vec::new(),
        }
    }

    /// Load the adapter's driver module and start a file log under `config.log_dir`
    pub fn load(adapter: &AdapterInfo, config: SessionConfig) -> Result<Self, SessionError> {
        let provider = NativeProvider::load(&adapter.library)?;
        let (log, path) = TransactionLog::create_in(&config.log_dir)?;
        info!(adapter = %adapter.name, log = %path.display(), "Adapter session created");
        let mut session = Self::new(
            Box::new(provider),
            adapter.classification_key(),
            config,
            log,
        );
        session.record_library(adapter);
        Ok(session)
    }

    /// Note which adapter and driver module this session runs on
    fn record_library(&mut self, adapter: &AdapterInfo) {
        self.log.record(
            LogCategory::DeviceLibrary,
            format!("{} ({})", adapter.library.display(), adapter.name),
        );
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Transaction log file, if the session logs to disk
    pub fn log_path(&self) -> Option<&Path> {
        self.log.path()
    }

    pub fn device(&self) -> Option<DeviceHandle> {
        self.device
    }

    pub fn channel(&self) -> Option<ChannelHandle> {
        self.channel
    }

    pub fn filter(&self) -> Option<FilterHandle> {
        self.filter
    }

    pub fn periodic(&self) -> Option<PeriodicHandle> {
        self.periodic
    }

    /// Flags the channel was finally connected with
    pub fn connect_flags(&self) -> Option<ConnectFlags> {
        self.connect_flags
    }

    pub fn adapter_family(&self) -> AdapterFamily {
        ConnectProfile::for_adapter(&self.adapter_name).family
    }

    /// Non-fatal failures absorbed so far
    pub fn degradations(&self) -> &[Degradation] {
        &self.degradations
    }

    /// Open the adapter
    pub fn open(&mut self) -> Result<DeviceHandle, SessionError> {
        self.require("open", &[SessionState::Unopened])?;
        let provider = self.provider.as_deref().ok_or(SessionError::InvalidState {
            operation: "open",
            state: self.state,
        })?;

        let status = match provider.open(None) {
            Ok(raw) => match DeviceHandle::new(raw) {
                Some(device) => {
                    self.device = Some(device);
                    self.state = SessionState::Opened;
                    self.log
                        .record(LogCategory::DeviceOpened, format!("Device ID: {}", device));
                    return Ok(device);
                }
                None => StatusCode::Failed,
            },
            Err(status) => status,
        };

        let detail = report_last_error(provider, &mut self.log, status);
        self.log.record(LogCategory::DeviceOpenFailed, status.to_string());
        Err(SessionError::Open { status, detail })
    }

    /// Query API, firmware and driver versions
    pub fn read_version(&mut self) -> Result<VersionInfo, SessionError> {
        let device = self.require_device("read_version")?;
        let provider = self.provider.as_deref().ok_or(SessionError::InvalidState {
            operation: "read_version",
            state: self.state,
        })?;

        match provider.read_version(device.raw()) {
            Ok(version) => {
                self.log.record(LogCategory::VersionInfo, version.to_string());
                Ok(version)
            }
            Err(status) => {
                report_last_error(provider, &mut self.log, status);
                self.log
                    .record(LogCategory::VersionInfoFailed, status.to_string());
                Err(SessionError::Version(status))
            }
        }
    }

    /// Connect a K-Line channel, falling back through alternative flags
    ///
    /// The fallback list is only walked when the first attempt is rejected
    /// with `ERR_INVALID_FLAGS`; any other rejection fails immediately.
    pub fn connect(&mut self, baud_rate: u32) -> Result<ChannelHandle, SessionError> {
        self.require("connect", &[SessionState::Opened])?;
        let device = self.require_device("connect")?;
        let provider = self.provider.as_deref().ok_or(SessionError::InvalidState {
            operation: "connect",
            state: self.state,
        })?;

        let profile = ConnectProfile::for_adapter(&self.adapter_name);
        let protocol = self.config.protocol;
        let attempt = |flags: ConnectFlags| -> Result<ChannelHandle, StatusCode> {
            let raw = provider.connect(device.raw(), protocol.id(), flags.bits(), baud_rate)?;
            ChannelHandle::new(raw).ok_or(StatusCode::Failed)
        };

        self.log.record(
            LogCategory::Connecting,
            format!(
                "Protocol: {}, Baud: {}, Flags: {} ({} adapter)",
                protocol, baud_rate, profile.primary, profile.family
            ),
        );

        let (channel, flags) = match attempt(profile.primary) {
            Ok(channel) => {
                self.log.record(
                    LogCategory::Connected,
                    format!("Channel ID: {}, Flags: {}", channel, profile.primary),
                );
                (channel, profile.primary)
            }
            Err(StatusCode::InvalidFlags) => {
                self.log.record(
                    LogCategory::ConnectFailed,
                    format!("{} with flags {}", StatusCode::InvalidFlags, profile.primary),
                );

                let mut connected = None;
                for &candidate in profile.fallbacks {
                    self.log.record(
                        LogCategory::ConnectAlternative,
                        format!("Trying flags: {}", candidate),
                    );
                    match attempt(candidate) {
                        Ok(channel) => {
                            self.log.record(
                                LogCategory::ConnectedAlternative,
                                format!("Channel ID: {}, Flags: {}", channel, candidate),
                            );
                            connected = Some((channel, candidate));
                            break;
                        }
                        Err(status) => {
                            if status != StatusCode::InvalidFlags {
                                report_last_error(provider, &mut self.log, status);
                            }
                            self.log.record(
                                LogCategory::ConnectAlternativeFailed,
                                format!("Flags {}: {}", candidate, status),
                            );
                        }
                    }
                }

                match connected {
                    Some(found) => found,
                    None => {
                        let attempts = profile.max_attempts();
                        self.log.record(
                            LogCategory::ConnectAllAttemptsFailed,
                            format!("{} attempts", attempts),
                        );
                        return Err(ConnectFailure::AllFallbacksExhausted { attempts }.into());
                    }
                }
            }
            Err(status) => {
                let detail = report_last_error(provider, &mut self.log, status);
                self.log.record(
                    LogCategory::ConnectFailed,
                    format!("{} with flags {}", status, profile.primary),
                );
                return Err(ConnectFailure::Rejected { status, detail }.into());
            }
        };

        info!(channel = channel.raw(), flags = %flags, "K-Line channel connected");
        self.channel = Some(channel);
        self.connect_flags = Some(flags);
        self.state = SessionState::Connected;
        Ok(channel)
    }

    /// Apply P1_MAX (twice `timeout_ms`) and parity
    ///
    /// A rejection is recorded as [`Degradation::Timing`]; the session still
    /// moves on with the adapter's default timing.
    pub fn configure_timing(&mut self, timeout_ms: u32, parity: Parity) -> Result<(), SessionError> {
        self.require("configure_timing", &[SessionState::Connected])?;
        let channel = self.require_channel("configure_timing")?;
        let provider = self.provider.as_deref().ok_or(SessionError::InvalidState {
            operation: "configure_timing",
            state: self.state,
        })?;

        let p1_max = timeout_ms.saturating_mul(2);
        let request = IoctlRequest::SetConfig(vec![
            SConfig {
                parameter: config_param::P1_MAX,
                value: p1_max,
            },
            SConfig {
                parameter: config_param::PARITY,
                value: parity.raw(),
            },
        ]);

        match provider.ioctl(channel.raw(), &request) {
            Ok(_) => self.log.record(
                LogCategory::TimingConfigured,
                format!("P1_MAX: {}ms, Parity: {}", p1_max, parity),
            ),
            Err(status) => {
                report_last_error(provider, &mut self.log, status);
                self.log
                    .record(LogCategory::TimingConfigFailed, status.to_string());
                self.degradations.push(Degradation::Timing(status));
            }
        }

        self.state = SessionState::Configured;
        Ok(())
    }

    /// Install a PASS filter that lets every message through
    ///
    /// Mask and pattern are a single zero byte. Under
    /// [`FilterPolicy::Lenient`] a rejection is recorded as a degradation and
    /// the session still becomes active; under [`FilterPolicy::Strict`] it is
    /// returned as an error and the state is left unchanged.
    pub fn install_pass_all_filter(&mut self) -> Result<Option<FilterHandle>, SessionError> {
        self.require(
            "install_pass_all_filter",
            &[SessionState::Connected, SessionState::Configured],
        )?;
        let channel = self.require_channel("install_pass_all_filter")?;
        let provider = self.provider.as_deref().ok_or(SessionError::InvalidState {
            operation: "install_pass_all_filter",
            state: self.state,
        })?;

        let protocol_id = self.config.protocol.id();
        let (mask, _) = Frame::new(protocol_id, vec![0x00]).to_msg();
        let (pattern, _) = Frame::new(protocol_id, vec![0x00]).to_msg();

        match provider.start_msg_filter(channel.raw(), filter_type::PASS_FILTER, &mask, &pattern, None)
        {
            Ok(raw) => {
                let filter = FilterHandle(raw);
                self.log.record(
                    LogCategory::FilterSetup,
                    format!("Pass-all filter installed, Filter ID: {}", filter),
                );
                self.filter = Some(filter);
                self.state = SessionState::Active;
                Ok(Some(filter))
            }
            Err(status) => {
                let detail = report_last_error(provider, &mut self.log, status);
                self.log
                    .record(LogCategory::FilterSetupFailed, status.to_string());
                match self.config.filter_policy {
                    FilterPolicy::Lenient => {
                        warn!(status = %status, "Continuing without a message filter");
                        self.degradations.push(Degradation::Filter(status));
                        self.state = SessionState::Active;
                        Ok(None)
                    }
                    FilterPolicy::Strict => Err(SessionError::FilterInstall { status, detail }),
                }
            }
        }
    }

    /// Connect, configure timing and install the pass-all filter
    pub fn establish(&mut self) -> Result<ChannelHandle, SessionError> {
        let channel = self.connect(self.config.baud_rate)?;
        let timing = self.config.timing.clone();
        self.configure_timing(timing.timeout_ms, timing.parity)?;
        self.install_pass_all_filter()?;
        Ok(channel)
    }

    /// Tear the session down
    ///
    /// Stops the periodic message, disconnects the channel, closes the device
    /// and releases the driver module, in that order. Each step is attempted
    /// even if an earlier one failed. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        self.stop_periodic();

        if let Some(provider) = self.provider.as_deref() {
            if let Some(channel) = self.channel.take() {
                match provider.disconnect(channel.raw()) {
                    Ok(()) => self.log.record(
                        LogCategory::ChannelDisconnected,
                        format!("Channel ID: {}", channel),
                    ),
                    Err(status) => {
                        report_last_error(provider, &mut self.log, status);
                        self.log.record(
                            LogCategory::J2534Error,
                            format!("PassThruDisconnect({}) failed: {}", channel, status),
                        );
                    }
                }
            }

            if let Some(device) = self.device.take() {
                match provider.close(device.raw()) {
                    Ok(()) => self
                        .log
                        .record(LogCategory::DeviceClosed, format!("Device ID: {}", device)),
                    Err(status) => {
                        report_last_error(provider, &mut self.log, status);
                        self.log.record(
                            LogCategory::J2534Error,
                            format!("PassThruClose({}) failed: {}", device, status),
                        );
                    }
                }
            }
        }

        if let Some(provider) = self.provider.take() {
            drop(provider);
            self.log
                .record(LogCategory::ModuleReleased, self.adapter_name.clone());
        }

        self.filter = None;
        self.channel = None;
        self.device = None;
        self.state = SessionState::Closed;
        debug!("Adapter session closed");
    }

    pub(super) fn require(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    pub(super) fn require_device(&self, operation: &'static str) -> Result<DeviceHandle, SessionError> {
        match (self.state, self.device) {
            (SessionState::Closed, _) | (_, None) => Err(SessionError::InvalidState {
                operation,
                state: self.state,
            }),
            (_, Some(device)) => Ok(device),
        }
    }

    pub(super) fn require_channel(
        &self,
        operation: &'static str,
    ) -> Result<ChannelHandle, SessionError> {
        match self.channel {
            Some(channel) if self.state.has_channel() => Ok(channel),
            _ => Err(SessionError::InvalidState {
                operation,
                state: self.state,
            }),
        }
    }
}

impl Drop for AdapterSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Log the provider's description of the last failure, if it has one
pub(super) fn report_last_error(
    provider: &dyn PassThruApi,
    log: &mut TransactionLog,
    status: StatusCode,
) -> Option<String> {
    let detail = provider.last_error();
    if let Some(text) = &detail {
        log.record(LogCategory::J2534Error, format!("{}: {}", status, text));
    }
    detail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;

    #[test]
    fn test_session_start_records_driver_library() {
        let (log, view) = TransactionLog::in_memory();
        let mut session = AdapterSession::new(
            Box::new(MockProvider::new()),
            "op20pt32",
            SessionConfig::default(),
            log,
        );
        let adapter = AdapterInfo::new("Tactrix OpenPort 2.0", "C:/J2534/op20pt32.dll");

        session.record_library(&adapter);

        assert_eq!(
            view.details(LogCategory::DeviceLibrary),
            vec!["C:/J2534/op20pt32.dll (Tactrix OpenPort 2.0)".to_string()]
        );
        assert_eq!(
            view.categories()[..2],
            ["SESSION_STARTED".to_string(), "DEVICE_LIBRARY".to_string()]
        );
    }
}
