//! Capability providers for the PassThru API
//!
//! This module abstracts the vendor driver behind [`PassThruApi`]:
//! - Native provider: loads a J2534 driver module and resolves its entry points
//! - Mock provider for testing and hardware-less runs
//!
//! # Example
//!
//! ```ignore
//! use kline_passthru::provider::{NativeProvider, PassThruApi};
//!
//! let provider = NativeProvider::load("C:/Program Files/Drew Tech/op20pt32.dll")?;
//! let device = provider.open(None)?;
//! let version = provider.read_version(device)?;
//! ```
//!
//! Releasing the driver module is dropping the provider.

pub mod mock;
mod native;

pub use mock::{MockHandle, MockProvider, ProviderCall};
pub use native::NativeProvider;

use std::fmt;

use crate::frame::PassThruMsg;
use crate::j2534::{ioctl_id, StatusCode};

/// One SET_CONFIG parameter
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SConfig {
    pub parameter: u32,
    pub value: u32,
}

/// IOCTL requests issued by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoctlRequest {
    SetConfig(Vec<SConfig>),
    /// Battery voltage in millivolts, returned as output
    ReadVbatt,
    ClearTxBuffer,
    ClearRxBuffer,
    ClearPeriodicMsgs,
    ClearMsgFilters,
}

impl IoctlRequest {
    pub fn id(&self) -> u32 {
        match self {
            IoctlRequest::SetConfig(_) => ioctl_id::SET_CONFIG,
            IoctlRequest::ReadVbatt => ioctl_id::READ_VBATT,
            IoctlRequest::ClearTxBuffer => ioctl_id::CLEAR_TX_BUFFER,
            IoctlRequest::ClearRxBuffer => ioctl_id::CLEAR_RX_BUFFER,
            IoctlRequest::ClearPeriodicMsgs => ioctl_id::CLEAR_PERIODIC_MSGS,
            IoctlRequest::ClearMsgFilters => ioctl_id::CLEAR_MSG_FILTERS,
        }
    }
}

/// Version strings reported by `PassThruReadVersion`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub api: String,
    pub firmware: String,
    pub driver: String,
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "API: {}, DLL: {}, Firmware: {}",
            self.api, self.driver, self.firmware
        )
    }
}

/// The PassThru entry points the session needs
///
/// Ids are the raw values exchanged with the driver; the session wraps them
/// in typed handles. Every call is blocking. Implementations are driven from
/// a single control thread and do not need to be `Sync`.
pub trait PassThruApi: Send {
    /// Open the adapter, optionally by name
    fn open(&self, name: Option<&str>) -> Result<u32, StatusCode>;

    fn close(&self, device_id: u32) -> Result<(), StatusCode>;

    fn connect(
        &self,
        device_id: u32,
        protocol_id: u32,
        flags: u32,
        baud_rate: u32,
    ) -> Result<u32, StatusCode>;

    fn disconnect(&self, channel_id: u32) -> Result<(), StatusCode>;

    /// Read up to `msgs.len()` messages, waiting at most `timeout_ms`
    ///
    /// Returns the number of messages filled in.
    fn read_msgs(
        &self,
        channel_id: u32,
        msgs: &mut [PassThruMsg],
        timeout_ms: u32,
    ) -> Result<usize, StatusCode>;

    /// Write messages, waiting at most `timeout_ms` for them to be queued
    ///
    /// Returns the number of messages accepted.
    fn write_msgs(
        &self,
        channel_id: u32,
        msgs: &[PassThruMsg],
        timeout_ms: u32,
    ) -> Result<usize, StatusCode>;

    fn start_periodic_msg(
        &self,
        channel_id: u32,
        msg: &PassThruMsg,
        interval_ms: u32,
    ) -> Result<u32, StatusCode>;

    fn stop_periodic_msg(&self, channel_id: u32, msg_id: u32) -> Result<(), StatusCode>;

    fn start_msg_filter(
        &self,
        channel_id: u32,
        filter_type: u32,
        mask: &PassThruMsg,
        pattern: &PassThruMsg,
        flow_control: Option<&PassThruMsg>,
    ) -> Result<u32, StatusCode>;

    /// Returns the output value for requests that have one
    fn ioctl(&self, handle: u32, request: &IoctlRequest) -> Result<Option<u32>, StatusCode>;

    fn read_version(&self, device_id: u32) -> Result<VersionInfo, StatusCode>;

    /// Description of the last failure, if the driver has one
    fn last_error(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ioctl_ids() {
        assert_eq!(IoctlRequest::SetConfig(vec![]).id(), 0x02);
        assert_eq!(IoctlRequest::ReadVbatt.id(), 0x03);
        assert_eq!(IoctlRequest::ClearRxBuffer.id(), 0x08);
    }

    #[test]
    fn test_sconfig_is_two_words() {
        assert_eq!(std::mem::size_of::<SConfig>(), 8);
    }
}
