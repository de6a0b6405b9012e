//! Adapter session management
//!
//! An [`AdapterSession`] owns one PassThru provider and walks it through
//! open → connect → timing → filter, then exposes the message exchange
//! operations. Teardown runs in reverse and is attempted step by step.

mod adapter;
mod exchange;
mod handle;
mod profile;

pub use adapter::AdapterSession;
pub use exchange::{Monitor, MonitorStats, ReceivedFrame};
pub use handle::{ChannelHandle, DeviceHandle, FilterHandle, PeriodicHandle};
pub use profile::{classify_adapter, AdapterFamily, ConnectProfile, FALLBACK_FLAGS};

use std::fmt;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing opened yet
    Unopened,
    /// Device open, no channel
    Opened,
    /// Channel connected
    Connected,
    /// Timing parameters applied (or their failure absorbed)
    Configured,
    /// Ready for traffic
    Active,
    /// Torn down; the provider has been released
    Closed,
}

impl SessionState {
    /// States with a connected channel
    pub fn has_channel(self) -> bool {
        matches!(
            self,
            SessionState::Connected | SessionState::Configured | SessionState::Active
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Unopened => "unopened",
            SessionState::Opened => "opened",
            SessionState::Connected => "connected",
            SessionState::Configured => "configured",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        })
    }
}
