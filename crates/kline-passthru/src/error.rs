//! Session errors
//!
//! Operations that stop the session from reaching its next state return one
//! of these. Degraded outcomes (timing, filter, periodic stop, buffer clear)
//! are not errors: they are logged and kept as [`Degradation`] records.

use std::fmt;

use thiserror::Error;

use crate::j2534::StatusCode;
use crate::session::SessionState;

/// Frame decode errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than the fixed 24-byte header
    #[error("MALFORMED_FRAME: {len} bytes is shorter than the {header} byte header")]
    TooShort { len: usize, header: usize },

    /// Payload length larger than the bytes actually present
    #[error("MALFORMED_FRAME: payload size {claimed} exceeds {available} available bytes")]
    LengthExceedsBuffer { claimed: usize, available: usize },
}

/// Why `connect` failed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectFailure {
    /// Primary attempt failed with something other than ERR_INVALID_FLAGS
    #[error("PassThruConnect failed: {status}{}", detail_suffix(.detail))]
    Rejected {
        status: StatusCode,
        detail: Option<String>,
    },

    /// Every fallback flag combination was rejected
    #[error("all {attempts} connect attempts failed")]
    AllFallbacksExhausted { attempts: usize },
}

/// Session and message exchange errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to load PassThru module: {0}")]
    ModuleLoad(String),

    #[error("Failed to open transaction log: {0}")]
    Log(#[from] std::io::Error),

    #[error("PassThruOpen failed: {status}{}", detail_suffix(.detail))]
    Open {
        status: StatusCode,
        detail: Option<String>,
    },

    #[error("Connect failed: {0}")]
    Connect(#[from] ConnectFailure),

    #[error("{operation} not allowed in state {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Send failed: {status}{}", detail_suffix(.detail))]
    Send {
        status: StatusCode,
        detail: Option<String>,
    },

    #[error("Read failed: {status}{}", detail_suffix(.detail))]
    Read {
        status: StatusCode,
        detail: Option<String>,
    },

    #[error("Periodic message start failed: {status}{}", detail_suffix(.detail))]
    PeriodicStart {
        status: StatusCode,
        detail: Option<String>,
    },

    #[error("Pass-all filter install failed: {status}{}", detail_suffix(.detail))]
    FilterInstall {
        status: StatusCode,
        detail: Option<String>,
    },

    #[error("PassThruReadVersion failed: {0}")]
    Version(StatusCode),

    #[error("IOCTL failed: {0}")]
    Ioctl(StatusCode),

    #[error(transparent)]
    MalformedFrame(#[from] FrameError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SessionError {
    /// Provider status code carried by the error, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            SessionError::Open { status, .. }
            | SessionError::Send { status, .. }
            | SessionError::Read { status, .. }
            | SessionError::PeriodicStart { status, .. }
            | SessionError::FilterInstall { status, .. } => Some(*status),
            SessionError::Connect(ConnectFailure::Rejected { status, .. }) => Some(*status),
            SessionError::Version(status) | SessionError::Ioctl(status) => Some(*status),
            _ => None,
        }
    }
}

/// A non-fatal failure absorbed by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    /// SET_CONFIG rejected; adapter keeps its default timing
    Timing(StatusCode),
    /// Pass-all filter rejected; the session continues unfiltered
    Filter(StatusCode),
    /// Periodic stop rejected; the local handle was dropped anyway
    PeriodicStop(StatusCode),
    /// CLEAR_RX_BUFFER rejected before a send-and-listen
    BufferClear(StatusCode),
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::Timing(s) => write!(f, "timing configuration degraded: {}", s),
            Degradation::Filter(s) => write!(f, "filter installation degraded: {}", s),
            Degradation::PeriodicStop(s) => write!(f, "periodic stop degraded: {}", s),
            Degradation::BufferClear(s) => write!(f, "rx buffer clear degraded: {}", s),
        }
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(text) if !text.is_empty() => format!(" ({})", text),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_include_provider_detail() {
        let err = SessionError::Send {
            status: StatusCode::DeviceNotConnected,
            detail: Some("cable unplugged".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Send failed: ERR_DEVICE_NOT_CONNECTED (cable unplugged)"
        );
        assert_eq!(err.status(), Some(StatusCode::DeviceNotConnected));
    }

    #[test]
    fn test_connect_failure_conversion() {
        let err: SessionError = ConnectFailure::AllFallbacksExhausted { attempts: 9 }.into();
        assert_eq!(err.to_string(), "Connect failed: all 9 connect attempts failed");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_frame_error_is_malformed() {
        let err: SessionError = FrameError::TooShort {
            len: 4,
            header: 24,
        }
        .into();
        assert!(err.to_string().starts_with("MALFORMED_FRAME"));
    }
}
