//! kline-passthru - J2534 PassThru session layer for K-Line diagnostics
//!
//! This crate drives a SAE J2534 adapter over an ISO9141 / ISO14230 (KWP2000)
//! bus: it opens the adapter, negotiates connect flags, configures timing and
//! filters, exchanges frames and records every step in a transaction log.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      AdapterSession                          │
//! │  open → connect (with fallback) → timing → filter → close    │
//! │                                                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐   │
//! │  │ConnectProfile│  │  exchange    │  │ TransactionLog   │   │
//! │  │ (flags)      │  │ send/monitor │  │ (file / memory)  │   │
//! │  └──────────────┘  └──────┬───────┘  └──────────────────┘   │
//! │                           │                                 │
//! │                     ┌─────┴─────┐                           │
//! │                     │Frame codec│                           │
//! │                     └─────┬─────┘                           │
//! │                           │                                 │
//! │                  ┌────────┴────────┐                        │
//! │                  │  PassThruApi    │                        │
//! │                  │ (native / mock) │                        │
//! │                  └─────────────────┘                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod cancel;
pub mod config;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod j2534;
pub mod log;
pub mod provider;
pub mod session;

pub use cancel::CancelToken;
pub use config::{FilterPolicy, MockConfig, SessionConfig};
pub use discovery::{AdapterCatalog, AdapterInfo};
pub use error::{ConnectFailure, Degradation, FrameError, SessionError};
pub use frame::{format_hex, parse_hex, Direction, Frame, PassThruMsg};
pub use j2534::{ConnectFlags, KLineProtocol, Parity, StatusCode};
pub use log::{LogCategory, MemoryLog, TransactionLog};
pub use provider::{MockHandle, MockProvider, NativeProvider, PassThruApi, VersionInfo};
pub use session::{
    classify_adapter, AdapterFamily, AdapterSession, ChannelHandle, DeviceHandle, Monitor,
    MonitorStats, ReceivedFrame, SessionState,
};
