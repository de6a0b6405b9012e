//! Transaction log
//!
//! Append-only record of every adapter operation, one line per event:
//!
//! ```text
//! 2024-05-14 10:32:07.418 SENT - [C1 33 F1 81] Size: 4
//! ```
//!
//! Each entry is flushed before the call returns and mirrored to `tracing`.
//! A failing sink never fails the session; the write error goes to `tracing`.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Category tag of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    SessionStarted,
    SessionEnded,
    DeviceLibrary,
    DeviceOpened,
    DeviceOpenFailed,
    VersionInfo,
    VersionInfoFailed,
    Connecting,
    Connected,
    ConnectFailed,
    ConnectAlternative,
    ConnectedAlternative,
    ConnectAlternativeFailed,
    ConnectAllAttemptsFailed,
    TimingConfigured,
    TimingConfigFailed,
    FilterSetup,
    FilterSetupFailed,
    MonitoringStarted,
    Msg,
    ReadError,
    MonitoringStopped,
    Sent,
    SendFailed,
    FrameTruncated,
    PeriodicStarted,
    PeriodicStartFailed,
    PeriodicStopped,
    PeriodicStopFailed,
    SendAndListenStart,
    SendAndListenResponse,
    SendAndListenStoppedByUser,
    SendAndListenCompleted,
    BufferCleared,
    BufferClearFailed,
    BatteryVoltage,
    BatteryVoltageFailed,
    J2534Error,
    ChannelDisconnected,
    DeviceClosed,
    ModuleReleased,
}

impl LogCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            LogCategory::SessionStarted => "SESSION_STARTED",
            LogCategory::SessionEnded => "SESSION_ENDED",
            LogCategory::DeviceLibrary => "DEVICE_LIBRARY",
            LogCategory::DeviceOpened => "DEVICE_OPENED",
            LogCategory::DeviceOpenFailed => "DEVICE_OPEN_FAILED",
            LogCategory::VersionInfo => "VERSION_INFO",
            LogCategory::VersionInfoFailed => "VERSION_INFO_FAILED",
            LogCategory::Connecting => "CONNECTING",
            LogCategory::Connected => "CONNECTED",
            LogCategory::ConnectFailed => "CONNECT_FAILED",
            LogCategory::ConnectAlternative => "CONNECT_ALTERNATIVE",
            LogCategory::ConnectedAlternative => "CONNECTED_ALTERNATIVE",
            LogCategory::ConnectAlternativeFailed => "CONNECT_ALTERNATIVE_FAILED",
            LogCategory::ConnectAllAttemptsFailed => "CONNECT_ALL_ATTEMPTS_FAILED",
            LogCategory::TimingConfigured => "TIMING_CONFIGURED",
            LogCategory::TimingConfigFailed => "TIMING_CONFIG_FAILED",
            LogCategory::FilterSetup => "FILTER_SETUP",
            LogCategory::FilterSetupFailed => "FILTER_SETUP_FAILED",
            LogCategory::MonitoringStarted => "MONITORING_STARTED",
            LogCategory::Msg => "MSG",
            LogCategory::ReadError => "READ_ERROR",
            LogCategory::MonitoringStopped => "MONITORING_STOPPED",
            LogCategory::Sent => "SENT",
            LogCategory::SendFailed => "SEND_FAILED",
            LogCategory::FrameTruncated => "FRAME_TRUNCATED",
            LogCategory::PeriodicStarted => "PERIODIC_STARTED",
            LogCategory::PeriodicStartFailed => "PERIODIC_START_FAILED",
            LogCategory::PeriodicStopped => "PERIODIC_STOPPED",
            LogCategory::PeriodicStopFailed => "PERIODIC_STOP_FAILED",
            LogCategory::SendAndListenStart => "SEND_AND_LISTEN_START",
            LogCategory::SendAndListenResponse => "SEND_AND_LISTEN_RESPONSE",
            LogCategory::SendAndListenStoppedByUser => "SEND_AND_LISTEN_STOPPED_BY_USER",
            LogCategory::SendAndListenCompleted => "SEND_AND_LISTEN_COMPLETED",
            LogCategory::BufferCleared => "BUFFER_CLEARED",
            LogCategory::BufferClearFailed => "BUFFER_CLEAR_FAILED",
            LogCategory::BatteryVoltage => "BATTERY_VOLTAGE",
            LogCategory::BatteryVoltageFailed => "BATTERY_VOLTAGE_FAILED",
            LogCategory::J2534Error => "J2534_ERROR",
            LogCategory::ChannelDisconnected => "CHANNEL_DISCONNECTED",
            LogCategory::DeviceClosed => "DEVICE_CLOSED",
            LogCategory::ModuleReleased => "MODULE_RELEASED",
        }
    }

    /// Categories recording a failed or degraded step
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            LogCategory::DeviceOpenFailed
                | LogCategory::VersionInfoFailed
                | LogCategory::ConnectFailed
                | LogCategory::ConnectAlternativeFailed
                | LogCategory::ConnectAllAttemptsFailed
                | LogCategory::TimingConfigFailed
                | LogCategory::FilterSetupFailed
                | LogCategory::ReadError
                | LogCategory::SendFailed
                | LogCategory::FrameTruncated
                | LogCategory::PeriodicStartFailed
                | LogCategory::PeriodicStopFailed
                | LogCategory::BufferClearFailed
                | LogCategory::BatteryVoltageFailed
                | LogCategory::J2534Error
        )
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable log record
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub category: LogCategory,
    pub detail: String,
}

impl LogEntry {
    pub fn new(category: LogCategory, detail: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            category,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} - {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.category,
            self.detail
        )
    }
}

/// Destination for formatted log lines
pub trait LogSink: Send {
    /// Append one line; it must be durable when this returns
    fn write_line(&mut self, line: &str) -> io::Result<()>;
}

/// Log file under a directory, named after the session start time
pub struct FileSink {
    file: File,
    path: PathBuf,
}

impl FileSink {
    /// Create `<dir>/kline_log_<YYYYMMDD_HHMMSS>.log`, creating `dir` if needed
    pub fn create_in(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let name = format!("kline_log_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
        let path = dir.join(name);
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.file, "{}", line)?;
        self.file.flush()
    }
}

/// In-memory sink; read it back through a [`MemoryLog`]
#[derive(Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn with_view() -> (Self, MemoryLog) {
        let sink = Self::default();
        let view = MemoryLog {
            lines: Arc::clone(&sink.lines),
        };
        (sink, view)
    }
}

impl LogSink for MemorySink {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}

/// Read access to the lines captured by a [`MemorySink`]
#[derive(Clone)]
pub struct MemoryLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryLog {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Details of every entry with this category, in order
    pub fn details(&self, category: LogCategory) -> Vec<String> {
        let marker = format!(" {} - ", category.as_str());
        self.lines
            .lock()
            .iter()
            .filter_map(|line| {
                line.find(&marker)
                    .map(|pos| line[pos + marker.len()..].to_string())
            })
            .collect()
    }

    pub fn count(&self, category: LogCategory) -> usize {
        self.details(category).len()
    }

    pub fn contains(&self, category: LogCategory) -> bool {
        self.count(category) > 0
    }

    /// Category tags of every entry, in order
    pub fn categories(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter_map(|line| {
                // "<date> <time> <CATEGORY> - <detail>"
                let mut parts = line.splitn(4, ' ');
                let _date = parts.next()?;
                let _time = parts.next()?;
                let category = parts.next()?;
                (parts.next()?.starts_with("- ")).then(|| category.to_string())
            })
            .collect()
    }
}

/// The session's transaction log
pub struct TransactionLog {
    sink: Box<dyn LogSink>,
    path: Option<PathBuf>,
    entries: usize,
}

impl TransactionLog {
    /// Start a log on `sink`, writing the session start banner
    pub fn new(sink: impl LogSink + 'static) -> Self {
        let mut log = Self {
            sink: Box::new(sink),
            path: None,
            entries: 0,
        };
        let banner = format!(
            "=== K-Line session started {} ===",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        log.write_raw(&banner);
        log.record(LogCategory::SessionStarted, "Transaction log opened");
        log
    }

    /// Log to a new timestamped file under `dir`
    pub fn create_in(dir: impl AsRef<Path>) -> io::Result<(Self, PathBuf)> {
        let sink = FileSink::create_in(dir)?;
        let path = sink.path().to_path_buf();
        info!(path = %path.display(), "Transaction log created");
        let mut log = Self::new(sink);
        log.path = Some(path.clone());
        Ok((log, path))
    }

    /// File the log is written to; `None` for in-memory logs
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Log into memory, for tests and dry runs
    pub fn in_memory() -> (Self, MemoryLog) {
        let (sink, view) = MemorySink::with_view();
        (Self::new(sink), view)
    }

    /// Append an entry and mirror it to `tracing`
    pub fn record(&mut self, category: LogCategory, detail: impl Into<String>) {
        let entry = LogEntry::new(category, detail);

        match category {
            LogCategory::Msg | LogCategory::SendAndListenResponse => {
                debug!(category = %category, detail = %entry.detail, "transaction")
            }
            c if c.is_failure() => warn!(category = %c, detail = %entry.detail, "transaction"),
            c => info!(category = %c, detail = %entry.detail, "transaction"),
        }

        self.write_raw(&entry.to_string());
        self.entries += 1;
    }

    /// Number of entries recorded so far
    pub fn entries(&self) -> usize {
        self.entries
    }

    fn write_raw(&mut self, line: &str) {
        if let Err(e) = self.sink.write_line(line) {
            warn!(error = %e, "Failed to write transaction log line");
        }
    }
}

impl Drop for TransactionLog {
    fn drop(&mut self) {
        self.record(LogCategory::SessionEnded, format!("{} entries", self.entries));
        let banner = format!(
            "=== K-Line session ended {} ===",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        self.write_raw(&banner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_format_has_millisecond_timestamp() {
        let entry = LogEntry::new(LogCategory::Sent, "[C1 33 F1 81] Size: 4");
        let line = entry.to_string();

        // "YYYY-MM-DD HH:MM:SS.fff SENT - ..."
        let (stamp, rest) = line.split_at(23);
        assert_eq!(stamp.as_bytes()[10], b' ');
        assert_eq!(stamp.as_bytes()[19], b'.');
        assert!(stamp[20..].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(rest, " SENT - [C1 33 F1 81] Size: 4");
    }

    #[test]
    fn test_memory_log_queries() {
        let (mut log, view) = TransactionLog::in_memory();
        log.record(LogCategory::Connecting, "ISO9141 @ 10400 baud");
        log.record(LogCategory::ConnectAlternativeFailed, "K_LINE_ONLY: ERR_INVALID_FLAGS");
        log.record(LogCategory::ConnectAlternativeFailed, "NONE: ERR_INVALID_FLAGS");

        assert_eq!(view.count(LogCategory::ConnectAlternativeFailed), 2);
        assert_eq!(
            view.details(LogCategory::Connecting),
            vec!["ISO9141 @ 10400 baud".to_string()]
        );
        assert_eq!(
            view.categories(),
            vec![
                "SESSION_STARTED",
                "CONNECTING",
                "CONNECT_ALTERNATIVE_FAILED",
                "CONNECT_ALTERNATIVE_FAILED"
            ]
        );
        assert_eq!(log.entries(), 4);
    }

    #[test]
    fn test_banners_frame_the_session() {
        let (log, view) = TransactionLog::in_memory();
        drop(log);
        let lines = view.lines();
        assert!(lines[0].starts_with("=== K-Line session started"));
        assert!(lines.last().unwrap().starts_with("=== K-Line session ended"));
        assert!(view.contains(LogCategory::SessionEnded));
    }

    #[test]
    fn test_file_sink_writes_and_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let (mut log, path) = TransactionLog::create_in(dir.path().join("Logs")).unwrap();
        log.record(LogCategory::DeviceOpened, "Device ID: 1");

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("kline_log_") && name.ends_with(".log"));

        // Readable before the log is dropped
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains(" DEVICE_OPENED - Device ID: 1"));
        assert_eq!(log.path(), Some(path.as_path()));
    }

    #[test]
    fn test_memory_log_has_no_path() {
        let (log, _view) = TransactionLog::in_memory();
        assert_eq!(log.path(), None);
    }
}
