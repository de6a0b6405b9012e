//! Message exchange over a connected channel
//!
//! Send, timed receive, passive monitoring, send-and-listen and the periodic
//! keep-alive message. Read timeouts and empty buffers are normal outcomes,
//! not errors.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use super::adapter::{report_last_error, AdapterSession};
use super::handle::PeriodicHandle;
use crate::cancel::CancelToken;
use crate::error::{Degradation, SessionError};
use crate::frame::{format_hex, Direction, Frame, PassThruMsg};
use crate::j2534::StatusCode;
use crate::log::LogCategory;
use crate::provider::{IoctlRequest, PassThruApi};

/// A frame stamped with the local time it was read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub received_at: DateTime<Local>,
    pub frame: Frame,
}

impl ReceivedFrame {
    fn now(frame: Frame) -> Self {
        Self {
            received_at: Local::now(),
            frame,
        }
    }

    pub fn direction(&self) -> Direction {
        self.frame.direction()
    }

    pub fn data(&self) -> &[u8] {
        &self.frame.data
    }
}

impl fmt::Display for ReceivedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}]",
            self.received_at.format("%H:%M:%S%.3f"),
            self.direction(),
            self.frame.hex()
        )
    }
}

/// Outcome of one bounded read
enum ReadOutcome {
    Frame(Frame),
    Empty,
}

/// Read at most one message into `buf`
fn read_one(
    provider: &dyn PassThruApi,
    channel: u32,
    buf: &mut PassThruMsg,
    timeout_ms: u32,
) -> Result<ReadOutcome, SessionError> {
    match provider.read_msgs(channel, std::slice::from_mut(buf), timeout_ms) {
        Ok(0) => Ok(ReadOutcome::Empty),
        Ok(_) => Ok(ReadOutcome::Frame(Frame::from_msg(buf)?)),
        Err(status) if status.is_no_data() => Ok(ReadOutcome::Empty),
        Err(status) => Err(SessionError::Read {
            status,
            detail: None,
        }),
    }
}

impl AdapterSession {
    /// Transmit one payload on the channel
    ///
    /// Payloads longer than the message buffer are truncated and a
    /// `FRAME_TRUNCATED` entry is logged. Returns the bytes actually sent.
    pub fn send(&mut self, payload: &[u8]) -> Result<usize, SessionError> {
        let channel = self.require_channel("send")?;
        let (msg, copied) = self.build_msg(payload);
        let provider = self.provider.as_deref().ok_or(SessionError::InvalidState {
            operation: "send",
            state: self.state,
        })?;

        let status = match provider.write_msgs(
            channel.raw(),
            std::slice::from_ref(msg.as_ref()),
            self.config.io.write_timeout_ms,
        ) {
            Ok(n) if n > 0 => {
                self.log.record(
                    LogCategory::Sent,
                    format!("[{}] Size: {}", format_hex(&payload[..copied]), copied),
                );
                return Ok(copied);
            }
            // Nothing queued within the write timeout
            Ok(_) => StatusCode::Timeout,
            Err(status) => status,
        };

        let detail = report_last_error(provider, &mut self.log, status);
        self.log.record(
            LogCategory::SendFailed,
            format!("[{}] {}", format_hex(&payload[..copied]), status),
        );
        Err(SessionError::Send { status, detail })
    }

    /// Wait up to `timeout_ms` for one message
    ///
    /// Returns `Ok(None)` when nothing arrived. Start-of-message markers are
    /// returned like any other frame.
    pub fn receive(&mut self, timeout_ms: u32) -> Result<Option<Frame>, SessionError> {
        let channel = self.require_channel("receive")?;
        let provider = self.provider.as_deref().ok_or(SessionError::InvalidState {
            operation: "receive",
            state: self.state,
        })?;

        let mut buf = PassThruMsg::boxed();
        match read_one(provider, channel.raw(), &mut buf, timeout_ms) {
            Ok(ReadOutcome::Frame(frame)) => Ok(Some(frame)),
            Ok(ReadOutcome::Empty) => Ok(None),
            Err(SessionError::Read { status, .. }) => {
                let detail = report_last_error(provider, &mut self.log, status);
                self.log.record(LogCategory::ReadError, status.to_string());
                Err(SessionError::Read { status, detail })
            }
            Err(e) => {
                self.log.record(LogCategory::ReadError, e.to_string());
                Err(e)
            }
        }
    }

    /// Passively log all traffic until `cancel` is set
    ///
    /// The returned iterator yields each data frame as it arrives.
    /// Dropping it logs the totals.
    pub fn monitor(&mut self, cancel: &CancelToken) -> Result<Monitor<'_>, SessionError> {
        self.require_channel("monitor")?;
        self.log.record(
            LogCategory::MonitoringStarted,
            format!("Read timeout: {}ms", self.config.io.monitor_read_timeout_ms),
        );
        Ok(Monitor {
            session: self,
            cancel: cancel.clone(),
            buf: PassThruMsg::boxed(),
            stats: MonitorStats::default(),
        })
    }

    /// Send `payload`, then collect everything received for `duration`
    ///
    /// The receive buffer is cleared first so stale traffic is not reported
    /// as a response. Returns an empty list when the send fails.
    pub fn send_and_listen(
        &mut self,
        payload: &[u8],
        duration: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<ReceivedFrame>, SessionError> {
        let channel = self.require_channel("send_and_listen")?;

        self.clear_rx_buffer()?;
        self.log.record(
            LogCategory::SendAndListenStart,
            format!(
                "[{}] listening for {}ms",
                format_hex(payload),
                duration.as_millis()
            ),
        );

        if let Err(e) = self.send(payload) {
            debug!(error = %e, "Send failed, not listening");
            return Ok(Vec::new());
        }

        let provider = self.provider.as_deref().ok_or(SessionError::InvalidState {
            operation: "send_and_listen",
            state: self.state,
        })?;
        let read_cap = self.config.io.listen_read_timeout_ms;
        let poll = Duration::from_millis(self.config.io.poll_interval_ms);

        let mut buf = PassThruMsg::boxed();
        let mut responses = Vec::new();
        // None when `duration` is too long to represent: listen until cancelled
        let deadline = Instant::now().checked_add(duration);

        loop {
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    deadline - now
                }
                None => Duration::MAX,
            };
            if cancel.is_cancelled() {
                self.log.record(
                    LogCategory::SendAndListenStoppedByUser,
                    format!("{} responses before cancel", responses.len()),
                );
                break;
            }

            let timeout_ms = u32::try_from(remaining.as_millis())
                .unwrap_or(u32::MAX)
                .min(read_cap);
            match read_one(provider, channel.raw(), &mut buf, timeout_ms) {
                Ok(ReadOutcome::Frame(frame)) => {
                    if !frame.is_start_of_message() && !frame.data.is_empty() {
                        let received = ReceivedFrame::now(frame);
                        self.log.record(
                            LogCategory::SendAndListenResponse,
                            format!("{} [{}]", received.direction(), received.frame.hex()),
                        );
                        responses.push(received);
                    }
                }
                Ok(ReadOutcome::Empty) => {}
                Err(SessionError::Read { status, .. }) => {
                    report_last_error(provider, &mut self.log, status);
                    self.log.record(LogCategory::ReadError, status.to_string());
                }
                Err(e) => self.log.record(LogCategory::ReadError, e.to_string()),
            }

            let left = deadline.map_or(poll, |d| d.saturating_duration_since(Instant::now()));
            std::thread::sleep(poll.min(left));
        }

        self.log.record(
            LogCategory::SendAndListenCompleted,
            format!("{} responses", responses.len()),
        );
        Ok(responses)
    }

    /// Start transmitting `payload` every `interval_ms`
    ///
    /// Replaces any periodic message already running.
    pub fn start_periodic(
        &mut self,
        payload: &[u8],
        interval_ms: u32,
    ) -> Result<PeriodicHandle, SessionError> {
        let channel = self.require_channel("start_periodic")?;
        self.stop_periodic();

        let (msg, copied) = self.build_msg(payload);
        let provider = self.provider.as_deref().ok_or(SessionError::InvalidState {
            operation: "start_periodic",
            state: self.state,
        })?;

        match provider.start_periodic_msg(channel.raw(), &msg, interval_ms) {
            Ok(raw) => {
                let handle = PeriodicHandle(raw);
                self.periodic = Some(handle);
                self.log.record(
                    LogCategory::PeriodicStarted,
                    format!(
                        "ID: {}, Interval: {}ms, Data: [{}]",
                        handle,
                        interval_ms,
                        format_hex(&payload[..copied])
                    ),
                );
                Ok(handle)
            }
            Err(status) => {
                let detail = report_last_error(provider, &mut self.log, status);
                self.log
                    .record(LogCategory::PeriodicStartFailed, status.to_string());
                Err(SessionError::PeriodicStart { status, detail })
            }
        }
    }

    /// Stop the periodic message, if one is running
    ///
    /// The handle is dropped even when the adapter rejects the stop.
    pub fn stop_periodic(&mut self) {
        let Some(handle) = self.periodic.take() else {
            return;
        };
        let (Some(provider), Some(channel)) = (self.provider.as_deref(), self.channel) else {
            return;
        };

        match provider.stop_periodic_msg(channel.raw(), handle.raw()) {
            Ok(()) => self
                .log
                .record(LogCategory::PeriodicStopped, format!("ID: {}", handle)),
            Err(status) => {
                report_last_error(provider, &mut self.log, status);
                self.log.record(
                    LogCategory::PeriodicStopFailed,
                    format!("ID: {}: {}", handle, status),
                );
                self.degradations.push(Degradation::PeriodicStop(status));
            }
        }
    }

    /// Discard everything queued in the adapter's receive buffer
    ///
    /// A rejection is recorded as [`Degradation::BufferClear`].
    pub fn clear_rx_buffer(&mut self) -> Result<(), SessionError> {
        let channel = self.require_channel("clear_rx_buffer")?;
        let provider = self.provider.as_deref().ok_or(SessionError::InvalidState {
            operation: "clear_rx_buffer",
            state: self.state,
        })?;

        match provider.ioctl(channel.raw(), &IoctlRequest::ClearRxBuffer) {
            Ok(_) => self
                .log
                .record(LogCategory::BufferCleared, "RX buffer cleared"),
            Err(status) => {
                report_last_error(provider, &mut self.log, status);
                self.log
                    .record(LogCategory::BufferClearFailed, status.to_string());
                self.degradations.push(Degradation::BufferClear(status));
            }
        }
        Ok(())
    }

    /// Vehicle battery voltage in millivolts
    pub fn read_battery_voltage(&mut self) -> Result<u32, SessionError> {
        let device = self.require_device("read_battery_voltage")?;
        let provider = self.provider.as_deref().ok_or(SessionError::InvalidState {
            operation: "read_battery_voltage",
            state: self.state,
        })?;

        let status = match provider.ioctl(device.raw(), &IoctlRequest::ReadVbatt) {
            Ok(Some(millivolts)) => {
                self.log.record(
                    LogCategory::BatteryVoltage,
                    format!("{}.{:03} V", millivolts / 1000, millivolts % 1000),
                );
                return Ok(millivolts);
            }
            Ok(None) => StatusCode::Failed,
            Err(status) => status,
        };

        report_last_error(provider, &mut self.log, status);
        self.log
            .record(LogCategory::BatteryVoltageFailed, status.to_string());
        Err(SessionError::Ioctl(status))
    }

    /// Native message for `payload`, logging truncation
    fn build_msg(&mut self, payload: &[u8]) -> (Box<PassThruMsg>, usize) {
        let frame = Frame::new(self.config.protocol.id(), payload);
        let (msg, copied) = frame.to_msg();
        if copied < payload.len() {
            warn!(requested = payload.len(), copied, "Payload truncated");
            self.log.record(
                LogCategory::FrameTruncated,
                format!("{} bytes requested, {} bytes sent", payload.len(), copied),
            );
        }
        (msg, copied)
    }
}

/// Message and byte counters of a monitor run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub messages: u64,
    pub bytes: u64,
}

/// Blocking iterator over received traffic; see [`AdapterSession::monitor`]
pub struct Monitor<'a> {
    session: &'a mut AdapterSession,
    cancel: CancelToken,
    buf: Box<PassThruMsg>,
    stats: MonitorStats,
}

impl Monitor<'_> {
    pub fn stats(&self) -> MonitorStats {
        self.stats
    }
}

impl Iterator for Monitor<'_> {
    type Item = ReceivedFrame;

    fn next(&mut self) -> Option<Self::Item> {
        let timeout_ms = self.session.config.io.monitor_read_timeout_ms;
        let backoff = Duration::from_millis(self.session.config.io.poll_interval_ms);

        while !self.cancel.is_cancelled() {
            let channel = self.session.channel?;
            let provider = self.session.provider.as_deref()?;

            match read_one(provider, channel.raw(), &mut self.buf, timeout_ms) {
                Ok(ReadOutcome::Frame(frame)) => {
                    if frame.is_start_of_message() {
                        continue;
                    }
                    let received = ReceivedFrame::now(frame);
                    self.stats.messages += 1;
                    self.stats.bytes += received.frame.data.len() as u64;
                    self.session.log.record(
                        LogCategory::Msg,
                        format!(
                            "{} [{}] Size: {}",
                            received.direction(),
                            received.frame.hex(),
                            received.frame.data.len()
                        ),
                    );
                    return Some(received);
                }
                Ok(ReadOutcome::Empty) => {}
                Err(SessionError::Read { status, .. }) => {
                    report_last_error(provider, &mut self.session.log, status);
                    self.session
                        .log
                        .record(LogCategory::ReadError, status.to_string());
                    std::thread::sleep(backoff);
                }
                Err(e) => {
                    self.session.log.record(LogCategory::ReadError, e.to_string());
                }
            }
        }
        None
    }
}

impl Drop for Monitor<'_> {
    fn drop(&mut self) {
        self.session.log.record(
            LogCategory::MonitoringStopped,
            format!(
                "Total: {} messages, {} bytes",
                self.stats.messages, self.stats.bytes
            ),
        );
    }
}
