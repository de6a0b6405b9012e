//! Mock PassThru provider for testing and hardware-less runs
//!
//! Every call is recorded as a [`ProviderCall`] so tests can assert on the
//! exact sequence the session issued, including the final module release.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{IoctlRequest, PassThruApi, VersionInfo};
use crate::cancel::CancelToken;
use crate::config::MockConfig;
use crate::frame::{Frame, PassThruMsg, MAX_PAYLOAD};
use crate::j2534::{rx_status, StatusCode};

/// One recorded provider invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Open {
        name: Option<String>,
    },
    Close {
        device_id: u32,
    },
    Connect {
        device_id: u32,
        protocol_id: u32,
        flags: u32,
        baud_rate: u32,
    },
    Disconnect {
        channel_id: u32,
    },
    ReadMsgs {
        channel_id: u32,
        max: usize,
        timeout_ms: u32,
    },
    WriteMsgs {
        channel_id: u32,
        payloads: Vec<Vec<u8>>,
        timeout_ms: u32,
    },
    StartPeriodicMsg {
        channel_id: u32,
        payload: Vec<u8>,
        interval_ms: u32,
    },
    StopPeriodicMsg {
        channel_id: u32,
        msg_id: u32,
    },
    StartMsgFilter {
        channel_id: u32,
        filter_type: u32,
        mask: Vec<u8>,
        pattern: Vec<u8>,
    },
    Ioctl {
        handle: u32,
        request: IoctlRequest,
    },
    ReadVersion {
        device_id: u32,
    },
    GetLastError,
    /// The provider was dropped (module released)
    Release,
}

impl ProviderCall {
    /// Short name used when asserting on call order
    pub fn name(&self) -> &'static str {
        match self {
            ProviderCall::Open { .. } => "open",
            ProviderCall::Close { .. } => "close",
            ProviderCall::Connect { .. } => "connect",
            ProviderCall::Disconnect { .. } => "disconnect",
            ProviderCall::ReadMsgs { .. } => "read_msgs",
            ProviderCall::WriteMsgs { .. } => "write_msgs",
            ProviderCall::StartPeriodicMsg { .. } => "start_periodic_msg",
            ProviderCall::StopPeriodicMsg { .. } => "stop_periodic_msg",
            ProviderCall::StartMsgFilter { .. } => "start_msg_filter",
            ProviderCall::Ioctl { .. } => "ioctl",
            ProviderCall::ReadVersion { .. } => "read_version",
            ProviderCall::GetLastError => "get_last_error",
            ProviderCall::Release => "release",
        }
    }
}

/// Scripted behavior and recorded calls, shared with a [`MockHandle`]
struct MockState {
    calls: Vec<ProviderCall>,
    record_reads: bool,

    open_result: Result<u32, StatusCode>,
    /// Consumed one per connect call; `connect_default` applies once empty
    connect_results: VecDeque<Result<u32, StatusCode>>,
    connect_default: Result<u32, StatusCode>,
    close_error: Option<StatusCode>,
    disconnect_error: Option<StatusCode>,
    version: Result<VersionInfo, StatusCode>,
    last_error: Option<String>,

    set_config_error: Option<StatusCode>,
    clear_rx_error: Option<StatusCode>,
    vbatt: Result<u32, StatusCode>,
    filter_error: Option<StatusCode>,

    write_error: Option<StatusCode>,
    /// Report fewer accepted messages than were written
    write_accepts: Option<usize>,
    /// Consumed one per read call
    read_errors: VecDeque<StatusCode>,
    periodic_start_error: Option<StatusCode>,
    periodic_stop_error: Option<StatusCode>,

    rx_queue: VecDeque<Box<PassThruMsg>>,
    /// Cancelled the first time a read finds the queue empty
    cancel_when_drained: Option<CancelToken>,
    /// Request prefix → response payload, answered on write
    responses: Vec<(Vec<u8>, Vec<u8>)>,
    loopback: bool,
    /// Sleep for the read timeout when nothing is queued
    wait_on_empty: bool,
    latency: Duration,

    next_filter_id: u32,
    next_periodic_id: u32,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            record_reads: true,
            open_result: Ok(1),
            connect_results: VecDeque::new(),
            connect_default: Ok(2),
            close_error: None,
            disconnect_error: None,
            version: Ok(VersionInfo {
                api: "04.04".to_string(),
                firmware: "1.0.0".to_string(),
                driver: "mock 1.0".to_string(),
            }),
            last_error: None,
            set_config_error: None,
            clear_rx_error: None,
            vbatt: Ok(12_600),
            filter_error: None,
            write_error: None,
            write_accepts: None,
            read_errors: VecDeque::new(),
            periodic_start_error: None,
            periodic_stop_error: None,
            rx_queue: VecDeque::new(),
            cancel_when_drained: None,
            responses: Vec::new(),
            loopback: false,
            wait_on_empty: false,
            latency: Duration::ZERO,
            next_filter_id: 10,
            next_periodic_id: 100,
        }
    }
}

impl MockState {
    fn record(&mut self, call: ProviderCall) {
        self.calls.push(call);
    }

    fn find_response(&self, request: &[u8]) -> Option<Vec<u8>> {
        if let Some((_, resp)) = self.responses.iter().find(|(req, _)| req == request) {
            return Some(resp.clone());
        }
        self.responses
            .iter()
            .find(|(req, _)| request.starts_with(req))
            .map(|(_, resp)| resp.clone())
    }

    fn enqueue(&mut self, frame: &Frame) {
        let (msg, _) = frame.to_msg();
        self.rx_queue.push_back(msg);
    }
}

/// Controls a [`MockProvider`] after it has been moved into a session
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// All calls recorded so far
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().calls.clone()
    }

    /// Recorded call names, in order
    pub fn call_names(&self) -> Vec<&'static str> {
        self.state.lock().calls.iter().map(ProviderCall::name).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Connect attempts as `(protocol_id, flags, baud_rate)`
    pub fn connect_attempts(&self) -> Vec<(u32, u32, u32)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ProviderCall::Connect {
                    protocol_id,
                    flags,
                    baud_rate,
                    ..
                } => Some((*protocol_id, *flags, *baud_rate)),
                _ => None,
            })
            .collect()
    }

    pub fn set_open_result(&self, result: Result<u32, StatusCode>) {
        self.state.lock().open_result = result;
    }

    /// Queue the outcome of the next connect call
    pub fn push_connect_result(&self, result: Result<u32, StatusCode>) {
        self.state.lock().connect_results.push_back(result);
    }

    /// Outcome of every connect call once the queue is empty
    pub fn set_connect_default(&self, result: Result<u32, StatusCode>) {
        self.state.lock().connect_default = result;
    }

    pub fn fail_close(&self, status: StatusCode) {
        self.state.lock().close_error = Some(status);
    }

    pub fn fail_disconnect(&self, status: StatusCode) {
        self.state.lock().disconnect_error = Some(status);
    }

    pub fn set_version(&self, result: Result<VersionInfo, StatusCode>) {
        self.state.lock().version = result;
    }

    pub fn set_last_error(&self, text: impl Into<String>) {
        self.state.lock().last_error = Some(text.into());
    }

    pub fn fail_set_config(&self, status: StatusCode) {
        self.state.lock().set_config_error = Some(status);
    }

    pub fn fail_clear_rx(&self, status: StatusCode) {
        self.state.lock().clear_rx_error = Some(status);
    }

    pub fn set_vbatt(&self, result: Result<u32, StatusCode>) {
        self.state.lock().vbatt = result;
    }

    pub fn fail_filter(&self, status: StatusCode) {
        self.state.lock().filter_error = Some(status);
    }

    pub fn fail_write(&self, status: StatusCode) {
        self.state.lock().write_error = Some(status);
    }

    pub fn set_write_accepts(&self, accepted: usize) {
        self.state.lock().write_accepts = Some(accepted);
    }

    /// Fail the next read with `status`
    pub fn fail_read(&self, status: StatusCode) {
        self.state.lock().read_errors.push_back(status);
    }

    pub fn fail_periodic_start(&self, status: StatusCode) {
        self.state.lock().periodic_start_error = Some(status);
    }

    pub fn fail_periodic_stop(&self, status: StatusCode) {
        self.state.lock().periodic_stop_error = Some(status);
    }

    /// Queue a message for a later read
    pub fn push_frame(&self, frame: Frame) {
        self.state.lock().enqueue(&frame);
    }

    /// Queue a received payload, preceded by a start-of-message marker
    pub fn push_rx(&self, protocol_id: u32, data: &[u8]) {
        let mut state = self.state.lock();
        let mut marker = Frame::new(protocol_id, Vec::new());
        marker.rx_status = rx_status::START_OF_MESSAGE;
        state.enqueue(&marker);
        state.enqueue(&Frame::new(protocol_id, data.to_vec()));
    }

    /// Queue a native message as-is, e.g. with an invalid data size
    pub fn push_raw(&self, msg: PassThruMsg) {
        self.state.lock().rx_queue.push_back(Box::new(msg));
    }

    pub fn pending_rx(&self) -> usize {
        self.state.lock().rx_queue.len()
    }

    /// Cancel `token` once a read finds nothing queued
    pub fn cancel_when_drained(&self, token: CancelToken) {
        self.state.lock().cancel_when_drained = Some(token);
    }

    /// Add a mock response for a given request
    pub fn add_response(&self, request: Vec<u8>, response: Vec<u8>) {
        self.state.lock().responses.push((request, response));
    }
}

/// In-memory [`PassThruApi`] implementation
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// A silent adapter: reads return immediately, nothing answers
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// A simulated K-Line ECU for hardware-less runs
    ///
    /// Answers common KWP2000 requests, echoes transmissions and blocks reads
    /// for their timeout like a real adapter.
    pub fn interactive(config: &MockConfig) -> Self {
        let provider = Self::new();
        {
            let mut state = provider.state.lock();
            state.record_reads = false;
            state.responses = Self::default_responses();
            state.loopback = config.loopback;
            state.wait_on_empty = true;
            state.latency = Duration::from_millis(config.latency_ms);
        }
        provider
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn default_responses() -> Vec<(Vec<u8>, Vec<u8>)> {
        vec![
            // ISO9141 init probe (C1 33 F1 81 -> key bytes)
            (vec![0xC1, 0x33, 0xF1, 0x81], vec![0x83, 0xF1, 0x11, 0xC1, 0x8F, 0xEF, 0xC4]),
            // StartCommunication (81 -> C1 + key bytes)
            (vec![0x81], vec![0xC1, 0xEF, 0x8F]),
            // ReadDataByLocalIdentifier - VIN
            (vec![0x22, 0xF1, 0x90], {
                let mut resp = vec![0x62, 0xF1, 0x90];
                resp.extend_from_slice(b"SAJAA06E8YFA12345");
                resp
            }),
            // SecurityAccess - request seed
            (vec![0x27, 0x01], vec![0x67, 0x01, 0x12, 0x34]),
            // TesterPresent
            (vec![0x3E], vec![0x7E]),
            // StartDiagnosticSession
            (vec![0x10], vec![0x50, 0x81]),
        ]
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        self.state.lock().record(ProviderCall::Release);
    }
}

fn outcome(error: Option<StatusCode>) -> Result<(), StatusCode> {
    match error {
        Some(status) => Err(status),
        None => Ok(()),
    }
}

fn payload(msg: &PassThruMsg) -> Vec<u8> {
    let size = (msg.data_size as usize).min(MAX_PAYLOAD);
    msg.data[..size].to_vec()
}

impl PassThruApi for MockProvider {
    fn open(&self, name: Option<&str>) -> Result<u32, StatusCode> {
        let mut state = self.state.lock();
        state.record(ProviderCall::Open {
            name: name.map(str::to_string),
        });
        state.open_result
    }

    fn close(&self, device_id: u32) -> Result<(), StatusCode> {
        let mut state = self.state.lock();
        state.record(ProviderCall::Close { device_id });
        outcome(state.close_error)
    }

    fn connect(
        &self,
        device_id: u32,
        protocol_id: u32,
        flags: u32,
        baud_rate: u32,
    ) -> Result<u32, StatusCode> {
        let mut state = self.state.lock();
        state.record(ProviderCall::Connect {
            device_id,
            protocol_id,
            flags,
            baud_rate,
        });
        let default = state.connect_default;
        state.connect_results.pop_front().unwrap_or(default)
    }

    fn disconnect(&self, channel_id: u32) -> Result<(), StatusCode> {
        let mut state = self.state.lock();
        state.record(ProviderCall::Disconnect { channel_id });
        outcome(state.disconnect_error)
    }

    fn read_msgs(
        &self,
        channel_id: u32,
        msgs: &mut [PassThruMsg],
        timeout_ms: u32,
    ) -> Result<usize, StatusCode> {
        let wait = {
            let mut state = self.state.lock();
            if state.record_reads {
                state.record(ProviderCall::ReadMsgs {
                    channel_id,
                    max: msgs.len(),
                    timeout_ms,
                });
            }
            if let Some(status) = state.read_errors.pop_front() {
                return Err(status);
            }

            let mut filled = 0;
            while filled < msgs.len() {
                match state.rx_queue.pop_front() {
                    Some(msg) => {
                        msgs[filled] = *msg;
                        filled += 1;
                    }
                    None => break,
                }
            }
            if filled > 0 {
                return Ok(filled);
            }

            if let Some(token) = state.cancel_when_drained.take() {
                token.cancel();
            }
            state.wait_on_empty
        };

        // Block outside the lock so a concurrent handle can still queue data
        if wait && timeout_ms > 0 {
            std::thread::sleep(Duration::from_millis(u64::from(timeout_ms)));
        }
        if timeout_ms == 0 {
            Err(StatusCode::BufferEmpty)
        } else {
            Err(StatusCode::Timeout)
        }
    }

    fn write_msgs(
        &self,
        channel_id: u32,
        msgs: &[PassThruMsg],
        timeout_ms: u32,
    ) -> Result<usize, StatusCode> {
        let latency = {
            let mut state = self.state.lock();
            let payloads: Vec<Vec<u8>> = msgs.iter().map(payload).collect();
            state.record(ProviderCall::WriteMsgs {
                channel_id,
                payloads: payloads.clone(),
                timeout_ms,
            });
            if let Some(status) = state.write_error {
                return Err(status);
            }

            for (msg, data) in msgs.iter().zip(&payloads) {
                if state.loopback {
                    let mut echo = Frame::new(msg.protocol_id, data.clone());
                    echo.rx_status = rx_status::TX_MSG_TYPE;
                    state.enqueue(&echo);
                }
                if let Some(response) = state.find_response(data) {
                    let mut marker = Frame::new(msg.protocol_id, Vec::new());
                    marker.rx_status = rx_status::START_OF_MESSAGE;
                    state.enqueue(&marker);
                    state.enqueue(&Frame::new(msg.protocol_id, response));
                }
            }
            state.latency
        };

        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        let state = self.state.lock();
        Ok(state.write_accepts.unwrap_or(msgs.len()).min(msgs.len()))
    }

    fn start_periodic_msg(
        &self,
        channel_id: u32,
        msg: &PassThruMsg,
        interval_ms: u32,
    ) -> Result<u32, StatusCode> {
        let mut state = self.state.lock();
        state.record(ProviderCall::StartPeriodicMsg {
            channel_id,
            payload: payload(msg),
            interval_ms,
        });
        if let Some(status) = state.periodic_start_error {
            return Err(status);
        }
        let id = state.next_periodic_id;
        state.next_periodic_id += 1;
        Ok(id)
    }

    fn stop_periodic_msg(&self, channel_id: u32, msg_id: u32) -> Result<(), StatusCode> {
        let mut state = self.state.lock();
        state.record(ProviderCall::StopPeriodicMsg { channel_id, msg_id });
        outcome(state.periodic_stop_error)
    }

    fn start_msg_filter(
        &self,
        channel_id: u32,
        filter_type: u32,
        mask: &PassThruMsg,
        pattern: &PassThruMsg,
        _flow_control: Option<&PassThruMsg>,
    ) -> Result<u32, StatusCode> {
        let mut state = self.state.lock();
        state.record(ProviderCall::StartMsgFilter {
            channel_id,
            filter_type,
            mask: payload(mask),
            pattern: payload(pattern),
        });
        if let Some(status) = state.filter_error {
            return Err(status);
        }
        let id = state.next_filter_id;
        state.next_filter_id += 1;
        Ok(id)
    }

    fn ioctl(&self, handle: u32, request: &IoctlRequest) -> Result<Option<u32>, StatusCode> {
        let mut state = self.state.lock();
        state.record(ProviderCall::Ioctl {
            handle,
            request: request.clone(),
        });
        match request {
            IoctlRequest::SetConfig(_) => outcome(state.set_config_error).map(|_| None),
            IoctlRequest::ReadVbatt => state.vbatt.map(Some),
            IoctlRequest::ClearRxBuffer => {
                outcome(state.clear_rx_error)?;
                state.rx_queue.clear();
                Ok(None)
            }
            IoctlRequest::ClearTxBuffer
            | IoctlRequest::ClearPeriodicMsgs
            | IoctlRequest::ClearMsgFilters => Ok(None),
        }
    }

    fn read_version(&self, device_id: u32) -> Result<VersionInfo, StatusCode> {
        let mut state = self.state.lock();
        state.record(ProviderCall::ReadVersion { device_id });
        state.version.clone()
    }

    fn last_error(&self) -> Option<String> {
        let mut state = self.state.lock();
        state.record(ProviderCall::GetLastError);
        state.last_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::j2534::protocol;

    #[test]
    fn test_drop_records_release() {
        let provider = MockProvider::new();
        let handle = provider.handle();
        provider.open(None).unwrap();
        drop(provider);
        assert_eq!(handle.call_names(), vec!["open", "release"]);
    }

    #[test]
    fn test_connect_results_are_consumed_in_order() {
        let provider = MockProvider::new();
        let handle = provider.handle();
        handle.push_connect_result(Err(StatusCode::InvalidFlags));
        handle.push_connect_result(Ok(7));

        assert_eq!(provider.connect(1, 3, 4, 10400), Err(StatusCode::InvalidFlags));
        assert_eq!(provider.connect(1, 3, 1, 10400), Ok(7));
        assert_eq!(provider.connect(1, 3, 0, 10400), Ok(2));
        assert_eq!(
            handle.connect_attempts(),
            vec![(3, 4, 10400), (3, 1, 10400), (3, 0, 10400)]
        );
    }

    #[test]
    fn test_empty_read_reports_timeout_and_cancels() {
        let provider = MockProvider::new();
        let handle = provider.handle();
        let token = CancelToken::new();
        handle.cancel_when_drained(token.clone());

        let mut buf = [PassThruMsg::zeroed()];
        assert_eq!(provider.read_msgs(2, &mut buf, 50), Err(StatusCode::Timeout));
        assert_eq!(provider.read_msgs(2, &mut buf, 0), Err(StatusCode::BufferEmpty));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_response_table_answers_writes() {
        let provider = MockProvider::new();
        let handle = provider.handle();
        handle.add_response(vec![0x81], vec![0xC1, 0xEF, 0x8F]);

        let (msg, _) = Frame::new(protocol::ISO14230, vec![0x81]).to_msg();
        assert_eq!(provider.write_msgs(2, std::slice::from_ref(msg.as_ref()), 1000), Ok(1));
        assert_eq!(handle.pending_rx(), 2);

        let mut buf = [PassThruMsg::zeroed()];
        provider.read_msgs(2, &mut buf, 100).unwrap();
        assert!(Frame::from_msg(&buf[0]).unwrap().is_start_of_message());
        provider.read_msgs(2, &mut buf, 100).unwrap();
        assert_eq!(Frame::from_msg(&buf[0]).unwrap().data, vec![0xC1, 0xEF, 0x8F]);
    }

    #[test]
    fn test_clear_rx_drops_queued_frames() {
        let provider = MockProvider::new();
        let handle = provider.handle();
        handle.push_rx(protocol::ISO9141, &[0x01, 0x02]);
        provider.ioctl(2, &IoctlRequest::ClearRxBuffer).unwrap();
        assert_eq!(handle.pending_rx(), 0);
    }
}
