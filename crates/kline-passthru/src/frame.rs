//! PassThru message codec
//!
//! Implements the fixed J2534 `PASSTHRU_MSG` layout:
//! ```text
//! ┌──────────┬──────────┬──────────┬───────────┬──────────┬────────────┬───────────────┐
//! │ Protocol │ RxStatus │ TxFlags  │ Timestamp │ DataSize │ ExtraData  │ Data          │
//! │ u32      │ u32      │ u32      │ u32       │ u32      │ u32        │ 4128 bytes    │
//! └──────────┴──────────┴──────────┴───────────┴──────────┴────────────┴───────────────┘
//! ```
//!
//! Integers are in host (little endian) order, no padding between fields.
//! The same layout is handed to the native driver as [`PassThruMsg`].

use std::fmt;

use crate::error::{FrameError, SessionError};
use crate::j2534::rx_status;

/// Header size in bytes (six u32 fields).
pub const HEADER_SIZE: usize = 24;

/// Payload buffer capacity in bytes.
pub const MAX_PAYLOAD: usize = 4128;

/// Full message size on the wire.
pub const WIRE_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD;

/// Native `PASSTHRU_MSG` structure
#[repr(C)]
#[derive(Clone)]
pub struct PassThruMsg {
    pub protocol_id: u32,
    pub rx_status: u32,
    pub tx_flags: u32,
    pub timestamp: u32,
    pub data_size: u32,
    pub extra_data_index: u32,
    pub data: [u8; MAX_PAYLOAD],
}

const _: () = assert!(std::mem::size_of::<PassThruMsg>() == WIRE_SIZE);

impl PassThruMsg {
    pub fn zeroed() -> Self {
        Self {
            protocol_id: 0,
            rx_status: 0,
            tx_flags: 0,
            timestamp: 0,
            data_size: 0,
            extra_data_index: 0,
            data: [0; MAX_PAYLOAD],
        }
    }

    /// Heap-allocated zeroed message, used as a per-call read/write buffer
    pub fn boxed() -> Box<Self> {
        Box::new(Self::zeroed())
    }
}

impl Default for PassThruMsg {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for PassThruMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = (self.data_size as usize).min(MAX_PAYLOAD);
        f.debug_struct("PassThruMsg")
            .field("protocol_id", &self.protocol_id)
            .field("rx_status", &format_args!("0x{:08X}", self.rx_status))
            .field("tx_flags", &format_args!("0x{:08X}", self.tx_flags))
            .field("timestamp", &self.timestamp)
            .field("data_size", &self.data_size)
            .field("extra_data_index", &self.extra_data_index)
            .field("data", &format_args!("[{}]", format_hex(&self.data[..shown])))
            .finish()
    }
}

/// Message direction derived from the TX_MSG_TYPE bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Received from the bus
    Rx,
    /// Loopback of our own transmission
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Rx => "RX",
            Direction::Tx => "TX",
        })
    }
}

/// One decoded PassThru message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub protocol_id: u32,
    pub rx_status: u32,
    pub tx_flags: u32,
    /// Adapter clock, microseconds
    pub timestamp: u32,
    pub extra_data_index: u32,
    pub data: Vec<u8>,
}

/// Result of encoding a frame into the fixed-size buffer
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    /// Payload bytes actually copied
    pub copied: usize,
    /// Payload bytes the caller supplied
    pub requested: usize,
}

impl EncodedFrame {
    pub fn truncated(&self) -> bool {
        self.copied < self.requested
    }
}

impl Frame {
    pub fn new(protocol_id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            protocol_id,
            data: data.into(),
            ..Default::default()
        }
    }

    /// Protocol marker announcing an incoming message; not user data
    pub fn is_start_of_message(&self) -> bool {
        self.rx_status & rx_status::START_OF_MESSAGE != 0
    }

    pub fn direction(&self) -> Direction {
        if self.rx_status & rx_status::TX_MSG_TYPE != 0 {
            Direction::Tx
        } else {
            Direction::Rx
        }
    }

    /// Payload as space separated hex, e.g. `C1 33 F1 81`
    pub fn hex(&self) -> String {
        format_hex(&self.data)
    }

    /// Copy into a native message, clamping the payload to [`MAX_PAYLOAD`].
    ///
    /// Returns the number of payload bytes copied.
    pub fn write_into(&self, msg: &mut PassThruMsg) -> usize {
        let copied = self.data.len().min(MAX_PAYLOAD);
        msg.protocol_id = self.protocol_id;
        msg.rx_status = self.rx_status;
        msg.tx_flags = self.tx_flags;
        msg.timestamp = self.timestamp;
        msg.data_size = copied as u32;
        msg.extra_data_index = self.extra_data_index;
        msg.data[..copied].copy_from_slice(&self.data[..copied]);
        msg.data[copied..].fill(0);
        copied
    }

    /// Build a native message; see [`Frame::write_into`]
    pub fn to_msg(&self) -> (Box<PassThruMsg>, usize) {
        let mut msg = PassThruMsg::boxed();
        let copied = self.write_into(&mut msg);
        (msg, copied)
    }

    /// Decode a native message filled by the driver
    pub fn from_msg(msg: &PassThruMsg) -> Result<Self, FrameError> {
        let size = msg.data_size as usize;
        if size > MAX_PAYLOAD {
            return Err(FrameError::LengthExceedsBuffer {
                claimed: size,
                available: MAX_PAYLOAD,
            });
        }
        Ok(Self {
            protocol_id: msg.protocol_id,
            rx_status: msg.rx_status,
            tx_flags: msg.tx_flags,
            timestamp: msg.timestamp,
            extra_data_index: msg.extra_data_index,
            data: msg.data[..size].to_vec(),
        })
    }

    /// Encode to the 4152-byte wire layout
    pub fn encode(&self) -> EncodedFrame {
        let copied = self.data.len().min(MAX_PAYLOAD);
        let mut bytes = Vec::with_capacity(WIRE_SIZE);
        for field in [
            self.protocol_id,
            self.rx_status,
            self.tx_flags,
            self.timestamp,
            copied as u32,
            self.extra_data_index,
        ] {
            bytes.extend_from_slice(&field.to_le_bytes());
        }
        bytes.extend_from_slice(&self.data[..copied]);
        bytes.resize(WIRE_SIZE, 0);

        EncodedFrame {
            bytes,
            copied,
            requested: self.data.len(),
        }
    }

    /// Decode from the wire layout.
    ///
    /// The buffer may be shorter than [`WIRE_SIZE`] as long as it holds the
    /// header and the number of payload bytes the header claims.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < HEADER_SIZE {
            return Err(FrameError::TooShort {
                len: buf.len(),
                header: HEADER_SIZE,
            });
        }

        let field = |index: usize| {
            let start = index * 4;
            u32::from_le_bytes([buf[start], buf[start + 1], buf[start + 2], buf[start + 3]])
        };

        let size = field(4) as usize;
        let available = (buf.len() - HEADER_SIZE).min(MAX_PAYLOAD);
        if size > available {
            return Err(FrameError::LengthExceedsBuffer {
                claimed: size,
                available,
            });
        }

        Ok(Self {
            protocol_id: field(0),
            rx_status: field(1),
            tx_flags: field(2),
            timestamp: field(3),
            extra_data_index: field(5),
            data: buf[HEADER_SIZE..HEADER_SIZE + size].to_vec(),
        })
    }
}

/// Format bytes as uppercase hex separated by spaces
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a user supplied payload such as `C1 33 F1 81`, `c1,33,f1,81` or `C133F181`
///
/// Tokens are separated by spaces, commas or semicolons. A single-digit token
/// is one byte (`1` → `0x01`); longer tokens are read as consecutive byte pairs.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, SessionError> {
    let mut bytes = Vec::new();
    for token in input
        .split(|c: char| c == ' ' || c == ',' || c == ';' || c == '\t')
        .filter(|t| !t.is_empty())
    {
        let token = token.trim_start_matches("0x").trim_start_matches("0X");
        let padded;
        let digits = if token.len() % 2 == 1 {
            padded = format!("0{}", token);
            padded.as_str()
        } else {
            token
        };
        let decoded = hex::decode(digits)
            .map_err(|e| SessionError::InvalidInput(format!("'{}': {}", token, e)))?;
        bytes.extend(decoded);
    }

    if bytes.is_empty() {
        return Err(SessionError::InvalidInput("empty payload".to_string()));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::j2534::protocol;

    fn sample_frame(data: Vec<u8>) -> Frame {
        Frame {
            protocol_id: protocol::ISO9141,
            rx_status: rx_status::TX_MSG_TYPE,
            tx_flags: 0x40,
            timestamp: 123_456,
            extra_data_index: 3,
            data,
        }
    }

    #[test]
    fn test_encode_decode_preserves_header() {
        let frame = sample_frame(vec![0xC1, 0x33, 0xF1, 0x81]);
        let encoded = frame.encode();
        assert_eq!(encoded.bytes.len(), WIRE_SIZE);
        assert_eq!(encoded.copied, 4);
        assert!(!encoded.truncated());

        let decoded = Frame::decode(&encoded.bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_encode_layout_is_packed_little_endian() {
        let frame = sample_frame(vec![0xAA]);
        let bytes = frame.encode().bytes;
        assert_eq!(&bytes[0..4], &[3, 0, 0, 0]);
        assert_eq!(&bytes[16..20], &[1, 0, 0, 0]);
        assert_eq!(bytes[HEADER_SIZE], 0xAA);
        assert!(bytes[HEADER_SIZE + 1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_full_capacity_payload_round_trips() {
        let data: Vec<u8> = (0..MAX_PAYLOAD).map(|i| (i % 251) as u8).collect();
        let frame = sample_frame(data);
        let decoded = Frame::decode(&frame.encode().bytes).unwrap();
        assert_eq!(decoded.data.len(), MAX_PAYLOAD);
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_oversized_payload_is_truncated() {
        let frame = sample_frame(vec![0x55; MAX_PAYLOAD + 100]);
        let encoded = frame.encode();
        assert!(encoded.truncated());
        assert_eq!(encoded.copied, MAX_PAYLOAD);
        assert_eq!(encoded.requested, MAX_PAYLOAD + 100);

        let decoded = Frame::decode(&encoded.bytes).unwrap();
        assert_eq!(decoded.data.len(), MAX_PAYLOAD);

        let (msg, copied) = frame.to_msg();
        assert_eq!(copied, MAX_PAYLOAD);
        assert_eq!(msg.data_size as usize, MAX_PAYLOAD);
    }

    #[test]
    fn test_decode_rejects_short_header() {
        let err = Frame::decode(&[0u8; 10]).unwrap_err();
        assert_eq!(err, FrameError::TooShort { len: 10, header: 24 });
    }

    #[test]
    fn test_decode_rejects_claimed_length_beyond_buffer() {
        let mut bytes = sample_frame(vec![1, 2, 3]).encode().bytes;
        bytes.truncate(HEADER_SIZE + 2);
        let err = Frame::decode(&bytes).unwrap_err();
        assert_eq!(
            err,
            FrameError::LengthExceedsBuffer {
                claimed: 3,
                available: 2
            }
        );
    }

    #[test]
    fn test_from_msg_rejects_oversized_data_size() {
        let mut msg = PassThruMsg::zeroed();
        msg.data_size = (MAX_PAYLOAD + 1) as u32;
        assert!(Frame::from_msg(&msg).is_err());
    }

    #[test]
    fn test_msg_round_trip() {
        let frame = sample_frame(vec![0x81, 0x11, 0xF1]);
        let (msg, _) = frame.to_msg();
        assert_eq!(Frame::from_msg(&msg).unwrap(), frame);
    }

    #[test]
    fn test_direction_and_marker() {
        let mut frame = Frame::new(protocol::ISO9141, vec![0x01]);
        assert_eq!(frame.direction(), Direction::Rx);
        assert!(!frame.is_start_of_message());

        frame.rx_status = rx_status::START_OF_MESSAGE | rx_status::TX_MSG_TYPE;
        assert_eq!(frame.direction(), Direction::Tx);
        assert!(frame.is_start_of_message());
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0xC1, 0x33, 0xF1, 0x81]), "C1 33 F1 81");
        assert_eq!(format_hex(&[]), "");
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("C1 33 F1 81").unwrap(), vec![0xC1, 0x33, 0xF1, 0x81]);
        assert_eq!(parse_hex("c1,33;f1  81").unwrap(), vec![0xC1, 0x33, 0xF1, 0x81]);
        assert_eq!(parse_hex("C133F181").unwrap(), vec![0xC1, 0x33, 0xF1, 0x81]);
        assert_eq!(parse_hex("0x27 1").unwrap(), vec![0x27, 0x01]);
        assert!(parse_hex("ZZ").is_err());
        assert!(parse_hex("   ").is_err());
    }
}
