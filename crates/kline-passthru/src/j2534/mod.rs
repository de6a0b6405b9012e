//! SAE J2534 PassThru constants
//!
//! Protocol ids, flag bits, IOCTL ids and configuration parameters used by the
//! K-Line session. Only the subset needed for ISO9141/ISO14230 is named here;
//! raw values outside it still travel through as plain `u32`.

mod status;

pub use status::StatusCode;

use std::fmt;

use serde::{Deserialize, Serialize};

/// J2534 protocol ids
pub mod protocol {
    pub const J1850VPW: u32 = 1;
    pub const J1850PWM: u32 = 2;
    pub const ISO9141: u32 = 3;
    /// KWP2000
    pub const ISO14230: u32 = 4;
    pub const CAN: u32 = 5;
    pub const ISO15765: u32 = 6;
}

/// RxStatus bits reported on received messages
pub mod rx_status {
    /// Loopback of a message transmitted by this adapter
    pub const TX_MSG_TYPE: u32 = 0x0000_0001;
    /// First byte of an incoming message; carries no user data
    pub const START_OF_MESSAGE: u32 = 0x0000_0002;
    pub const RX_BREAK: u32 = 0x0000_0004;
    pub const TX_INDICATION: u32 = 0x0000_0008;
    pub const ISO15765_PADDING_ERROR: u32 = 0x0000_0010;
    pub const ISO15765_EXT_ADDR: u32 = 0x0000_0080;
}

/// Filter types for `PassThruStartMsgFilter`
pub mod filter_type {
    pub const PASS_FILTER: u32 = 1;
    pub const BLOCK_FILTER: u32 = 2;
    pub const FLOW_CONTROL_FILTER: u32 = 3;
}

/// IOCTL ids for `PassThruIoctl`
pub mod ioctl_id {
    pub const GET_CONFIG: u32 = 0x01;
    pub const SET_CONFIG: u32 = 0x02;
    pub const READ_VBATT: u32 = 0x03;
    pub const FIVE_BAUD_INIT: u32 = 0x04;
    pub const FAST_INIT: u32 = 0x05;
    pub const CLEAR_TX_BUFFER: u32 = 0x07;
    pub const CLEAR_RX_BUFFER: u32 = 0x08;
    pub const CLEAR_PERIODIC_MSGS: u32 = 0x09;
    pub const CLEAR_MSG_FILTERS: u32 = 0x0A;
}

/// SET_CONFIG / GET_CONFIG parameter ids
pub mod config_param {
    pub const DATA_RATE: u32 = 0x01;
    pub const LOOPBACK: u32 = 0x03;
    pub const NODE_ADDRESS: u32 = 0x04;
    pub const NETWORK_LINE: u32 = 0x05;
    pub const P1_MIN: u32 = 0x06;
    pub const P1_MAX: u32 = 0x07;
    pub const P2_MIN: u32 = 0x08;
    pub const P2_MAX: u32 = 0x09;
    pub const P3_MIN: u32 = 0x0A;
    pub const P3_MAX: u32 = 0x0B;
    pub const P4_MIN: u32 = 0x0C;
    pub const P4_MAX: u32 = 0x0D;
    pub const W1: u32 = 0x0E;
    pub const W2: u32 = 0x0F;
    pub const W3: u32 = 0x10;
    pub const W4: u32 = 0x11;
    pub const W5: u32 = 0x12;
    pub const TIDLE: u32 = 0x13;
    pub const TINIL: u32 = 0x14;
    pub const TWUP: u32 = 0x15;
    pub const PARITY: u32 = 0x16;
}

/// Line parity for the PARITY config parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    pub fn raw(self) -> u32 {
        match self {
            Parity::None => 0,
            Parity::Odd => 1,
            Parity::Even => 2,
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Parity::None => "NO_PARITY",
            Parity::Odd => "ODD_PARITY",
            Parity::Even => "EVEN_PARITY",
        })
    }
}

/// Connect flags accepted by K-Line adapters on `PassThruConnect`
///
/// The low bits are vendor-overloaded: Mongoose-family drivers read them as
/// sniff/K-only/checksum switches, generic drivers as `ISO9141_NO_CHECKSUM`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ConnectFlags(pub u32);

impl ConnectFlags {
    pub const NONE: ConnectFlags = ConnectFlags(0);
    pub const DT_SNIFF_MODE: ConnectFlags = ConnectFlags(0x0000_0001);
    pub const K_LINE_ONLY: ConnectFlags = ConnectFlags(0x0000_0002);
    pub const CHECKSUM_DISABLED: ConnectFlags = ConnectFlags(0x0000_0004);
    pub const ISO9141_NO_CHECKSUM: ConnectFlags = ConnectFlags(0x0000_0004);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: ConnectFlags) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ConnectFlags {
    type Output = ConnectFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        ConnectFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for ConnectFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("NONE");
        }
        let mut names = Vec::new();
        if self.contains(Self::DT_SNIFF_MODE) {
            names.push("DT_SNIFF_MODE");
        }
        if self.contains(Self::K_LINE_ONLY) {
            names.push("K_LINE_ONLY");
        }
        if self.contains(Self::CHECKSUM_DISABLED) {
            names.push("CHECKSUM_DISABLED");
        }
        let known = Self::DT_SNIFF_MODE | Self::K_LINE_ONLY | Self::CHECKSUM_DISABLED;
        let rest = self.0 & !known.0;
        if rest != 0 {
            if names.is_empty() {
                return write!(f, "0x{:08X}", rest);
            }
            return write!(f, "{} | 0x{:08X}", names.join(" | "), rest);
        }
        f.write_str(&names.join(" | "))
    }
}

/// K-Line protocol selection for `PassThruConnect`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KLineProtocol {
    #[default]
    Iso9141,
    /// KWP2000
    Iso14230,
}

impl KLineProtocol {
    pub fn id(self) -> u32 {
        match self {
            KLineProtocol::Iso9141 => protocol::ISO9141,
            KLineProtocol::Iso14230 => protocol::ISO14230,
        }
    }
}

impl fmt::Display for KLineProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KLineProtocol::Iso9141 => "ISO9141",
            KLineProtocol::Iso14230 => "ISO14230",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_flags_display() {
        let flags =
            ConnectFlags::DT_SNIFF_MODE | ConnectFlags::K_LINE_ONLY | ConnectFlags::CHECKSUM_DISABLED;
        assert_eq!(flags.bits(), 0x07);
        assert_eq!(
            flags.to_string(),
            "DT_SNIFF_MODE | K_LINE_ONLY | CHECKSUM_DISABLED"
        );
        assert_eq!(ConnectFlags::NONE.to_string(), "NONE");
        assert_eq!(ConnectFlags(0x0100).to_string(), "0x00000100");
        assert_eq!(ConnectFlags(0x0102).to_string(), "K_LINE_ONLY | 0x00000100");
    }

    #[test]
    fn test_connect_flags_contains() {
        let flags = ConnectFlags::DT_SNIFF_MODE | ConnectFlags::K_LINE_ONLY;
        assert!(flags.contains(ConnectFlags::K_LINE_ONLY));
        assert!(!flags.contains(ConnectFlags::CHECKSUM_DISABLED));
        assert!(!flags.contains(ConnectFlags::NONE));
    }

    #[test]
    fn test_protocol_ids() {
        assert_eq!(KLineProtocol::Iso9141.id(), 3);
        assert_eq!(KLineProtocol::Iso14230.id(), 4);
        assert_eq!(Parity::Even.raw(), 2);
    }
}
