//! J2534 status codes returned by every PassThru entry point

use std::fmt;

/// J2534 status codes (SAE J2534-1 v04.04)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    NoError,
    NotSupported,
    InvalidChannelId,
    InvalidProtocolId,
    NullParameter,
    InvalidIoctlValue,
    InvalidFlags,
    Failed,
    DeviceNotConnected,
    Timeout,
    InvalidMsg,
    InvalidTimeInterval,
    ExceededLimit,
    InvalidMsgId,
    DeviceInUse,
    InvalidIoctlId,
    BufferEmpty,
    BufferFull,
    BufferOverflow,
    PinInvalid,
    ChannelInUse,
    MsgProtocolId,
    InvalidFilterId,
    NoFlowControl,
    NotUnique,
    InvalidBaudrate,
    InvalidDeviceId,

    /// Vendor-specific or reserved code
    Unknown(u32),
}

impl StatusCode {
    /// "No data within the read timeout" rather than a real failure
    pub fn is_no_data(self) -> bool {
        matches!(self, Self::Timeout | Self::BufferEmpty)
    }

    /// Map a raw driver return value into a `Result`
    pub fn into_result(raw: i32) -> Result<(), StatusCode> {
        match StatusCode::from(raw as u32) {
            StatusCode::NoError => Ok(()),
            other => Err(other),
        }
    }
}

impl From<u32> for StatusCode {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::NotSupported,
            2 => Self::InvalidChannelId,
            3 => Self::InvalidProtocolId,
            4 => Self::NullParameter,
            5 => Self::InvalidIoctlValue,
            6 => Self::InvalidFlags,
            7 => Self::Failed,
            8 => Self::DeviceNotConnected,
            9 => Self::Timeout,
            10 => Self::InvalidMsg,
            11 => Self::InvalidTimeInterval,
            12 => Self::ExceededLimit,
            13 => Self::InvalidMsgId,
            14 => Self::DeviceInUse,
            15 => Self::InvalidIoctlId,
            16 => Self::BufferEmpty,
            17 => Self::BufferFull,
            18 => Self::BufferOverflow,
            19 => Self::PinInvalid,
            20 => Self::ChannelInUse,
            21 => Self::MsgProtocolId,
            22 => Self::InvalidFilterId,
            23 => Self::NoFlowControl,
            24 => Self::NotUnique,
            25 => Self::InvalidBaudrate,
            26 => Self::InvalidDeviceId,
            other => Self::Unknown(other),
        }
    }
}

impl From<StatusCode> for u32 {
    fn from(code: StatusCode) -> Self {
        match code {
            StatusCode::NoError => 0,
            StatusCode::NotSupported => 1,
            StatusCode::InvalidChannelId => 2,
            StatusCode::InvalidProtocolId => 3,
            StatusCode::NullParameter => 4,
            StatusCode::InvalidIoctlValue => 5,
            StatusCode::InvalidFlags => 6,
            StatusCode::Failed => 7,
            StatusCode::DeviceNotConnected => 8,
            StatusCode::Timeout => 9,
            StatusCode::InvalidMsg => 10,
            StatusCode::InvalidTimeInterval => 11,
            StatusCode::ExceededLimit => 12,
            StatusCode::InvalidMsgId => 13,
            StatusCode::DeviceInUse => 14,
            StatusCode::InvalidIoctlId => 15,
            StatusCode::BufferEmpty => 16,
            StatusCode::BufferFull => 17,
            StatusCode::BufferOverflow => 18,
            StatusCode::PinInvalid => 19,
            StatusCode::ChannelInUse => 20,
            StatusCode::MsgProtocolId => 21,
            StatusCode::InvalidFilterId => 22,
            StatusCode::NoFlowControl => 23,
            StatusCode::NotUnique => 24,
            StatusCode::InvalidBaudrate => 25,
            StatusCode::InvalidDeviceId => 26,
            StatusCode::Unknown(v) => v,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoError => "STATUS_NOERROR",
            Self::NotSupported => "ERR_NOT_SUPPORTED",
            Self::InvalidChannelId => "ERR_INVALID_CHANNEL_ID",
            Self::InvalidProtocolId => "ERR_INVALID_PROTOCOL_ID",
            Self::NullParameter => "ERR_NULL_PARAMETER",
            Self::InvalidIoctlValue => "ERR_INVALID_IOCTL_VALUE",
            Self::InvalidFlags => "ERR_INVALID_FLAGS",
            Self::Failed => "ERR_FAILED",
            Self::DeviceNotConnected => "ERR_DEVICE_NOT_CONNECTED",
            Self::Timeout => "ERR_TIMEOUT",
            Self::InvalidMsg => "ERR_INVALID_MSG",
            Self::InvalidTimeInterval => "ERR_INVALID_TIME_INTERVAL",
            Self::ExceededLimit => "ERR_EXCEEDED_LIMIT",
            Self::InvalidMsgId => "ERR_INVALID_MSG_ID",
            Self::DeviceInUse => "ERR_DEVICE_IN_USE",
            Self::InvalidIoctlId => "ERR_INVALID_IOCTL_ID",
            Self::BufferEmpty => "ERR_BUFFER_EMPTY",
            Self::BufferFull => "ERR_BUFFER_FULL",
            Self::BufferOverflow => "ERR_BUFFER_OVERFLOW",
            Self::PinInvalid => "ERR_PIN_INVALID",
            Self::ChannelInUse => "ERR_CHANNEL_IN_USE",
            Self::MsgProtocolId => "ERR_MSG_PROTOCOL_ID",
            Self::InvalidFilterId => "ERR_INVALID_FILTER_ID",
            Self::NoFlowControl => "ERR_NO_FLOW_CONTROL",
            Self::NotUnique => "ERR_NOT_UNIQUE",
            Self::InvalidBaudrate => "ERR_INVALID_BAUDRATE",
            Self::InvalidDeviceId => "ERR_INVALID_DEVICE_ID",
            Self::Unknown(v) => return write!(f, "ERR_UNKNOWN(0x{:08X})", v),
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_round_trip() {
        for raw in 0u32..=26 {
            let code = StatusCode::from(raw);
            assert!(!matches!(code, StatusCode::Unknown(_)), "code {} unmapped", raw);
            assert_eq!(u32::from(code), raw);
        }
    }

    #[test]
    fn test_unknown_code_preserved() {
        let code = StatusCode::from(0x1000_0001);
        assert_eq!(code, StatusCode::Unknown(0x1000_0001));
        assert_eq!(code.to_string(), "ERR_UNKNOWN(0x10000001)");
    }

    #[test]
    fn test_no_data_classification() {
        assert!(StatusCode::Timeout.is_no_data());
        assert!(StatusCode::BufferEmpty.is_no_data());
        assert!(!StatusCode::Failed.is_no_data());
        assert!(!StatusCode::InvalidFlags.is_no_data());
    }

    #[test]
    fn test_into_result() {
        assert!(StatusCode::into_result(0).is_ok());
        assert_eq!(StatusCode::into_result(6), Err(StatusCode::InvalidFlags));
    }
}
