//! Typed ids for adapter resources

use std::fmt;
use std::num::NonZeroU32;

/// Open adapter. Zero is never a valid device id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(NonZeroU32);

/// Connected logical channel. Zero is never a valid channel id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(NonZeroU32);

impl DeviceHandle {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn raw(self) -> u32 {
        self.0.get()
    }
}

impl ChannelHandle {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn raw(self) -> u32 {
        self.0.get()
    }
}

/// Running periodic transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeriodicHandle(pub(crate) u32);

impl PeriodicHandle {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Installed message filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterHandle(pub(crate) u32);

impl FilterHandle {
    pub fn raw(self) -> u32 {
        self.0
    }
}

macro_rules! display_raw {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.raw())
            }
        })*
    };
}

display_raw!(DeviceHandle, ChannelHandle, PeriodicHandle, FilterHandle);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ids_are_rejected() {
        assert!(DeviceHandle::new(0).is_none());
        assert!(ChannelHandle::new(0).is_none());
        assert_eq!(DeviceHandle::new(7).map(DeviceHandle::raw), Some(7));
        assert_eq!(ChannelHandle::new(2).unwrap().to_string(), "2");
    }
}
