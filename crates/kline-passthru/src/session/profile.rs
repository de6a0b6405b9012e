//! Adapter families and their connect flags
//!
//! K-Line adapters disagree on what the low connect-flag bits mean, so the
//! first attempt uses flags picked from the driver name, and an
//! `ERR_INVALID_FLAGS` rejection walks [`FALLBACK_FLAGS`] in order.

use std::fmt;

use crate::j2534::ConnectFlags;

/// Adapter family inferred from the driver name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterFamily {
    /// Drew Technologies Mongoose, including JLR-branded units
    MongooseJlr,
    /// Tactrix OpenPort 2.0
    OpenPort2,
    Unknown,
}

impl AdapterFamily {
    /// Flags for the first connect attempt
    pub fn primary_flags(self) -> ConnectFlags {
        match self {
            AdapterFamily::MongooseJlr => {
                ConnectFlags::DT_SNIFF_MODE
                    | ConnectFlags::K_LINE_ONLY
                    | ConnectFlags::CHECKSUM_DISABLED
            }
            AdapterFamily::OpenPort2 | AdapterFamily::Unknown => ConnectFlags::ISO9141_NO_CHECKSUM,
        }
    }
}

impl fmt::Display for AdapterFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdapterFamily::MongooseJlr => "Mongoose/JLR",
            AdapterFamily::OpenPort2 => "OpenPort 2.0",
            AdapterFamily::Unknown => "generic",
        })
    }
}

/// Classify an adapter by its (driver) name, case-insensitively
pub fn classify_adapter(name: &str) -> AdapterFamily {
    let name = name.to_lowercase();
    if name.contains("mongoose") || name.contains("jlr") {
        AdapterFamily::MongooseJlr
    } else if name.contains("op20pt32") || name.contains("openport") {
        AdapterFamily::OpenPort2
    } else {
        AdapterFamily::Unknown
    }
}

/// Candidates tried after the primary flags are rejected as invalid
pub const FALLBACK_FLAGS: [ConnectFlags; 8] = [
    ConnectFlags(ConnectFlags::DT_SNIFF_MODE.0 | ConnectFlags::K_LINE_ONLY.0),
    ConnectFlags(ConnectFlags::DT_SNIFF_MODE.0 | ConnectFlags::CHECKSUM_DISABLED.0),
    ConnectFlags(ConnectFlags::K_LINE_ONLY.0 | ConnectFlags::CHECKSUM_DISABLED.0),
    ConnectFlags::DT_SNIFF_MODE,
    ConnectFlags::K_LINE_ONLY,
    ConnectFlags::CHECKSUM_DISABLED,
    ConnectFlags::ISO9141_NO_CHECKSUM,
    ConnectFlags::NONE,
];

/// Primary flags plus the fallback sequence for one adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectProfile {
    pub family: AdapterFamily,
    pub primary: ConnectFlags,
    pub fallbacks: &'static [ConnectFlags],
}

impl ConnectProfile {
    pub fn for_adapter(name: &str) -> Self {
        let family = classify_adapter(name);
        Self {
            family,
            primary: family.primary_flags(),
            fallbacks: &FALLBACK_FLAGS,
        }
    }

    /// Attempts made before giving up
    pub fn max_attempts(&self) -> usize {
        1 + self.fallbacks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_adapter() {
        assert_eq!(classify_adapter("MongooseProISO2"), AdapterFamily::MongooseJlr);
        assert_eq!(classify_adapter("jlr_sdd_mongoose"), AdapterFamily::MongooseJlr);
        assert_eq!(classify_adapter("op20pt32"), AdapterFamily::OpenPort2);
        assert_eq!(classify_adapter("Tactrix OpenPort 2.0"), AdapterFamily::OpenPort2);
        assert_eq!(classify_adapter("cardaq"), AdapterFamily::Unknown);
    }

    #[test]
    fn test_primary_flags() {
        assert_eq!(AdapterFamily::MongooseJlr.primary_flags().bits(), 0x07);
        assert_eq!(AdapterFamily::OpenPort2.primary_flags().bits(), 0x04);
        assert_eq!(AdapterFamily::Unknown.primary_flags().bits(), 0x04);
    }

    #[test]
    fn test_fallback_order() {
        let bits: Vec<u32> = FALLBACK_FLAGS.iter().map(|f| f.bits()).collect();
        assert_eq!(bits, vec![0x03, 0x05, 0x06, 0x01, 0x02, 0x04, 0x04, 0x00]);
        assert_eq!(ConnectProfile::for_adapter("op20pt32").max_attempts(), 9);
    }
}
