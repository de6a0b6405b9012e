//! Installed adapter catalog
//!
//! Adapters are registered in configuration as `(name, driver module)` pairs:
//!
//! ```toml
//! [[adapters]]
//! name = "Tactrix OpenPort 2.0"
//! library = "C:/Windows/SysWOW64/op20pt32.dll"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::session::{classify_adapter, AdapterFamily};

/// One registered PassThru adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    /// Display name
    pub name: String,
    /// Path to the vendor driver module
    pub library: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
}

impl AdapterInfo {
    pub fn new(name: impl Into<String>, library: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            library: library.into(),
            vendor: None,
        }
    }

    /// Name used to pick connect flags: the driver file stem, else the display name
    pub fn classification_key(&self) -> String {
        self.library
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_lowercase())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| self.name.to_lowercase())
    }

    pub fn family(&self) -> AdapterFamily {
        classify_adapter(&self.classification_key())
    }

    /// Whether the driver module exists on disk
    pub fn is_installed(&self) -> bool {
        self.library.is_file()
    }
}

/// Registered adapters, in configuration order
#[derive(Debug, Clone, Default)]
pub struct AdapterCatalog {
    adapters: Vec<AdapterInfo>,
}

impl AdapterCatalog {
    pub fn new(adapters: Vec<AdapterInfo>) -> Self {
        Self { adapters }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AdapterInfo> {
        self.adapters.iter()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Select by 1-based index or case-insensitive name
    pub fn select(&self, selector: &str) -> Option<&AdapterInfo> {
        if let Ok(index) = selector.parse::<usize>() {
            return index.checked_sub(1).and_then(|i| self.adapters.get(i));
        }
        self.adapters
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(selector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> AdapterCatalog {
        AdapterCatalog::new(vec![
            AdapterInfo::new("Tactrix OpenPort 2.0", "C:/Windows/SysWOW64/op20pt32.dll"),
            AdapterInfo::new("JLR SDD Mongoose", "C:/Program Files/Drew Tech/MongooseJLR.dll"),
            AdapterInfo::new("Mongoose Pro", ""),
        ])
    }

    #[test]
    fn test_classification_prefers_driver_stem() {
        let catalog = catalog();
        let adapters: Vec<_> = catalog.iter().collect();
        assert_eq!(adapters[0].classification_key(), "op20pt32");
        assert_eq!(adapters[0].family(), AdapterFamily::OpenPort2);
        assert_eq!(adapters[1].family(), AdapterFamily::MongooseJlr);
        assert_eq!(adapters[2].classification_key(), "mongoose pro");
    }

    #[test]
    fn test_select_by_index_or_name() {
        let catalog = catalog();
        assert_eq!(catalog.select("1").unwrap().name, "Tactrix OpenPort 2.0");
        assert_eq!(catalog.select("jlr sdd mongoose").unwrap().name, "JLR SDD Mongoose");
        assert!(catalog.select("0").is_none());
        assert!(catalog.select("4").is_none());
        assert!(catalog.select("cardaq").is_none());
    }
}
