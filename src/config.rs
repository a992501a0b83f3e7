//! Runtime settings with defaults, overridable from `SHEETDESK_*` variables.

use std::path::PathBuf;

use crate::error::{Result, SheetError};
use crate::store::DEFAULT_STORAGE_KEY;

pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory the file-backed store writes into.
    pub data_dir: PathBuf,
    /// Key the dataset collection lives under.
    pub storage_key: String,
    pub page_size: usize,
    /// Static assets served by the web front end.
    pub static_dir: PathBuf,
    pub bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: PathBuf::from("./data"),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            static_dir: PathBuf::from("./static"),
            bind_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source; unset or blank
    /// variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Settings::default();

        if let Some(dir) = get("SHEETDESK_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Some(key) = get("SHEETDESK_STORAGE_KEY") {
            settings.storage_key = key;
        }
        if let Some(size) = get("SHEETDESK_PAGE_SIZE") {
            settings.page_size = parse_page_size(&size)?;
        }
        if let Some(dir) = get("SHEETDESK_STATIC_DIR") {
            settings.static_dir = PathBuf::from(dir);
        }
        if let Some(addr) = get("SHEETDESK_BIND") {
            settings.bind_addr = addr;
        }
        Ok(settings)
    }
}

pub fn parse_page_size(raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(SheetError::validation(format!(
            "page size must be a positive integer, got '{raw}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.storage_key, "excelFiles");
    }

    #[test]
    fn variables_override() {
        let settings = Settings::from_lookup(lookup(&[
            ("SHEETDESK_DATA_DIR", "/tmp/sd"),
            ("SHEETDESK_PAGE_SIZE", "50"),
            ("SHEETDESK_BIND", " "),
        ]))
        .unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/sd"));
        assert_eq!(settings.page_size, 50);
        assert_eq!(settings.bind_addr, "127.0.0.1:3000");
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let err = Settings::from_lookup(lookup(&[("SHEETDESK_PAGE_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, SheetError::Validation(_)));
    }
}
