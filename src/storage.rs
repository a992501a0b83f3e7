//! Persistent key-value collaborators backing the record store.
//!
//! The store only ever reads and writes whole values under a single key, the
//! way the browser version used `localStorage`.

use log::debug;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{Result, SheetError};

pub trait KeyValueStore {
    /// Value under `key`, `None` if it was never written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value under `key` in one write.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// One `<key>.json` file per key inside a data directory.
///
/// Writes go to a temporary file in the same directory and are renamed over
/// the target, so a failed write never leaves a truncated collection behind.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStore { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(SheetError::Persistence(format!("invalid storage key '{key}'")));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

fn persistence(action: &str, path: &Path, err: io::Error) -> SheetError {
    SheetError::Persistence(format!("{action} {}: {err}", path.display()))
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(persistence("reading", &path, err)),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root).map_err(|e| persistence("creating", &self.root, e))?;

        let mut tmp =
            NamedTempFile::new_in(&self.root).map_err(|e| persistence("staging", &path, e))?;
        tmp.write_all(value.as_bytes())
            .map_err(|e| persistence("writing", &path, e))?;
        tmp.persist(&path)
            .map_err(|e| persistence("replacing", &path, e.error))?;

        debug!("wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }
}

/// In-process store for ephemeral sessions and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
