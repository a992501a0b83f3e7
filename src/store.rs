use log::{error, info};

use crate::error::{Result, SheetError};
use crate::record::{Dataset, DatasetSummary, Record};
use crate::storage::KeyValueStore;

/// Key the dataset collection is stored under.
pub const DEFAULT_STORAGE_KEY: &str = "excelFiles";

/// Whether an upsert added a dataset or replaced one with the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Created,
    Replaced,
}

/// In-memory list of named datasets mirrored to a key-value backend.
///
/// Every mutation serializes the complete next collection and writes it
/// before the in-memory copy changes. A failed write leaves the store exactly
/// as it was.
#[derive(Debug)]
pub struct RecordStore<S> {
    backend: S,
    key: String,
    datasets: Vec<Dataset>,
    last_revision: u64,
}

impl<S: KeyValueStore> RecordStore<S> {
    pub fn open(backend: S) -> Result<Self> {
        Self::open_with_key(backend, DEFAULT_STORAGE_KEY)
    }

    pub fn open_with_key(backend: S, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let datasets: Vec<Dataset> = match backend.get(&key)? {
            Some(text) if !text.trim().is_empty() => serde_json::from_str(&text)
                .map_err(|e| SheetError::Persistence(format!("corrupt collection '{key}': {e}")))?,
            _ => Vec::new(),
        };

        let mut store = RecordStore {
            backend,
            key,
            datasets: Vec::with_capacity(datasets.len()),
            last_revision: 0,
        };
        for dataset in datasets {
            let mut dataset = Dataset::new(dataset.name, dataset.headers, dataset.rows);
            dataset.revision = store.bump();
            store.datasets.push(dataset);
        }
        info!("opened store '{}' with {} datasets", store.key, store.datasets.len());
        Ok(store)
    }

    fn bump(&mut self) -> u64 {
        self.last_revision += 1;
        self.last_revision
    }

    fn commit(&mut self, next: Vec<Dataset>) -> Result<()> {
        let text = serde_json::to_string(&next)?;
        if let Err(err) = self.backend.set(&self.key, &text) {
            error!("failed to persist '{}': {}", self.key, err);
            return Err(err);
        }
        self.datasets = next;
        Ok(())
    }

    pub fn list_datasets(&self) -> Vec<DatasetSummary> {
        self.datasets.iter().map(Dataset::summary).collect()
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    pub fn get(&self, name: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert `dataset`, or replace the same-named one in place.
    pub fn upsert(&mut self, dataset: Dataset) -> Result<Upserted> {
        let mut dataset = Dataset::new(dataset.name, dataset.headers, dataset.rows);
        dataset.revision = self.bump();

        let mut next = self.datasets.clone();
        let outcome = match next.iter().position(|d| d.name == dataset.name) {
            Some(index) => {
                next[index] = dataset;
                Upserted::Replaced
            }
            None => {
                next.push(dataset);
                Upserted::Created
            }
        };
        self.commit(next)?;
        info!("{:?} dataset, store now holds {}", outcome, self.datasets.len());
        Ok(outcome)
    }

    /// Drop the named dataset. Returns `false` when it was not stored.
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        if !self.contains(name) {
            return Ok(false);
        }
        let next = self
            .datasets
            .iter()
            .filter(|d| d.name != name)
            .cloned()
            .collect();
        self.commit(next)?;
        info!("removed dataset '{name}'");
        Ok(true)
    }

    /// Swap the row list of an existing dataset, keeping its headers.
    pub fn replace_rows(&mut self, name: &str, rows: Vec<Record>) -> Result<()> {
        let index = self
            .datasets
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| SheetError::not_found(format!("dataset '{name}'")))?;

        let revision = self.bump();
        let mut next = self.datasets.clone();
        let target = &mut next[index];
        target.rows = rows.into_iter().map(|r| r.conform(&target.headers)).collect();
        target.revision = revision;

        self.commit(next)?;
        info!("committed {} rows to '{name}'", self.datasets[index].rows.len());
        Ok(())
    }

    /// Replace the whole collection, e.g. when restoring an archive.
    pub fn replace_all(&mut self, datasets: Vec<Dataset>) -> Result<()> {
        let mut next = Vec::with_capacity(datasets.len());
        for dataset in datasets {
            if next.iter().any(|d: &Dataset| d.name == dataset.name) {
                return Err(SheetError::validation(format!(
                    "duplicate dataset name '{}'",
                    dataset.name
                )));
            }
            let mut dataset = Dataset::new(dataset.name, dataset.headers, dataset.rows);
            dataset.revision = self.bump();
            next.push(dataset);
        }
        self.commit(next)
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }
}
