//! Append-only CSV result store.
//!
//! Many workers append to the same file without coordinating. Every record
//! is encoded up front and handed to a single `write` on a file opened in
//! append mode, so concurrent appends interleave at line granularity.
//! Retries can append the same city twice; readers dedupe by key.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use rent_gap_models::{CityKey, ResultRecord};

use crate::LedgerError;

/// Header row written when a store is initialized.
pub const RESULT_HEADER: &str = "prov,city,loss,loss_ratio\n";

/// Handle to a result store file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultStore {
    path: PathBuf,
}

impl ResultStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the store with its header row. An existing store is left
    /// untouched unless `reset` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be created.
    pub fn initialize(&self, reset: bool) -> Result<(), LedgerError> {
        if reset {
            self.create_parent()?;
            std::fs::write(&self.path, RESULT_HEADER)
                .map_err(|e| LedgerError::io(&self.path, e))?;
            log::info!("Reset result store {}", self.path.display());
            return Ok(());
        }
        if self.create_with_header()? {
            log::info!("Initialized result store {}", self.path.display());
        } else {
            log::info!("Keeping existing result store {}", self.path.display());
        }
        Ok(())
    }

    /// Writes the header into a new store file. Returns `false` without
    /// touching the file if it already exists. The header goes through an
    /// append handle, so a record that lands between creation and header
    /// write is kept.
    fn create_with_header(&self) -> Result<bool, LedgerError> {
        self.create_parent()?;
        match std::fs::OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                file.write_all(RESULT_HEADER.as_bytes())
                    .map_err(|e| LedgerError::io(&self.path, e))?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(LedgerError::io(&self.path, e)),
        }
    }

    /// Appends one record as a single line.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or written.
    pub fn append(&self, record: &ResultRecord) -> Result<(), LedgerError> {
        if !self.path.exists() && self.create_with_header()? {
            log::info!("Initialized result store {}", self.path.display());
        }

        let mut encoder = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        encoder
            .serialize(record)
            .map_err(|e| LedgerError::csv(&self.path, e))?;
        let line = encoder
            .into_inner()
            .map_err(|e| LedgerError::io(&self.path, e.into_error()))?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LedgerError::io(&self.path, e))?;
        file.write_all(&line)
            .map_err(|e| LedgerError::io(&self.path, e))
    }

    /// Reads every record in file order, including duplicates.
    ///
    /// Header rows (a racing worker's record can land before the header,
    /// and older stores may hold more than one) and rows whose numbers do not parse are skipped. A
    /// store that does not exist yet reads as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn read(&self) -> Result<Vec<ResultRecord>, LedgerError> {
        if !self.path.exists() {
            log::warn!("Result store {} does not exist yet", self.path.display());
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| LedgerError::csv(&self.path, e))?;

        let mut records = Vec::new();
        let mut skipped = 0_usize;
        for row in reader.records() {
            let row = row.map_err(|e| LedgerError::csv(&self.path, e))?;
            match row.deserialize::<ResultRecord>(None) {
                Ok(record) => records.push(record),
                Err(_) => skipped += 1,
            }
        }

        if skipped > 1 {
            log::debug!(
                "Skipped {skipped} non-record rows in {}",
                self.path.display()
            );
        }
        Ok(records)
    }

    /// One record per city, the last write winning, in order of each
    /// city's first appearance.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn deduplicated(&self) -> Result<Vec<ResultRecord>, LedgerError> {
        let mut order = Vec::new();
        let mut latest: BTreeMap<CityKey, ResultRecord> = BTreeMap::new();
        for record in self.read()? {
            let key = record.key();
            if latest.insert(key.clone(), record).is_none() {
                order.push(key);
            }
        }
        Ok(order
            .into_iter()
            .filter_map(|key| latest.remove(&key))
            .collect())
    }

    /// Keys of every city with at least one recorded result.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn completed_keys(&self) -> Result<BTreeSet<CityKey>, LedgerError> {
        Ok(self.read()?.iter().map(ResultRecord::key).collect())
    }

    fn create_parent(&self) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
        }
        Ok(())
    }
}
