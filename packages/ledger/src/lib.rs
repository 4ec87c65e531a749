#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bookkeeping for coordinator-free batch runs.
//!
//! City units are generated once into a task list, split into batches for
//! independent worker lanes, and their results appended to a shared CSV
//! store. Nothing coordinates the workers, so completion is established
//! after the fact: [`reconcile::reconcile`] diffs the task list against the
//! store and reads each missing unit's worker log to say why it is missing.

pub mod batch;
pub mod lanes;
pub mod reconcile;
pub mod results;
pub mod tasks;

use std::path::Path;

use thiserror::Error;

pub use reconcile::{Diagnosis, LedgerEntry, Reconciliation, reconcile};
pub use results::ResultStore;
pub use tasks::TaskList;

/// Errors that can occur while reading or writing ledger files.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// I/O error on a ledger file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Malformed CSV.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// File being read or written.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// A task list row could not be interpreted.
    #[error("Invalid task row {line} in {path}: {message}")]
    InvalidTask {
        /// File being read.
        path: String,
        /// 1-based row number.
        line: u64,
        /// What was wrong with the row.
        message: String,
    },

    /// Partitioning was asked for an impossible split.
    #[error("Invalid partition: {0}")]
    InvalidPartition(String),
}

impl LedgerError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.display().to_string(),
            source,
        }
    }
}
