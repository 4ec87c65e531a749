//! Per-unit worker logs.
//!
//! Each unit writes `unit_{task_id}.out` in the log directory, one line per
//! pipeline stage, flushed as it goes. The last line is the unit's terminal
//! status or failure message, which is what reconciliation reads when the
//! unit is missing from the result store. A retry truncates the old log.

use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use rent_gap_ledger::reconcile::log_file_name;
use rent_gap_models::TaskId;

use crate::PipelineError;

pub struct UnitLog {
    path: PathBuf,
    file: File,
}

impl UnitLog {
    /// Creates (or truncates) the log for `id` under `log_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn create(log_dir: &Path, id: TaskId) -> Result<Self, PipelineError> {
        std::fs::create_dir_all(log_dir).map_err(|e| PipelineError::io(log_dir, e))?;
        let path = log_dir.join(log_file_name(id));
        let file = File::create(&path).map_err(|e| PipelineError::io(&path, e))?;
        Ok(Self { path, file })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line to the log and mirrors it to the `log` facade.
    ///
    /// # Errors
    ///
    /// Returns an error if the line cannot be written.
    pub fn line(&mut self, message: &str) -> Result<(), PipelineError> {
        log::info!("{message}");
        writeln!(self.file, "{message}").map_err(|e| PipelineError::io(&self.path, e))
    }
}
