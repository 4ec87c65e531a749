//! Reconciling the task list against recorded results and worker logs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use rent_gap_models::{CityKey, CityUnit, FailureKind, TaskId};
use serde::Serialize;

use crate::{LedgerError, ResultStore, TaskList};

/// Why a unit is missing from the result store, read from its worker log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Diagnosis {
    /// The log ends with the canonical "no matching boundary file" line.
    GeometryNotFound,
    /// The log ends with some other line, reported verbatim.
    LastLine(String),
    /// No log exists for the unit's task id.
    NoLogFound,
}

impl Diagnosis {
    /// The failure kind this diagnosis pins down, if any.
    #[must_use]
    pub const fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::GeometryNotFound => Some(FailureKind::GeometryNotFoundError),
            Self::NoLogFound => Some(FailureKind::NoLogFound),
            Self::LastLine(_) => None,
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GeometryNotFound => write!(f, "{}", FailureKind::GeometryNotFoundError),
            Self::LastLine(line) => write!(f, "Last log line = '{line}'"),
            Self::NoLogFound => write!(f, "{}", FailureKind::NoLogFound),
        }
    }
}

/// The canonical final log line of a unit whose boundary file was not found.
#[must_use]
pub fn geometry_not_found_line(key: &CityKey) -> String {
    format!("No matching file found for {key}.")
}

/// One missing unit and its diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub unit: CityUnit,
    pub log_file: Option<PathBuf>,
    pub diagnosis: Diagnosis,
}

/// Result of reconciling a task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub total: usize,
    pub completed: usize,
    pub missing: Vec<LedgerEntry>,
}

impl Reconciliation {
    /// Missing units as a task list, ready to be re-dispatched as a batch.
    #[must_use]
    pub fn missing_tasks(&self) -> TaskList {
        TaskList::from_units(self.missing.iter().map(|e| e.unit.clone()).collect())
    }

    /// Missing unit counts per failure kind; unclassified log lines are
    /// counted under `None`.
    #[must_use]
    pub fn counts_by_kind(&self) -> BTreeMap<Option<String>, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.missing {
            let kind = entry.diagnosis.kind().map(|k| k.to_string());
            *counts.entry(kind).or_insert(0) += 1;
        }
        counts
    }

    /// Writes the missing units as headerless `prov,city` rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_missing(&self, path: &Path) -> Result<(), LedgerError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|e| LedgerError::csv(path, e))?;
        for entry in &self.missing {
            writer
                .write_record([&entry.unit.province, &entry.unit.city])
                .map_err(|e| LedgerError::csv(path, e))?;
        }
        writer.flush().map_err(|e| LedgerError::io(path, e))
    }
}

/// Units of `tasks` whose key is not in `completed`, in task order.
#[must_use]
pub fn missing_units<'a>(tasks: &'a TaskList, completed: &BTreeSet<CityKey>) -> Vec<&'a CityUnit> {
    tasks
        .units()
        .iter()
        .filter(|unit| !completed.contains(&unit.key()))
        .collect()
}

/// Suffix identifying the worker log of a task, e.g. `_42.out`.
#[must_use]
pub fn log_suffix(id: TaskId) -> String {
    format!("_{id}.out")
}

/// File name of the worker log a unit writes, e.g. `unit_42.out`.
#[must_use]
pub fn log_file_name(id: TaskId) -> String {
    format!("unit{}", log_suffix(id))
}

/// Sorted file names in `log_dir`; empty if the directory does not exist.
fn log_file_names(log_dir: &Path) -> Result<Vec<String>, LedgerError> {
    if !log_dir.is_dir() {
        log::warn!("Log directory {} does not exist", log_dir.display());
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = std::fs::read_dir(log_dir)
        .map_err(|e| LedgerError::io(log_dir, e))?
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    Ok(names)
}

/// Classifies a worker log's contents for `key`.
#[must_use]
pub fn classify_log(contents: &str, key: &CityKey) -> Diagnosis {
    let last_line = contents.lines().last().unwrap_or("").trim();
    if last_line == geometry_not_found_line(key) {
        Diagnosis::GeometryNotFound
    } else {
        Diagnosis::LastLine(last_line.to_string())
    }
}

/// Diagnoses every unit of `tasks` that has no result in `store`, using the
/// worker logs in `log_dir`.
///
/// # Errors
///
/// Returns an error if the store, the log directory, or a log file cannot
/// be read.
pub fn reconcile(
    tasks: &TaskList,
    store: &ResultStore,
    log_dir: &Path,
) -> Result<Reconciliation, LedgerError> {
    let completed = store.completed_keys()?;
    let missing = missing_units(tasks, &completed);
    let log_names = log_file_names(log_dir)?;

    let mut entries = Vec::with_capacity(missing.len());
    for unit in missing {
        let suffix = log_suffix(unit.id);
        let log_file = log_names
            .iter()
            .find(|name| name.ends_with(&suffix))
            .map(|name| log_dir.join(name));

        let diagnosis = match &log_file {
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|e| LedgerError::io(path, e))?;
                classify_log(&String::from_utf8_lossy(&bytes), &unit.key())
            }
            None => Diagnosis::NoLogFound,
        };

        log::info!("{},{}: {diagnosis}", unit.province, unit.city);
        entries.push(LedgerEntry {
            unit: unit.clone(),
            log_file,
            diagnosis,
        });
    }

    let reconciliation = Reconciliation {
        total: tasks.len(),
        completed: tasks.len() - entries.len(),
        missing: entries,
    };
    log::info!(
        "{} of {} tasks have results, {} missing",
        reconciliation.completed,
        reconciliation.total,
        reconciliation.missing.len()
    );
    Ok(reconciliation)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rent_gap_models::ResultRecord;

    use super::*;

    fn universe() -> TaskList {
        TaskList::from_keys([
            CityKey::new("A", "X"),
            CityKey::new("A", "Y"),
            CityKey::new("B", "Z"),
        ])
    }

    #[test]
    fn missing_is_universe_minus_results() {
        let tasks = universe();
        let completed: BTreeSet<CityKey> = [CityKey::new("A", "X")].into_iter().collect();
        let missing: Vec<CityKey> = missing_units(&tasks, &completed)
            .into_iter()
            .map(CityUnit::key)
            .collect();
        assert_eq!(missing, vec![CityKey::new("A", "Y"), CityKey::new("B", "Z")]);
    }

    #[test]
    fn classifies_geometry_not_found() {
        let key = CityKey::new("A", "Y");
        let log = "Fitted model for A-Y\nNo matching file found for A-Y.\n";
        assert_eq!(classify_log(log, &key), Diagnosis::GeometryNotFound);
    }

    #[test]
    fn other_last_lines_are_surfaced() {
        let key = CityKey::new("A", "Y");
        assert_eq!(
            classify_log("start\nDistance coefficient is not negative (slope = 0)\n", &key),
            Diagnosis::LastLine("Distance coefficient is not negative (slope = 0)".to_string())
        );
        assert_eq!(classify_log("", &key), Diagnosis::LastLine(String::new()));
        // A message for another city is not this unit's geometry failure.
        assert_eq!(
            classify_log("No matching file found for A-X.", &key),
            Diagnosis::LastLine("No matching file found for A-X.".to_string())
        );
    }

    #[test]
    fn reconciles_against_store_and_logs() {
        let tmp = std::env::temp_dir().join("rent_gap_reconcile_test");
        let _ = fs::remove_dir_all(&tmp);
        let log_dir = tmp.join("logs");
        fs::create_dir_all(&log_dir).unwrap();

        let store = ResultStore::new(tmp.join("results.csv"));
        store
            .append(&ResultRecord {
                province: "A".to_string(),
                city: "X".to_string(),
                loss: 1.0,
                loss_ratio: 2.0,
            })
            .unwrap();
        fs::write(log_dir.join("unit_1.out"), "No matching file found for A-Y.\n").unwrap();
        // A log for the completed unit and an unrelated suffix.
        fs::write(log_dir.join("unit_0.out"), "done\n").unwrap();
        fs::write(log_dir.join("unit_12.out"), "other\n").unwrap();

        let result = reconcile(&universe(), &store, &log_dir).unwrap();
        assert_eq!(result.total, 3);
        assert_eq!(result.completed, 1);
        assert_eq!(result.missing.len(), 2);
        assert_eq!(result.missing[0].diagnosis, Diagnosis::GeometryNotFound);
        assert_eq!(result.missing[1].diagnosis, Diagnosis::NoLogFound);
        assert_eq!(result.missing[1].diagnosis.kind(), Some(FailureKind::NoLogFound));

        let missing_path = tmp.join("missing_results.csv");
        result.write_missing(&missing_path).unwrap();
        assert_eq!(fs::read_to_string(&missing_path).unwrap(), "A,Y\nB,Z\n");

        let retry = result.missing_tasks();
        assert_eq!(retry.len(), 2);
        assert_eq!(retry.units()[0].id, TaskId(1));

        let counts = result.counts_by_kind();
        assert_eq!(counts.get(&Some("NO_LOG_FOUND".to_string())), Some(&1));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_log_directory_means_no_logs() {
        let tmp = std::env::temp_dir().join("rent_gap_reconcile_nologs_test");
        let _ = fs::remove_dir_all(&tmp);
        let store = ResultStore::new(tmp.join("results.csv"));

        let result = reconcile(&universe(), &store, &tmp.join("logs")).unwrap();
        assert_eq!(result.missing.len(), 3);
        assert!(result
            .missing
            .iter()
            .all(|e| e.diagnosis == Diagnosis::NoLogFound));
    }
}
