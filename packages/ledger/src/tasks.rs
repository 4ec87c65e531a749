//! Task lists: the task universe and the batch files cut from it.
//!
//! A task list is a headerless CSV of `task_id,prov,city` rows. Legacy
//! two-column `prov,city` lists are still accepted, in which case the row
//! position becomes the task id.

use std::io::Read;
use std::path::Path;

use rent_gap_models::{CityKey, CityUnit, PARCEL_FILE_SUFFIX, TaskId};

use crate::LedgerError;

/// An ordered list of city units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskList {
    units: Vec<CityUnit>,
}

impl TaskList {
    /// Builds a task list from city keys, assigning ids in iteration order.
    #[must_use]
    pub fn from_keys(keys: impl IntoIterator<Item = CityKey>) -> Self {
        let units = keys
            .into_iter()
            .zip(0_u32..)
            .map(|(key, id)| CityUnit::new(TaskId(id), &key))
            .collect();
        Self { units }
    }

    #[must_use]
    pub const fn from_units(units: Vec<CityUnit>) -> Self {
        Self { units }
    }

    #[must_use]
    pub fn units(&self) -> &[CityUnit] {
        &self.units
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&CityUnit> {
        self.units.iter().find(|u| u.id == id)
    }

    #[must_use]
    pub fn find(&self, key: &CityKey) -> Option<&CityUnit> {
        self.units.iter().find(|u| u.key() == *key)
    }

    /// Loads a task list file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a row is malformed.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let file = std::fs::File::open(path).map_err(|e| LedgerError::io(path, e))?;
        Self::from_reader(file, &path.display().to_string())
    }

    /// Parses a task list from any reader. `source` names the input in errors.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidTask`] for rows with the wrong number of
    /// fields or a non-numeric task id.
    pub fn from_reader<R: Read>(reader: R, source: &str) -> Result<Self, LedgerError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut units = Vec::new();
        for (position, record) in (0_u32..).zip(reader.records()) {
            let record = record.map_err(|e| LedgerError::csv(Path::new(source), e))?;
            let line = u64::from(position) + 1;
            let invalid = |message: String| LedgerError::InvalidTask {
                path: source.to_string(),
                line,
                message,
            };

            let unit = match record.len() {
                3 => {
                    let id = record[0]
                        .parse::<u32>()
                        .map_err(|e| invalid(format!("task id '{}': {e}", &record[0])))?;
                    CityUnit::new(TaskId(id), &CityKey::new(&record[1], &record[2]))
                }
                // Legacy `prov,city[,...]` rows from before ids were assigned.
                2 | 4 => CityUnit::new(TaskId(position), &CityKey::new(&record[0], &record[1])),
                n => return Err(invalid(format!("expected 3 fields, found {n}"))),
            };
            units.push(unit);
        }

        Ok(Self { units })
    }

    /// Writes the task list as headerless `task_id,prov,city` rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn write(&self, path: &Path) -> Result<(), LedgerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|e| LedgerError::csv(path, e))?;
        for unit in &self.units {
            writer
                .serialize(unit)
                .map_err(|e| LedgerError::csv(path, e))?;
        }
        writer.flush().map_err(|e| LedgerError::io(path, e))
    }
}

/// Builds the task universe from the parcel files in `parcel_dir`.
///
/// Files are sorted by name before ids are assigned, so rescanning an
/// unchanged directory reproduces the same ids.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed.
pub fn discover_tasks(parcel_dir: &Path) -> Result<TaskList, LedgerError> {
    let mut names: Vec<String> = std::fs::read_dir(parcel_dir)
        .map_err(|e| LedgerError::io(parcel_dir, e))?
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(PARCEL_FILE_SUFFIX))
        .collect();
    names.sort();

    let keys: Vec<CityKey> = names
        .iter()
        .filter_map(|name| {
            let key = CityKey::from_parcel_file_name(name);
            if key.is_none() {
                log::warn!("Skipping parcel file without a province-city name: {name}");
            }
            key
        })
        .collect();

    log::info!(
        "Discovered {} city tasks in {}",
        keys.len(),
        parcel_dir.display()
    );
    Ok(TaskList::from_keys(keys))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn assigns_sequential_ids() {
        let list = TaskList::from_keys([CityKey::new("A", "X"), CityKey::new("B", "Z")]);
        assert_eq!(list.units()[0].id, TaskId(0));
        assert_eq!(list.units()[1].id, TaskId(1));
        assert_eq!(list.find(&CityKey::new("B", "Z")).unwrap().id, TaskId(1));
    }

    #[test]
    fn reads_explicit_ids() {
        let list = TaskList::from_reader("7,A,X\n3, B , Z \n".as_bytes(), "tasks").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.units()[1].id, TaskId(3));
        assert_eq!(list.units()[1].key(), CityKey::new("B", "Z"));
        assert_eq!(list.get(TaskId(7)).unwrap().city, "X");
    }

    #[test]
    fn reads_legacy_rows_by_position() {
        let list = TaskList::from_reader("A,X\nA,Y,,\n".as_bytes(), "tasks.txt").unwrap();
        assert_eq!(list.units()[0].id, TaskId(0));
        assert_eq!(list.units()[1].id, TaskId(1));
        assert_eq!(list.units()[1].city, "Y");
    }

    #[test]
    fn rejects_bad_task_id() {
        let err = TaskList::from_reader("x,A,X\n".as_bytes(), "tasks").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTask { line: 1, .. }));
    }

    #[test]
    fn writes_and_reloads() {
        let tmp = std::env::temp_dir().join("rent_gap_tasks_write_test");
        let _ = fs::remove_dir_all(&tmp);
        let path = tmp.join("tasks.csv");

        let list = TaskList::from_keys([CityKey::new("A", "X"), CityKey::new("A", "Y")]);
        list.write(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "0,A,X\n1,A,Y\n");
        assert_eq!(TaskList::load(&path).unwrap(), list);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn discovers_parcel_files_in_name_order() {
        let tmp = std::env::temp_dir().join("rent_gap_tasks_discover_test");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        for name in ["B-Z_hp.csv", "A-Y_hp.csv", "A-X_hp.csv", "readme.txt", "broken_hp.csv"] {
            fs::write(tmp.join(name), "price,lng,lat\n").unwrap();
        }

        let list = discover_tasks(&tmp).unwrap();
        let keys: Vec<String> = list.units().iter().map(|u| u.key().joined()).collect();
        assert_eq!(keys, vec!["A-X", "A-Y", "B-Z"]);

        let _ = fs::remove_dir_all(&tmp);
    }
}
