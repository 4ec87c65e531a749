//! Splitting a task list into batches for independent worker lanes.

use std::path::{Path, PathBuf};

use crate::{LedgerError, TaskList};

/// Splits `items` into exactly `batches` contiguous slices.
///
/// Slice lengths differ by at most one and the first `len % batches` slices
/// carry the extra item. Concatenating the slices in order yields `items`.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidPartition`] if `batches` is zero.
pub fn partition<T>(items: &[T], batches: usize) -> Result<Vec<&[T]>, LedgerError> {
    if batches == 0 {
        return Err(LedgerError::InvalidPartition(
            "batch count must be at least 1".to_string(),
        ));
    }

    let base = items.len() / batches;
    let extra = items.len() % batches;

    let mut out = Vec::with_capacity(batches);
    let mut start = 0;
    for i in 0..batches {
        let len = base + usize::from(i < extra);
        out.push(&items[start..start + len]);
        start += len;
    }
    Ok(out)
}

/// Splits `items` into contiguous slices of `size` (the last may be shorter).
///
/// # Errors
///
/// Returns [`LedgerError::InvalidPartition`] if `size` is zero.
pub fn chunk<T>(items: &[T], size: usize) -> Result<Vec<&[T]>, LedgerError> {
    if size == 0 {
        return Err(LedgerError::InvalidPartition(
            "batch size must be at least 1".to_string(),
        ));
    }
    Ok(items.chunks(size).collect())
}

/// File name of the 1-based batch `index`.
#[must_use]
pub fn batch_file_name(index: usize) -> String {
    format!("batch_{index}.csv")
}

/// Writes `batches` batch files for `tasks` into `dir` and returns their
/// paths in lane order.
///
/// # Errors
///
/// Returns an error if the partition is invalid or a file cannot be written.
pub fn write_batches(
    tasks: &TaskList,
    batches: usize,
    dir: &Path,
) -> Result<Vec<PathBuf>, LedgerError> {
    std::fs::create_dir_all(dir).map_err(|e| LedgerError::io(dir, e))?;

    let mut paths = Vec::with_capacity(batches);
    for (i, slice) in partition(tasks.units(), batches)?.into_iter().enumerate() {
        let path = dir.join(batch_file_name(i + 1));
        TaskList::from_units(slice.to_vec()).write(&path)?;
        log::info!("Wrote {} tasks to {}", slice.len(), path.display());
        paths.push(path);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rent_gap_models::CityKey;

    use super::*;

    #[test]
    fn partitions_reconstruct_input() {
        let items: Vec<u32> = (0..23).collect();
        for k in 1..=30 {
            let parts = partition(&items, k).unwrap();
            assert_eq!(parts.len(), k);
            assert_eq!(parts.concat(), items, "k = {k}");
            let max = parts.iter().map(|p| p.len()).max().unwrap();
            let min = parts.iter().map(|p| p.len()).min().unwrap();
            assert!(max - min <= 1);
        }
    }

    #[test]
    fn extra_items_go_first() {
        let items = [1, 2, 3, 4, 5];
        let parts = partition(&items, 3).unwrap();
        assert_eq!(parts, vec![&[1, 2][..], &[3, 4][..], &[5][..]]);
    }

    #[test]
    fn zero_batches_is_rejected() {
        assert!(partition(&[1, 2], 0).is_err());
        assert!(chunk(&[1, 2], 0).is_err());
    }

    #[test]
    fn chunks_by_size() {
        let items = [1, 2, 3, 4, 5];
        let parts = chunk(&items, 2).unwrap();
        assert_eq!(parts, vec![&[1, 2][..], &[3, 4][..], &[5][..]]);
    }

    #[test]
    fn writes_batch_files_with_ids() {
        let tmp = std::env::temp_dir().join("rent_gap_batch_write_test");
        let _ = fs::remove_dir_all(&tmp);

        let tasks = TaskList::from_keys(
            ["X", "Y", "Z"].into_iter().map(|c| CityKey::new("A", c)),
        );
        let paths = write_batches(&tasks, 2, &tmp).unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(fs::read_to_string(&paths[0]).unwrap(), "0,A,X\n1,A,Y\n");
        assert_eq!(fs::read_to_string(&paths[1]).unwrap(), "2,A,Z\n");

        let _ = fs::remove_dir_all(&tmp);
    }
}
