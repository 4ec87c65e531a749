//! Worker lane start/end markers and total wall time.
//!
//! Each lane drops a `start_time_{lane}` file before its first unit and an
//! `end_time_{lane}` file after its last one. A lane with a start marker but
//! no end marker never finished.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};

use crate::LedgerError;

/// Timestamp format of marker file contents.
pub const MARKER_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const START_PREFIX: &str = "start_time_";
const END_PREFIX: &str = "end_time_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Start,
    End,
}

impl Marker {
    const fn prefix(self) -> &'static str {
        match self {
            Self::Start => START_PREFIX,
            Self::End => END_PREFIX,
        }
    }
}

#[must_use]
pub fn marker_path(dir: &Path, marker: Marker, lane: &str) -> PathBuf {
    dir.join(format!("{}{lane}", marker.prefix()))
}

/// Writes a lane marker holding `at` in [`MARKER_FORMAT`].
///
/// # Errors
///
/// Returns an error if the marker cannot be written.
pub fn write_marker(
    dir: &Path,
    marker: Marker,
    lane: &str,
    at: DateTime<Utc>,
) -> Result<PathBuf, LedgerError> {
    std::fs::create_dir_all(dir).map_err(|e| LedgerError::io(dir, e))?;
    let path = marker_path(dir, marker, lane);
    std::fs::write(&path, at.format(MARKER_FORMAT).to_string())
        .map_err(|e| LedgerError::io(&path, e))?;
    Ok(path)
}

/// Span of a distributed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallTime {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Lanes that wrote a start marker.
    pub started_lanes: usize,
    /// Lanes that wrote an end marker.
    pub finished_lanes: usize,
}

impl WallTime {
    #[must_use]
    pub fn elapsed(&self) -> TimeDelta {
        self.end - self.start
    }
}

fn parse_marker(contents: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(contents.trim(), MARKER_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Earliest start to latest end over all lane markers in `dir`.
///
/// Unparseable markers are skipped with a warning. Returns `None` when
/// there is no valid start or no valid end marker.
///
/// # Errors
///
/// Returns an error if the directory or a marker cannot be read.
pub fn wall_time(dir: &Path) -> Result<Option<WallTime>, LedgerError> {
    let mut starts = Vec::new();
    let mut ends = Vec::new();

    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| LedgerError::io(dir, e))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let bucket = if name.starts_with(START_PREFIX) {
            &mut starts
        } else if name.starts_with(END_PREFIX) {
            &mut ends
        } else {
            continue;
        };

        let contents = std::fs::read_to_string(&path).map_err(|e| LedgerError::io(&path, e))?;
        match parse_marker(&contents) {
            Some(at) => bucket.push(at),
            None => log::warn!("Failed to parse time in {name}: {}", contents.trim()),
        }
    }

    let (Some(&start), Some(&end)) = (starts.iter().min(), ends.iter().max()) else {
        return Ok(None);
    };

    Ok(Some(WallTime {
        start,
        end,
        started_lanes: starts.len(),
        finished_lanes: ends.len(),
    }))
}
