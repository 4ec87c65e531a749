//! Parcel observation file reader.
//!
//! Parcel files are CSVs exported from the housing listings scrape. Column
//! names are matched against a short alias list so that both the original
//! Chinese headers and English re-exports are accepted.

use std::io::Read;
use std::path::Path;

use rent_gap_models::ParcelObservation;

use crate::RentCurveError;

const PRICE: &[&str] = &["价格", "price"];
const LONGITUDE: &[&str] = &["lng84", "lng"];
const LATITUDE: &[&str] = &["lat84", "lat"];
const COUNTY: &[&str] = &["区县", "county"];
const FAR: &[&str] = &["容积率", "far"];

/// Column positions resolved from a header row.
struct ColumnIndex {
    price: usize,
    longitude: usize,
    latitude: usize,
    county: Option<usize>,
    far: Option<usize>,
}

impl ColumnIndex {
    fn resolve(headers: &csv::StringRecord, source: &str) -> Result<Self, RentCurveError> {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |aliases: &[&str]| {
            aliases
                .iter()
                .find_map(|alias| names.iter().position(|n| n == alias))
        };

        let price = find(PRICE);
        let longitude = find(LONGITUDE);
        let latitude = find(LATITUDE);

        let mut missing = Vec::new();
        if price.is_none() {
            missing.push(PRICE[0]);
        }
        if longitude.is_none() {
            missing.push(LONGITUDE[0]);
        }
        if latitude.is_none() {
            missing.push(LATITUDE[0]);
        }

        match (price, longitude, latitude) {
            (Some(price), Some(longitude), Some(latitude)) => Ok(Self {
                price,
                longitude,
                latitude,
                county: find(COUNTY),
                far: find(FAR),
            }),
            _ => Err(RentCurveError::MissingColumns {
                source_name: source.to_string(),
                columns: missing.join(", "),
            }),
        }
    }
}

/// Loads all usable parcel observations from a parcel file.
///
/// # Errors
///
/// Returns [`RentCurveError::MissingFile`] if `path` does not exist,
/// [`RentCurveError::MissingColumns`] if the header lacks a price or
/// coordinate column, or a CSV/IO error if the file cannot be read.
pub fn load_parcels(path: &Path) -> Result<Vec<ParcelObservation>, RentCurveError> {
    if !path.is_file() {
        return Err(RentCurveError::MissingFile {
            path: path.display().to_string(),
        });
    }
    let file = std::fs::File::open(path)?;
    let source = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    read_parcels(file, &source)
}

/// Parses parcel observations from any CSV reader.
///
/// Rows with a missing or non-finite price, longitude, or latitude are
/// dropped. Optional columns that fail to parse become `None`.
///
/// # Errors
///
/// Returns [`RentCurveError::MissingColumns`] if required columns are absent,
/// or [`RentCurveError::Csv`] on malformed CSV.
pub fn read_parcels<R: Read>(
    reader: R,
    source: &str,
) -> Result<Vec<ParcelObservation>, RentCurveError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let columns = ColumnIndex::resolve(reader.headers()?, source)?;

    let mut parcels = Vec::new();
    let mut dropped = 0_usize;

    for record in reader.records() {
        let record = record?;
        let cell = |idx: usize| record.get(idx).unwrap_or("");

        let (Some(price), Some(longitude), Some(latitude)) = (
            parse_number(cell(columns.price)),
            parse_number(cell(columns.longitude)),
            parse_number(cell(columns.latitude)),
        ) else {
            dropped += 1;
            continue;
        };

        let county = columns
            .county
            .map(|idx| cell(idx).trim())
            .filter(|c| !c.is_empty())
            .map(ToString::to_string);
        let far = columns.far.and_then(|idx| parse_number(cell(idx)));

        parcels.push(ParcelObservation {
            price,
            longitude,
            latitude,
            county,
            far,
        });
    }

    if dropped > 0 {
        log::debug!("{source}: dropped {dropped} rows with missing price or coordinates");
    }

    Ok(parcels)
}

fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
