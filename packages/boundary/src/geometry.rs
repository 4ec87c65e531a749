//! Built-up area boundary file lookup and loading.
//!
//! Boundary files live in one directory per province and are named after
//! the city they cover, though not consistently (`Anyang2020_new_Urb.geojson`,
//! `henan_misc.geojson`, ...). Matching is therefore heuristic and runs
//! through [`GeometryStrategy::ALL`] in order.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use geo::{MultiPolygon, Polygon, Validation as _};
use geojson::GeoJson;
use regex::Regex;
use rent_gap_models::CityKey;

use crate::{BoundaryError, Resolution};

const BOUNDARY_EXTENSIONS: &[&str] = &["geojson", "json"];

static ALPHA_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z]+)").unwrap_or_else(|_| unreachable!()));

/// Ways of matching a boundary file to a city.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryStrategy {
    /// Exactly one file name contains the city name.
    SingleNameMatch,
    /// Among files containing the city name, one whose leading letters are
    /// exactly the city name.
    PrefixMatch,
    /// Any file whose name contains the province name.
    ProvinceName,
}

impl GeometryStrategy {
    pub const ALL: &[Self] = &[Self::SingleNameMatch, Self::PrefixMatch, Self::ProvinceName];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SingleNameMatch => "single name match",
            Self::PrefixMatch => "prefix match among candidates",
            Self::ProvinceName => "province name fallback",
        }
    }

    /// Attempts this strategy over the (sorted) file names of a province
    /// directory.
    #[must_use]
    pub fn attempt<'a>(self, file_names: &'a [String], key: &CityKey) -> Resolution<&'a str> {
        let city = key.city.to_lowercase();
        let names_city = |f: &&String| f.to_lowercase().contains(city.as_str());

        match self {
            Self::SingleNameMatch => {
                let mut matches = file_names.iter().filter(names_city);
                match (matches.next(), matches.next()) {
                    (Some(only), None) => Resolution::Resolved(only.as_str()),
                    _ => Resolution::Unresolved,
                }
            }
            Self::PrefixMatch => file_names
                .iter()
                .filter(names_city)
                .find(|f| alpha_prefix(f) == city)
                .map(String::as_str)
                .into(),
            Self::ProvinceName => {
                let province = key.province.to_lowercase();
                file_names
                    .iter()
                    .find(|f| f.to_lowercase().contains(&province))
                    .map(String::as_str)
                    .into()
            }
        }
    }
}

/// A boundary file chosen for a city.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryFile {
    pub path: PathBuf,
    pub strategy: GeometryStrategy,
}

/// Leading run of ASCII letters in a lowercased file stem, e.g.
/// `"Anyang2020_new_Urb.geojson"` -> `"anyang"`. Falls back to the whole
/// stem when it does not start with a letter.
#[must_use]
pub fn alpha_prefix(file_name: &str) -> String {
    let lower = file_name.to_lowercase();
    let stem = Path::new(&lower)
        .file_stem()
        .map_or_else(|| lower.clone(), |s| s.to_string_lossy().into_owned());
    ALPHA_PREFIX
        .captures(&stem)
        .and_then(|c| c.get(1))
        .map_or(stem.clone(), |m| m.as_str().to_string())
}

/// Boundary file names in `dir`, sorted so lookups are deterministic.
fn boundary_file_names(dir: &Path) -> Result<Vec<String>, std::io::Error> {
    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| {
            Path::new(name)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| BOUNDARY_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        })
        .collect();
    names.sort();
    Ok(names)
}

/// Finds the boundary file for `key` under `{root}/{province}/`.
///
/// # Errors
///
/// Returns [`BoundaryError::GeometryNotFound`] if the province directory is
/// missing or no strategy matches, or an I/O error if the directory cannot
/// be listed.
pub fn find_boundary_file(root: &Path, key: &CityKey) -> Result<BoundaryFile, BoundaryError> {
    let province_dir = root.join(&key.province);
    if !province_dir.is_dir() {
        log::warn!("Province folder does not exist: {}", province_dir.display());
        log::warn!("No matching file found for {key}.");
        return Err(BoundaryError::GeometryNotFound { key: key.clone() });
    }

    let names = boundary_file_names(&province_dir)?;

    for &strategy in GeometryStrategy::ALL {
        if let Resolution::Resolved(name) = strategy.attempt(&names, key) {
            log::info!("{key}: boundary file {name} via {}", strategy.label());
            return Ok(BoundaryFile {
                path: province_dir.join(name),
                strategy,
            });
        }
    }

    log::warn!("No matching file found for {key}.");
    Err(BoundaryError::GeometryNotFound { key: key.clone() })
}

/// Loads every valid polygon in a `GeoJSON` file (feature collection,
/// feature, or bare geometry) as a lon/lat [`MultiPolygon`]. Non-areal
/// geometries are ignored and invalid polygons (self-intersecting rings and
/// the like) are dropped.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or contains no
/// valid polygons.
pub fn load_boundary(path: &Path) -> Result<MultiPolygon<f64>, BoundaryError> {
    let text = std::fs::read_to_string(path)?;
    let geojson: GeoJson = text.parse()?;

    let mut polygons = Vec::new();
    match geojson {
        GeoJson::FeatureCollection(collection) => {
            for feature in collection.features {
                if let Some(geometry) = feature.geometry {
                    collect_polygons(geometry.try_into()?, &mut polygons);
                }
            }
        }
        GeoJson::Feature(feature) => {
            if let Some(geometry) = feature.geometry {
                collect_polygons(geometry.try_into()?, &mut polygons);
            }
        }
        GeoJson::Geometry(geometry) => collect_polygons(geometry.try_into()?, &mut polygons),
    }

    if polygons.is_empty() {
        return Err(BoundaryError::Geometry {
            path: path.display().to_string(),
            message: "no polygon features".to_string(),
        });
    }

    let total = polygons.len();
    polygons.retain(|p| p.is_valid());
    if polygons.len() < total {
        log::warn!(
            "Dropped {} of {total} invalid polygons in {}",
            total - polygons.len(),
            path.display()
        );
    }
    if polygons.is_empty() {
        return Err(BoundaryError::Geometry {
            path: path.display().to_string(),
            message: "no valid polygon features".to_string(),
        });
    }

    log::debug!("Loaded {} polygons from {}", polygons.len(), path.display());
    Ok(MultiPolygon(polygons))
}

fn collect_polygons(geometry: geo::Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        geo::Geometry::Polygon(p) => out.push(p),
        geo::Geometry::MultiPolygon(mp) => out.extend(mp.0),
        geo::Geometry::GeometryCollection(gc) => {
            for g in gc.0 {
                collect_polygons(g, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn extracts_alpha_prefix() {
        assert_eq!(alpha_prefix("Anyang2020_new_Urb.geojson"), "anyang");
        assert_eq!(alpha_prefix("2020_anyang.geojson"), "2020_anyang");
    }

    #[test]
    fn single_candidate_resolves() {
        let files = names(&["Anyang2020.geojson", "Hebi2020.geojson"]);
        let key = CityKey::new("Henan", "Anyang");
        assert_eq!(
            GeometryStrategy::SingleNameMatch.attempt(&files, &key),
            Resolution::Resolved("Anyang2020.geojson")
        );
    }

    #[test]
    fn multiple_candidates_need_prefix() {
        let files = names(&["NewAnyang.geojson", "Anyang2020.geojson"]);
        let key = CityKey::new("Henan", "Anyang");
        assert_eq!(
            GeometryStrategy::SingleNameMatch.attempt(&files, &key),
            Resolution::Unresolved
        );
        assert_eq!(
            GeometryStrategy::PrefixMatch.attempt(&files, &key),
            Resolution::Resolved("Anyang2020.geojson")
        );
    }

    #[test]
    fn province_fallback() {
        let files = names(&["henan_misc.geojson"]);
        let key = CityKey::new("Henan", "Hebi");
        assert_eq!(
            GeometryStrategy::ProvinceName.attempt(&files, &key),
            Resolution::Resolved("henan_misc.geojson")
        );
    }

    #[test]
    fn finds_and_loads_file_on_disk() {
        let tmp = std::env::temp_dir().join("rent_gap_geometry_lookup_test");
        let _ = fs::remove_dir_all(&tmp);
        let dir = tmp.join("Henan");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("Anyang2020_new_Urb.geojson"),
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{},"geometry":{"type":"Polygon",
                 "coordinates":[[[114.3,36.0],[114.4,36.0],[114.4,36.1],[114.3,36.1],[114.3,36.0]]]}},
                {"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[114.3,36.0]}}
            ]}"#,
        )
        .unwrap();
        fs::write(dir.join("notes.txt"), "Anyang").unwrap();

        let key = CityKey::new("Henan", "Anyang");
        let found = find_boundary_file(&tmp, &key).unwrap();
        assert_eq!(found.strategy, GeometryStrategy::SingleNameMatch);

        let footprint = load_boundary(&found.path).unwrap();
        assert_eq!(footprint.0.len(), 1);

        let missing = find_boundary_file(&tmp, &CityKey::new("Henan", "Hebi")).unwrap_err();
        assert_eq!(missing.to_string(), "No matching file found for Henan-Hebi.");

        let no_province = find_boundary_file(&tmp, &CityKey::new("Hubei", "Wuhan")).unwrap_err();
        assert!(matches!(no_province, BoundaryError::GeometryNotFound { .. }));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn drops_invalid_polygons() {
        let tmp = std::env::temp_dir().join("rent_gap_geometry_invalid_test");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let bowtie = r#"{"type":"Feature","properties":{},"geometry":{"type":"Polygon",
            "coordinates":[[[0.0,0.0],[1.0,1.0],[1.0,0.0],[0.0,1.0],[0.0,0.0]]]}}"#;
        let square = r#"{"type":"Feature","properties":{},"geometry":{"type":"Polygon",
            "coordinates":[[[5.0,5.0],[6.0,5.0],[6.0,6.0],[5.0,6.0],[5.0,5.0]]]}}"#;

        let mixed = tmp.join("mixed.geojson");
        fs::write(
            &mixed,
            format!(r#"{{"type":"FeatureCollection","features":[{bowtie},{square}]}}"#),
        )
        .unwrap();
        let footprint = load_boundary(&mixed).unwrap();
        assert_eq!(footprint.0.len(), 1);
        assert_eq!(footprint.0[0].exterior().0[0], geo::coord! { x: 5.0, y: 5.0 });

        let only_bowtie = tmp.join("bowtie.geojson");
        fs::write(&only_bowtie, bowtie).unwrap();
        let err = load_boundary(&only_bowtie).unwrap_err();
        assert!(matches!(err, BoundaryError::Geometry { .. }));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn file_without_polygons_is_unusable() {
        let tmp = std::env::temp_dir().join("rent_gap_geometry_empty_test");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        let path = tmp.join("points.geojson");
        fs::write(&path, r#"{"type":"Point","coordinates":[1.0,2.0]}"#).unwrap();

        let err = load_boundary(&path).unwrap_err();
        assert!(matches!(err, BoundaryError::Geometry { .. }));

        let _ = fs::remove_dir_all(&tmp);
    }
}
