#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Core types shared by the rent-gap estimation crates.
//!
//! A [`CityUnit`] is the atomic unit of work for both computation and
//! reconciliation. Everything else in this crate is either an intermediate
//! value produced while estimating one city ([`RentModel`],
//! [`BoundaryEstimate`]) or a persisted outcome ([`ResultRecord`]).

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Suffix of every per-city parcel observation file.
pub const PARCEL_FILE_SUFFIX: &str = "_hp.csv";

/// Identity of a city: a `(province, city)` pair.
///
/// Both parts are trimmed on construction so that keys read from
/// hand-edited CSV files compare equal to generated ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CityKey {
    /// Province name as it appears in file names (e.g. `"Henan"`).
    pub province: String,
    /// City name as it appears in file names (e.g. `"Anyang"`).
    pub city: String,
}

impl CityKey {
    #[must_use]
    pub fn new(province: &str, city: &str) -> Self {
        Self {
            province: province.trim().to_string(),
            city: city.trim().to_string(),
        }
    }

    /// Parses a `{province}-{city}` string, splitting at the first `-`.
    #[must_use]
    pub fn parse(joined: &str) -> Option<Self> {
        let (province, city) = joined.split_once('-')?;
        if province.trim().is_empty() || city.trim().is_empty() {
            return None;
        }
        Some(Self::new(province, city))
    }

    /// Parses the key out of a parcel file name such as `Henan-Anyang_hp.csv`.
    #[must_use]
    pub fn from_parcel_file_name(file_name: &str) -> Option<Self> {
        file_name
            .strip_suffix(PARCEL_FILE_SUFFIX)
            .and_then(Self::parse)
    }

    /// The `{province}-{city}` form used by file names and the rural rent table.
    #[must_use]
    pub fn joined(&self) -> String {
        format!("{}-{}", self.province, self.city)
    }

    /// Name of the parcel observation file for this city.
    #[must_use]
    pub fn parcel_file_name(&self) -> String {
        format!("{}{PARCEL_FILE_SUFFIX}", self.joined())
    }
}

impl fmt::Display for CityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.province, self.city)
    }
}

/// Stable task identifier assigned when the task universe is generated.
///
/// Carried through batch files and worker log names so that regenerating
/// the universe can never shift a log onto the wrong city.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(pub u32);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One city task: a stable identifier plus the city it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CityUnit {
    #[serde(rename = "task_id")]
    pub id: TaskId,
    #[serde(rename = "prov")]
    pub province: String,
    pub city: String,
}

impl CityUnit {
    #[must_use]
    pub fn new(id: TaskId, key: &CityKey) -> Self {
        Self {
            id,
            province: key.province.clone(),
            city: key.city.clone(),
        }
    }

    #[must_use]
    pub fn key(&self) -> CityKey {
        CityKey::new(&self.province, &self.city)
    }
}

/// A WGS84 longitude/latitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

/// One housing record read from a parcel observation file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelObservation {
    /// House price (currency units per square meter).
    pub price: f64,
    pub longitude: f64,
    pub latitude: f64,
    /// County identifier, used for fixed effects when estimating alpha.
    pub county: Option<String>,
    /// Floor-area ratio of the residential compound.
    pub far: Option<f64>,
}

/// A parcel reduced to what the rent regression needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RentSample {
    pub land_price: f64,
    /// Geodesic distance to the city center in kilometers.
    pub distance_km: f64,
}

/// Fitted linear rent curve `land_price = intercept + slope * distance_km`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RentModel {
    /// β0: modeled land price at the center.
    pub intercept: f64,
    /// β1: change in land price per kilometer. Expected negative.
    pub slope: f64,
    /// Parcel with the highest land price.
    pub center: LonLat,
    /// Share of house price attributed to land rent.
    pub alpha: f64,
    /// Number of parcels the model was fit on.
    pub observations: usize,
}

impl RentModel {
    /// Modeled land price at `distance_km` from the center.
    #[must_use]
    pub fn rent_at(&self, distance_km: f64) -> f64 {
        self.slope.mul_add(distance_km, self.intercept)
    }
}

/// Theoretical urban/rural boundary radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundaryEstimate {
    /// Radius in kilometers. Always strictly positive.
    pub radius_km: f64,
    /// Rural land price the rent curve was solved against.
    pub rural_rent: f64,
}

/// Triangular deadweight loss for one city.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WelfareResult {
    pub loss: f64,
    /// Loss as a fraction of total modeled rent inside the boundary.
    pub loss_ratio: f64,
}

impl WelfareResult {
    #[must_use]
    pub fn loss_ratio_percent(&self) -> f64 {
        self.loss_ratio * 100.0
    }

    /// Whether either term is exactly zero.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn has_zero_term(&self) -> bool {
        self.loss == 0.0 || self.loss_ratio == 0.0
    }
}

/// One row of the append-only result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(rename = "prov")]
    pub province: String,
    pub city: String,
    pub loss: f64,
    /// Loss ratio expressed as a percentage.
    pub loss_ratio: f64,
}

impl ResultRecord {
    #[must_use]
    pub fn new(key: &CityKey, result: &WelfareResult) -> Self {
        Self {
            province: key.province.clone(),
            city: key.city.clone(),
            loss: result.loss,
            loss_ratio: result.loss_ratio_percent(),
        }
    }

    #[must_use]
    pub fn key(&self) -> CityKey {
        CityKey::new(&self.province, &self.city)
    }
}

/// Why a city unit did not produce a result.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Parcel file missing, unreadable, or lacking required columns.
    DataError,
    /// No usable observations left after cleaning.
    InsufficientDataError,
    /// Fitted rent curve has a zero distance slope.
    DegenerateModelError,
    /// Rent curve never reaches rural rent at a positive radius.
    NoBoundaryError,
    /// No rural rent reference for the city or its province.
    NoRuralRentError,
    /// No built-up boundary file matched the city.
    GeometryNotFoundError,
    /// A boundary file matched but could not be used.
    GeometryError,
    /// Reconciliation found no worker log for the unit.
    NoLogFound,
}

/// Terminal state of one pipeline run for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitOutcome {
    /// A welfare estimate was computed and appended to the result store.
    Computed(WelfareResult),
    /// A zero-valued estimate that the run was configured not to persist.
    ZeroLoss(WelfareResult),
    /// The unit failed; nothing was written to the result store.
    Failed {
        kind: FailureKind,
        message: String,
    },
}

impl UnitOutcome {
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        matches!(self, Self::Computed(_))
    }
}
