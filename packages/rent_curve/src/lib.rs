#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Urban land rent curve estimation.
//!
//! Turns a city's house price observations into a linear rent curve:
//! land price is imputed as `alpha * price`, the parcel with the highest
//! land price is taken as the city center, and land price is regressed on
//! geodesic distance to that center.

pub mod alpha;
pub mod parcels;

use std::path::Path;

use geo::{Distance, Geodesic, Point};
use rent_gap_models::{FailureKind, LonLat, ParcelObservation, RentModel, RentSample};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rent share applied when no estimate is requested or possible.
pub const DEFAULT_ALPHA: f64 = 0.3;

/// Errors that can occur while estimating a rent curve.
#[derive(Debug, Error)]
pub enum RentCurveError {
    /// The parcel file does not exist.
    #[error("File not found: {path}")]
    MissingFile {
        /// Path that was looked up.
        path: String,
    },

    /// The parcel file lacks required columns.
    #[error("Missing required columns in: {source_name} ({columns})")]
    MissingColumns {
        /// File name the header was read from.
        source_name: String,
        /// Comma-separated canonical names of the missing columns.
        columns: String,
    },

    /// Not enough usable observations to fit a curve.
    #[error("Insufficient data: {message}")]
    Insufficient {
        /// What was missing.
        message: String,
    },

    /// I/O error reading the parcel file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl RentCurveError {
    /// Maps this error onto the failure taxonomy recorded for a city unit.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Insufficient { .. } => FailureKind::InsufficientDataError,
            Self::MissingFile { .. } | Self::MissingColumns { .. } | Self::Io(_) | Self::Csv(_) => {
                FailureKind::DataError
            }
        }
    }
}

/// How the rent share of house prices is chosen for a city.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AlphaPolicy {
    /// Use the same share for every city.
    Fixed {
        /// Share of price attributed to land.
        #[serde(default = "default_alpha")]
        value: f64,
    },
    /// Estimate from a FAR regression with county fixed effects.
    Estimate {
        /// Floor applied to the estimate.
        #[serde(default = "default_min_alpha")]
        min_alpha: f64,
        /// Share used when the regression cannot be run.
        #[serde(default = "default_alpha")]
        fallback: f64,
    },
}

const fn default_min_alpha() -> f64 {
    alpha::MIN_ALPHA
}

const fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

impl Default for AlphaPolicy {
    fn default() -> Self {
        Self::Fixed {
            value: DEFAULT_ALPHA,
        }
    }
}

impl AlphaPolicy {
    /// Picks the rent share for one city's parcels.
    #[must_use]
    pub fn resolve(&self, parcels: &[ParcelObservation]) -> f64 {
        match *self {
            Self::Fixed { value } => value,
            Self::Estimate {
                min_alpha,
                fallback,
            } => alpha::estimate_alpha(parcels, min_alpha).unwrap_or_else(|| {
                log::info!("Alpha regression not identifiable, using fallback {fallback}");
                fallback
            }),
        }
    }
}

/// A fitted rent curve and the samples it was fit on.
#[derive(Debug, Clone)]
pub struct RentCurve {
    pub model: RentModel,
    pub samples: Vec<RentSample>,
}

/// Reads a parcel file and fits its rent curve.
///
/// # Errors
///
/// Returns [`RentCurveError`] if the file is missing or malformed, or if the
/// observations cannot support a regression.
pub fn estimate_from_file(path: &Path, policy: &AlphaPolicy) -> Result<RentCurve, RentCurveError> {
    let parcels = parcels::load_parcels(path)?;
    let alpha = policy.resolve(&parcels);
    estimate(&parcels, alpha)
}

/// Fits `land_price = b0 + b1 * distance_km` for one city.
///
/// # Errors
///
/// Returns [`RentCurveError::Insufficient`] if `parcels` is empty or all
/// parcels sit at the same distance from the center.
pub fn estimate(parcels: &[ParcelObservation], alpha: f64) -> Result<RentCurve, RentCurveError> {
    let center = parcels
        .iter()
        .enumerate()
        .fold(None::<(usize, f64)>, |best, (idx, parcel)| {
            let land_price = alpha * parcel.price;
            match best {
                Some((_, top)) if top >= land_price => best,
                _ => Some((idx, land_price)),
            }
        })
        .map(|(idx, _)| &parcels[idx])
        .ok_or_else(|| RentCurveError::Insufficient {
            message: "no parcels with price and coordinates".to_string(),
        })?;

    let center_point = Point::new(center.longitude, center.latitude);

    let samples: Vec<RentSample> = parcels
        .iter()
        .map(|parcel| RentSample {
            land_price: alpha * parcel.price,
            distance_km: Geodesic.distance(center_point, Point::new(parcel.longitude, parcel.latitude))
                / 1000.0,
        })
        .filter(|s| s.land_price.is_finite() && s.distance_km.is_finite())
        .collect();

    let (intercept, slope) = ols(&samples).ok_or_else(|| RentCurveError::Insufficient {
        message: format!(
            "{} parcels do not span more than one distance from the center",
            samples.len()
        ),
    })?;

    log::debug!(
        "Fitted rent curve on {} parcels: land_price = {intercept:.4} + {slope:.4} * dist",
        samples.len()
    );

    Ok(RentCurve {
        model: RentModel {
            intercept,
            slope,
            center: LonLat {
                lon: center.longitude,
                lat: center.latitude,
            },
            alpha,
            observations: samples.len(),
        },
        samples,
    })
}

/// Ordinary least squares of land price on distance, with intercept.
///
/// Returns `None` with fewer than two samples or no variation in distance.
fn ols(samples: &[RentSample]) -> Option<(f64, f64)> {
    if samples.len() < 2 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = samples.len() as f64;
    let mean_x = samples.iter().map(|s| s.distance_km).sum::<f64>() / n;
    let mean_y = samples.iter().map(|s| s.land_price).sum::<f64>() / n;

    let (sxy, sxx) = samples.iter().fold((0.0, 0.0), |(sxy, sxx), s| {
        let dx = s.distance_km - mean_x;
        (dx.mul_add(s.land_price - mean_y, sxy), dx.mul_add(dx, sxx))
    });

    if sxx <= f64::EPSILON {
        return None;
    }

    let slope = sxy / sxx;
    Some((slope.mul_add(-mean_x, mean_y), slope))
}
