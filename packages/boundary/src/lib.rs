#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Urban boundary inference.
//!
//! Solves a fitted rent curve for the radius at which urban rent falls to
//! rural rent, locates the city's built-up area polygons, and measures how
//! far inside that radius the actual built-up boundary sits.
//!
//! Both lookups (rural rent and boundary file) are expressed as an ordered
//! list of strategies. Each strategy returns a [`Resolution`], and the first
//! [`Resolution::Resolved`] wins and is logged with the strategy's label.

pub mod gap;
pub mod geometry;
pub mod rural;
pub mod sampler;

use rent_gap_models::{CityKey, FailureKind};
use thiserror::Error;

pub use gap::BoundaryGapEvaluator;
pub use rural::{RuralRentTable, resolve_boundary};
pub use sampler::GeometrySampler;

/// Outcome of a single lookup strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    Resolved(T),
    Unresolved,
}

impl<T> Resolution<T> {
    #[must_use]
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Resolved(value) => Some(value),
            Self::Unresolved => None,
        }
    }
}

impl<T> From<Option<T>> for Resolution<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unresolved, Self::Resolved)
    }
}

/// Errors that can occur during boundary inference.
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// No rural rent for the city or any city in its province.
    #[error("No land price data available for {key} or {province}")]
    NoRuralRent {
        /// `{province}-{city}` key that was looked up.
        key: String,
        /// Province used for the fallback.
        province: String,
    },

    /// The rent curve does not fall with distance.
    #[error("Distance coefficient is not negative (slope = {slope})")]
    DegenerateModel { slope: f64 },

    /// The rent curve only reaches rural rent at a non-positive radius.
    #[error("Could not determine urban-rural boundary edge (edge = {edge})")]
    NoBoundary {
        /// The rejected solution in kilometers.
        edge: f64,
    },

    /// No boundary file matched the city.
    #[error("No matching file found for {key}.")]
    GeometryNotFound {
        /// City that was looked up.
        key: CityKey,
    },

    /// A boundary file matched but holds no usable polygons.
    #[error("Unusable boundary file {path}: {message}")]
    Geometry {
        /// File that was read.
        path: String,
        /// What was wrong with it.
        message: String,
    },

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// Malformed rural rent table.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BoundaryError {
    /// Maps this error onto the failure taxonomy recorded for a city unit.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::NoRuralRent { .. } => FailureKind::NoRuralRentError,
            Self::DegenerateModel { .. } => FailureKind::DegenerateModelError,
            Self::NoBoundary { .. } => FailureKind::NoBoundaryError,
            Self::GeometryNotFound { .. } => FailureKind::GeometryNotFoundError,
            Self::Geometry { .. } | Self::GeoJson(_) => FailureKind::GeometryError,
            Self::Csv(_) | Self::Io(_) => FailureKind::DataError,
        }
    }
}
