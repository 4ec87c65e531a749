#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Welfare loss estimation for one city unit, and lanes of them.
//!
//! [`CityPipeline::run`] sequences rent curve estimation, boundary
//! resolution, boundary gap measurement and the welfare loss triangle for a
//! single city. Every stage is logged to the unit's worker log. A failure at
//! any stage stops the unit with a typed [`FailureKind`] and nothing is
//! written to the result store; a success appends exactly one record.

pub mod config;
pub mod progress;
pub mod runner;
pub mod unit_log;

use std::path::Path;

use rent_gap_boundary::{BoundaryError, BoundaryGapEvaluator, RuralRentTable, resolve_boundary};
use rent_gap_ledger::{LedgerError, ResultStore};
use rent_gap_models::{CityKey, CityUnit, FailureKind, ResultRecord, UnitOutcome, WelfareResult};
use rent_gap_rent_curve::RentCurveError;
use thiserror::Error;

pub use config::PipelineConfig;
pub use runner::{BatchRunner, LaneSummary};
pub use unit_log::UnitLog;

/// Errors that stop a run outright, as opposed to per-unit failures which
/// are reported through [`UnitOutcome::Failed`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed config file.
    #[error("Invalid config {path}: {message}")]
    Config {
        /// File being parsed.
        path: String,
        /// TOML parse error.
        message: String,
    },

    /// I/O error on a log or marker file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The rural rent table could not be loaded.
    #[error("Rural rent table error: {0}")]
    Boundary(#[from] BoundaryError),

    /// Task list, result store or marker error.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A blocking unit task panicked or was cancelled.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// A stage failure, carried up to the unit's outcome.
#[derive(Debug)]
struct StageFailure {
    kind: FailureKind,
    message: String,
}

impl From<RentCurveError> for StageFailure {
    fn from(e: RentCurveError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<BoundaryError> for StageFailure {
    fn from(e: BoundaryError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Runs the welfare loss computation for city units.
///
/// Holds only read-only inputs, so one pipeline can be shared across lanes
/// and worker threads.
#[derive(Debug, Clone)]
pub struct CityPipeline {
    config: PipelineConfig,
    rural: RuralRentTable,
    evaluator: BoundaryGapEvaluator,
    store: ResultStore,
}

impl CityPipeline {
    /// Builds a pipeline, loading the rural rent table named by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rural rent table cannot be read.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let rural = RuralRentTable::load(&config.rural_rent_path)?;
        Ok(Self::with_rural_rents(config, rural))
    }

    #[must_use]
    pub fn with_rural_rents(config: PipelineConfig, rural: RuralRentTable) -> Self {
        let evaluator = BoundaryGapEvaluator::new(config.sampler());
        let store = config.store();
        Self {
            config,
            rural,
            evaluator,
            store,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Runs one unit end to end, writing its worker log and, on success,
    /// its result record.
    ///
    /// # Errors
    ///
    /// Returns an error only if the worker log or result store cannot be
    /// written. Computation failures are returned as
    /// [`UnitOutcome::Failed`].
    pub fn run(&self, unit: &CityUnit) -> Result<UnitOutcome, PipelineError> {
        let key = unit.key();
        let mut unit_log = UnitLog::create(&self.config.log_dir, unit.id)?;
        unit_log.line(&format!("Processing {key} (task {})", unit.id))?;

        let outcome = match self.compute(&key, &mut unit_log)? {
            Ok(result) if !self.config.persist_zero_loss && result.has_zero_term() => {
                unit_log.line(&format!("Zero welfare loss for {key}, not recorded"))?;
                UnitOutcome::ZeroLoss(result)
            }
            Ok(result) => {
                self.store.append(&ResultRecord::new(&key, &result))?;
                unit_log.line(&format!("Recorded result for {key}"))?;
                UnitOutcome::Computed(result)
            }
            Err(failure) => {
                log::warn!("{key} failed with {}", failure.kind);
                unit_log.line(&failure.message)?;
                UnitOutcome::Failed {
                    kind: failure.kind,
                    message: failure.message,
                }
            }
        };
        Ok(outcome)
    }

    /// The stages proper. The outer `Result` is for log write errors, the
    /// inner one for the unit's own failure.
    fn compute(
        &self,
        key: &CityKey,
        unit_log: &mut UnitLog,
    ) -> Result<Result<WelfareResult, StageFailure>, PipelineError> {
        let parcel_path = self.config.parcel_path(key);
        let curve = match rent_gap_rent_curve::estimate_from_file(&parcel_path, &self.config.alpha)
        {
            Ok(curve) => curve,
            Err(e) => return Ok(Err(e.into())),
        };
        let model = curve.model;
        unit_log.line(&format!(
            "Rent curve: land_price = {:.6} + {:.6} * dist_km ({} parcels, alpha = {:.4})",
            model.intercept, model.slope, model.observations, model.alpha
        ))?;

        let boundary = match resolve_boundary(&model, key, &self.rural) {
            Ok(boundary) => boundary,
            Err(e) => return Ok(Err(e.into())),
        };
        unit_log.line(&format!(
            "Boundary edge: {:.6} km (rural land price {:.4})",
            boundary.radius_km, boundary.rural_rent
        ))?;

        let gap_km = match self.evaluator.evaluate(
            &self.config.geometry_root,
            key,
            model.center,
            boundary.radius_km,
        ) {
            Ok(gap_km) => gap_km,
            Err(e) => return Ok(Err(e.into())),
        };
        unit_log.line(&format!("Mean inward gap: {gap_km:.6} km"))?;

        let result = rent_gap_welfare::welfare_loss(&model, boundary.radius_km, gap_km);
        unit_log.line(&format!(
            "Welfare loss: {:.6} ({:.4}% of total rent)",
            result.loss,
            result.loss_ratio_percent()
        ))?;

        Ok(Ok(result))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::fs;
    use std::path::Path;

    use rent_gap_boundary::RuralRentTable;

    use crate::PipelineConfig;

    /// Writes a small but complete data set under `root`: parcels for
    /// `Henan-Anyang` and `Henan-Hebi`, a rural rent table, and a boundary
    /// file for Anyang only.
    pub fn write_city_data(root: &Path) -> PipelineConfig {
        let parcel_dir = root.join("parcels");
        let geometry_dir = root.join("geometry").join("Henan");
        fs::create_dir_all(&parcel_dir).unwrap();
        fs::create_dir_all(&geometry_dir).unwrap();

        // Prices fall with distance east of the center.
        let parcels = "price,lng,lat\n\
                       100,113.00,36.0\n\
                       85,113.01,36.0\n\
                       70,113.02,36.0\n\
                       55,113.03,36.0\n\
                       40,113.04,36.0\n";
        fs::write(parcel_dir.join("Henan-Anyang_hp.csv"), parcels).unwrap();
        fs::write(parcel_dir.join("Henan-Hebi_hp.csv"), parcels).unwrap();

        fs::write(
            root.join("rural.csv"),
            "prov_city,prov,land_price\nHenan-Anyang,Henan,4.0\nHenan-Hebi,Henan,4.0\n",
        )
        .unwrap();

        let square = r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{},
            "geometry":{"type":"Polygon","coordinates":[[[112.995,35.995],[113.005,35.995],
            [113.005,36.005],[112.995,36.005],[112.995,35.995]]]}}]}"#;
        fs::write(geometry_dir.join("Anyang2020_urban.geojson"), square).unwrap();

        PipelineConfig {
            parcel_dir,
            geometry_root: root.join("geometry"),
            rural_rent_path: root.join("rural.csv"),
            result_store: root.join("results").join("welfare_results.csv"),
            log_dir: root.join("logs"),
            jobs: 2,
            ..PipelineConfig::default()
        }
    }

    pub fn rural_rents(config: &PipelineConfig) -> RuralRentTable {
        RuralRentTable::load(&config.rural_rent_path).unwrap()
    }
}
