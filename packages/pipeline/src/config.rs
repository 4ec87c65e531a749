//! Pipeline configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! usable configuration rooted at the working directory:
//!
//! ```toml
//! parcel_dir = "data/parcels"
//! geometry_root = "data/geometry"
//! rural_rent_path = "data/rural_land_price.csv"
//! result_store = "results/welfare_results.csv"
//! log_dir = "logs"
//! sample_count = 300
//! simplify_tolerance_m = 5.0
//! persist_zero_loss = true
//! jobs = 8
//!
//! [alpha]
//! mode = "estimate"
//! min_alpha = 0.3
//! ```

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use rent_gap_boundary::GeometrySampler;
use rent_gap_boundary::sampler::{DEFAULT_SAMPLE_COUNT, DEFAULT_SIMPLIFY_TOLERANCE_M};
use rent_gap_ledger::ResultStore;
use rent_gap_models::CityKey;
use rent_gap_rent_curve::AlphaPolicy;
use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// Environment variable naming the config file when no path is given.
pub const CONFIG_ENV: &str = "RENT_GAP_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory of `{province}-{city}_hp.csv` parcel files.
    pub parcel_dir: PathBuf,
    /// Root of the per-province boundary file directories.
    pub geometry_root: PathBuf,
    /// Rural rent reference table.
    pub rural_rent_path: PathBuf,
    /// Append-only result CSV.
    pub result_store: PathBuf,
    /// Worker logs and lane markers.
    pub log_dir: PathBuf,
    pub alpha: AlphaPolicy,
    /// Boundary sample budget per city.
    pub sample_count: usize,
    pub simplify_tolerance_m: f64,
    /// Record computed zero losses. When off, a zero loss or zero ratio is
    /// reported but not written to the result store.
    pub persist_zero_loss: bool,
    /// Units run concurrently within one lane.
    pub jobs: usize,
}

fn default_jobs() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parcel_dir: PathBuf::from("data/parcels"),
            geometry_root: PathBuf::from("data/geometry"),
            rural_rent_path: PathBuf::from("data/rural_land_price.csv"),
            result_store: PathBuf::from("results/welfare_results.csv"),
            log_dir: PathBuf::from("logs"),
            alpha: AlphaPolicy::default(),
            sample_count: DEFAULT_SAMPLE_COUNT,
            simplify_tolerance_m: DEFAULT_SIMPLIFY_TOLERANCE_M,
            persist_zero_loss: true,
            jobs: default_jobs(),
        }
    }
}

impl PipelineConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the document is malformed.
    pub fn from_toml(toml_str: &str, source: &str) -> Result<Self, PipelineError> {
        toml::de::from_str(toml_str).map_err(|e| PipelineError::Config {
            path: source.to_string(),
            message: e.to_string(),
        })
    }

    /// Reads and parses a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config = Self::from_toml(&text, &path.display().to_string())?;
        log::info!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    /// Loads `path` if given, otherwise the file named by [`CONFIG_ENV`],
    /// otherwise the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a named config file cannot be read or parsed.
    pub fn resolve(path: Option<&Path>) -> Result<Self, PipelineError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(env_path) if !env_path.is_empty() => Self::load(Path::new(&env_path)),
            _ => {
                log::debug!("No config file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    #[must_use]
    pub fn parcel_path(&self, key: &CityKey) -> PathBuf {
        self.parcel_dir.join(key.parcel_file_name())
    }

    #[must_use]
    pub const fn sampler(&self) -> GeometrySampler {
        GeometrySampler::new(self.sample_count, self.simplify_tolerance_m)
    }

    #[must_use]
    pub fn store(&self) -> ResultStore {
        ResultStore::new(&self.result_store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = PipelineConfig::from_toml("", "inline").unwrap();
        assert_eq!(config.sample_count, 300);
        assert!((config.simplify_tolerance_m - 5.0).abs() < f64::EPSILON);
        assert!(config.persist_zero_loss);
        assert!(config.jobs >= 1);
        assert_eq!(config.alpha, AlphaPolicy::Fixed { value: 0.3 });
    }

    #[test]
    fn parses_overrides_and_alpha_mode() {
        let config = PipelineConfig::from_toml(
            r#"
            parcel_dir = "/data/hp"
            persist_zero_loss = false
            jobs = 4

            [alpha]
            mode = "estimate"
            "#,
            "inline",
        )
        .unwrap();
        assert_eq!(config.parcel_dir, PathBuf::from("/data/hp"));
        assert!(!config.persist_zero_loss);
        assert_eq!(config.jobs, 4);
        assert_eq!(
            config.alpha,
            AlphaPolicy::Estimate {
                min_alpha: 0.3,
                fallback: 0.3
            }
        );
        assert_eq!(
            config.parcel_path(&CityKey::new("Henan", "Anyang")),
            PathBuf::from("/data/hp/Henan-Anyang_hp.csv")
        );
    }

    #[test]
    fn fixed_alpha_value_defaults() {
        let config = PipelineConfig::from_toml("[alpha]\nmode = \"fixed\"\n", "inline").unwrap();
        assert_eq!(config.alpha, AlphaPolicy::Fixed { value: 0.3 });

        let config =
            PipelineConfig::from_toml("[alpha]\nmode = \"fixed\"\nvalue = 0.25\n", "inline")
                .unwrap();
        assert_eq!(config.alpha, AlphaPolicy::Fixed { value: 0.25 });
    }

    #[test]
    fn rejects_unknown_alpha_mode() {
        let err = PipelineConfig::from_toml("[alpha]\nmode = \"guess\"\n", "inline").unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }
}
