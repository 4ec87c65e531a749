//! Rural rent reference table and boundary radius solver.

use std::io::Read;
use std::path::Path;

use rent_gap_models::{BoundaryEstimate, CityKey, RentModel};
use serde::Deserialize;

use crate::{BoundaryError, Resolution};

#[derive(Debug, Deserialize)]
struct RuralRentRow {
    #[serde(default, deserialize_with = "csv::invalid_option")]
    prov_city: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    prov: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    land_price: Option<f64>,
}

/// One usable row of the reference table.
#[derive(Debug, Clone, PartialEq)]
pub struct RuralRentEntry {
    /// `{province}-{city}` key.
    pub key: String,
    pub province: String,
    pub land_price: f64,
}

/// Rural land prices keyed by `{province}-{city}`.
#[derive(Debug, Clone, Default)]
pub struct RuralRentTable {
    entries: Vec<RuralRentEntry>,
}

/// Ways of finding a rural rent for a city, tried in [`RuralRentStrategy::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuralRentStrategy {
    ExactKey,
    ProvinceAverage,
}

impl RuralRentStrategy {
    pub const ALL: &[Self] = &[Self::ExactKey, Self::ProvinceAverage];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ExactKey => "exact city key",
            Self::ProvinceAverage => "provincial average",
        }
    }

    /// Attempts this strategy against `table`.
    #[must_use]
    pub fn attempt(self, table: &RuralRentTable, key: &CityKey) -> Resolution<f64> {
        match self {
            Self::ExactKey => {
                let joined = key.joined();
                table
                    .entries
                    .iter()
                    .find(|e| e.key == joined)
                    .map(|e| e.land_price)
                    .into()
            }
            Self::ProvinceAverage => {
                let prices: Vec<f64> = table
                    .entries
                    .iter()
                    .filter(|e| e.province == key.province)
                    .map(|e| e.land_price)
                    .collect();
                if prices.is_empty() {
                    return Resolution::Unresolved;
                }
                #[allow(clippy::cast_precision_loss)]
                let mean = prices.iter().sum::<f64>() / prices.len() as f64;
                Resolution::Resolved(mean)
            }
        }
    }
}

impl RuralRentTable {
    /// Loads the reference table from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is not valid CSV.
    pub fn load(path: &Path) -> Result<Self, BoundaryError> {
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        log::info!(
            "Loaded {} rural land price rows from {}",
            table.entries.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parses the reference table from a CSV with `prov_city`, `prov` and
    /// `land_price` columns. Rows without a key or price are skipped. When
    /// `prov` is blank the province is taken from the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the CSV is malformed.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, BoundaryError> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let mut entries = Vec::new();

        for row in reader.deserialize::<RuralRentRow>() {
            let row = row?;
            let (Some(key), Some(land_price)) = (row.prov_city, row.land_price) else {
                continue;
            };
            let key = key.trim().to_string();
            let province = row
                .prov
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .or_else(|| CityKey::parse(&key).map(|k| k.province));
            let Some(province) = province else {
                continue;
            };
            entries.push(RuralRentEntry {
                key,
                province,
                land_price,
            });
        }

        Ok(Self { entries })
    }

    #[must_use]
    pub const fn from_entries(entries: Vec<RuralRentEntry>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the rural rent for `key`, trying each strategy in order.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError::NoRuralRent`] if every strategy is unresolved.
    pub fn lookup(&self, key: &CityKey) -> Result<(f64, RuralRentStrategy), BoundaryError> {
        for &strategy in RuralRentStrategy::ALL {
            if let Resolution::Resolved(rent) = strategy.attempt(self, key) {
                log::info!("{key}: rural land price {rent:.4} via {}", strategy.label());
                return Ok((rent, strategy));
            }
        }
        Err(BoundaryError::NoRuralRent {
            key: key.joined(),
            province: key.province.clone(),
        })
    }
}

/// Solves `rural_rent = b0 + b1 * edge` for `edge` in kilometers.
///
/// # Errors
///
/// Returns [`BoundaryError::DegenerateModel`] unless rent falls with
/// distance, and [`BoundaryError::NoBoundary`] if the solution is not a
/// positive finite radius.
pub fn boundary_edge(model: &RentModel, rural_rent: f64) -> Result<f64, BoundaryError> {
    if model.slope.is_nan() || model.slope >= 0.0 {
        return Err(BoundaryError::DegenerateModel {
            slope: model.slope,
        });
    }
    let edge = (rural_rent - model.intercept) / model.slope;
    if edge.is_finite() && edge > 0.0 {
        Ok(edge)
    } else {
        Err(BoundaryError::NoBoundary { edge })
    }
}

/// Looks up the rural rent for `key` and solves the rent curve against it.
///
/// # Errors
///
/// Returns an error if no rural rent is available or the curve has no
/// positive boundary.
pub fn resolve_boundary(
    model: &RentModel,
    key: &CityKey,
    table: &RuralRentTable,
) -> Result<BoundaryEstimate, BoundaryError> {
    let (rural_rent, _) = table.lookup(key)?;
    let radius_km = boundary_edge(model, rural_rent)?;
    Ok(BoundaryEstimate {
        radius_km,
        rural_rent,
    })
}
