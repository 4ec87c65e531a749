//! Rent share (`alpha`) estimation.
//!
//! Regresses `ln(price)` on `ln(FAR)` with county fixed effects. The fixed
//! effects are absorbed by demeaning both sides within each county, which
//! yields the same FAR coefficient as the dummy-variable regression without
//! building the design matrix.

use std::collections::BTreeMap;

use rent_gap_models::ParcelObservation;

/// Lower bound applied to estimated rent shares.
pub const MIN_ALPHA: f64 = 0.3;

/// Estimates the FAR elasticity of price with county fixed effects and
/// returns `max(-elasticity, min_alpha)`.
///
/// Only parcels with a positive price, a positive FAR and a county are used.
/// Returns `None` when fewer than two such parcels exist or when `ln(FAR)`
/// does not vary within any county.
#[must_use]
pub fn estimate_alpha(parcels: &[ParcelObservation], min_alpha: f64) -> Option<f64> {
    let mut by_county: BTreeMap<&str, Vec<(f64, f64)>> = BTreeMap::new();

    for parcel in parcels {
        let (Some(county), Some(far)) = (parcel.county.as_deref(), parcel.far) else {
            continue;
        };
        if parcel.price <= 0.0 || far <= 0.0 {
            continue;
        }
        by_county
            .entry(county)
            .or_default()
            .push((far.ln(), parcel.price.ln()));
    }

    let usable: usize = by_county.values().map(Vec::len).sum();
    if usable < 2 {
        return None;
    }

    let mut sxy = 0.0;
    let mut sxx = 0.0;

    for rows in by_county.values() {
        #[allow(clippy::cast_precision_loss)]
        let n = rows.len() as f64;
        let mean_x = rows.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = rows.iter().map(|(_, y)| y).sum::<f64>() / n;
        for (x, y) in rows {
            let dx = x - mean_x;
            sxy += dx * (y - mean_y);
            sxx += dx * dx;
        }
    }

    if sxx <= f64::EPSILON {
        return None;
    }

    let beta_far = sxy / sxx;
    Some((-beta_far).max(min_alpha))
}
