#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Welfare loss from an undersized urban footprint.
//!
//! Under a linear rent curve `r(d) = b0 + b1 * d`, land between the actual
//! boundary and the theoretical boundary `R` would have earned more as urban
//! land than as rural land. The lost surplus is the triangle under the rent
//! curve spanning the gap, and it is reported both in absolute terms and as a
//! share of the total rent triangle out to `R`.

use rent_gap_models::{RentModel, WelfareResult};

/// Computes the welfare loss triangle for a boundary `radius_km` and a mean
/// inward `gap_km`.
///
/// Returns a zero loss when the gap reaches or exceeds the radius, i.e. the
/// built-up area is not inside the theoretical boundary at all.
#[must_use]
pub fn welfare_loss(model: &RentModel, radius_km: f64, gap_km: f64) -> WelfareResult {
    if radius_km - gap_km <= 0.0 {
        return WelfareResult {
            loss: 0.0,
            loss_ratio: 0.0,
        };
    }

    let loss = -0.5 * model.slope * gap_km * gap_km;
    let total = -0.5 * model.slope * radius_km * radius_km;

    #[allow(clippy::float_cmp)]
    let loss_ratio = if total == 0.0 { 0.0 } else { loss / total };

    WelfareResult { loss, loss_ratio }
}
