//! Mean inward gap between the theoretical and actual urban boundary.

use std::path::Path;

use geo::{Coord, MultiPolygon};
use rent_gap_models::{CityKey, LonLat};

use crate::BoundaryError;
use crate::geometry::{find_boundary_file, load_boundary};
use crate::sampler::{GeometrySampler, to_web_mercator};

/// Mean of `radius - d` over points at planar distance `d <= radius` from
/// `origin`, in kilometers. Points and origin are in meters.
///
/// Returns `0.0` when no point lies inside the radius.
#[must_use]
pub fn mean_inward_gap_km(points: &[Coord<f64>], origin: Coord<f64>, radius_km: f64) -> f64 {
    let radius_m = radius_km * 1000.0;
    let gaps: Vec<f64> = points
        .iter()
        .map(|p| (p.x - origin.x).hypot(p.y - origin.y))
        .filter(|&d| d <= radius_m)
        .map(|d| radius_m - d)
        .collect();

    if gaps.is_empty() {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    mean / 1000.0
}

/// Measures how far inside the theoretical radius the built-up boundary
/// sits, on average.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundaryGapEvaluator {
    pub sampler: GeometrySampler,
}

impl BoundaryGapEvaluator {
    #[must_use]
    pub const fn new(sampler: GeometrySampler) -> Self {
        Self { sampler }
    }

    /// Gap in kilometers for a lon/lat footprint around `center`.
    #[must_use]
    pub fn gap_km(&self, center: LonLat, radius_km: f64, footprint: &MultiPolygon<f64>) -> f64 {
        let planar = GeometrySampler::project_footprint(footprint);
        let origin = to_web_mercator(Coord {
            x: center.lon,
            y: center.lat,
        });
        let points = self.sampler.sample(&planar);
        let gap = mean_inward_gap_km(&points, origin, radius_km);
        log::debug!(
            "Sampled {} boundary points, mean inward gap {gap:.4} km",
            points.len()
        );
        gap
    }

    /// Locates the city's boundary file under `geometry_root`, loads it, and
    /// computes the gap.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError::GeometryNotFound`] when no file matches, or a
    /// geometry error when the matched file is unusable.
    pub fn evaluate(
        &self,
        geometry_root: &Path,
        key: &CityKey,
        center: LonLat,
        radius_km: f64,
    ) -> Result<f64, BoundaryError> {
        let file = find_boundary_file(geometry_root, key)?;
        let footprint = load_boundary(&file.path)?;
        Ok(self.gap_km(center, radius_km, &footprint))
    }
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    #[test]
    fn all_points_at_center_give_full_radius() {
        let origin = Coord { x: 100.0, y: 200.0 };
        let points = vec![origin; 12];
        assert!((mean_inward_gap_km(&points, origin, 5.0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn no_points_inside_radius_give_zero() {
        let origin = Coord { x: 0.0, y: 0.0 };
        let points = vec![Coord { x: 6000.0, y: 0.0 }, Coord { x: 0.0, y: -7000.0 }];
        assert!(mean_inward_gap_km(&points, origin, 5.0).abs() < f64::EPSILON);
        assert!(mean_inward_gap_km(&[], origin, 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn averages_only_points_inside() {
        let origin = Coord { x: 0.0, y: 0.0 };
        let points = vec![
            Coord { x: 1000.0, y: 0.0 },
            Coord { x: 3000.0, y: 0.0 },
            Coord { x: 9000.0, y: 0.0 },
        ];
        // (4 km + 2 km) / 2
        assert!((mean_inward_gap_km(&points, origin, 5.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn boundary_on_radius_counts_as_zero_gap() {
        let origin = Coord { x: 0.0, y: 0.0 };
        let points = vec![Coord { x: 5000.0, y: 0.0 }];
        assert!(mean_inward_gap_km(&points, origin, 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn footprint_far_outside_radius_has_no_gap() {
        let evaluator = BoundaryGapEvaluator::default();
        let footprint = MultiPolygon(vec![polygon![
            (x: 10.0, y: 10.0),
            (x: 10.1, y: 10.0),
            (x: 10.1, y: 10.1),
            (x: 10.0, y: 10.1),
            (x: 10.0, y: 10.0),
        ]]);
        let gap = evaluator.gap_km(LonLat { lon: 0.0, lat: 0.0 }, 5.0, &footprint);
        assert!(gap.abs() < f64::EPSILON);
    }

    #[test]
    fn footprint_inside_radius_has_positive_gap() {
        let evaluator = BoundaryGapEvaluator::default();
        // Roughly 2.2 km square around the center.
        let footprint = MultiPolygon(vec![polygon![
            (x: -0.01, y: -0.01),
            (x: 0.01, y: -0.01),
            (x: 0.01, y: 0.01),
            (x: -0.01, y: 0.01),
            (x: -0.01, y: -0.01),
        ]]);
        let gap = evaluator.gap_km(LonLat { lon: 0.0, lat: 0.0 }, 5.0, &footprint);
        assert!(gap > 3.0 && gap < 5.0, "gap = {gap}");
    }

    #[test]
    fn invalid_polygon_at_center_is_ignored() {
        let tmp = std::env::temp_dir().join("rent_gap_gap_invalid_test");
        let _ = std::fs::remove_dir_all(&tmp);
        let dir = tmp.join("Henan");
        std::fs::create_dir_all(&dir).unwrap();
        // A self-intersecting bowtie around the center and a valid square
        // well outside the radius.
        std::fs::write(
            dir.join("Anyang2020.geojson"),
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{},"geometry":{"type":"Polygon",
                 "coordinates":[[[-0.01,-0.01],[0.01,0.01],[0.01,-0.01],[-0.01,0.01],[-0.01,-0.01]]]}},
                {"type":"Feature","properties":{},"geometry":{"type":"Polygon",
                 "coordinates":[[[10.0,10.0],[10.1,10.0],[10.1,10.1],[10.0,10.1],[10.0,10.0]]]}}
            ]}"#,
        )
        .unwrap();

        let gap = BoundaryGapEvaluator::default()
            .evaluate(
                &tmp,
                &CityKey::new("Henan", "Anyang"),
                LonLat { lon: 0.0, lat: 0.0 },
                5.0,
            )
            .unwrap();
        assert!(gap.abs() < f64::EPSILON, "gap = {gap}");

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
