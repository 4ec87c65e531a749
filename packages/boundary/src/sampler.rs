//! Arc-length sampling of built-up area boundaries.
//!
//! Boundaries are projected to Web Mercator meters, unioned, and each
//! exterior ring is simplified before sampling so that the cost of a city
//! with thousands of tiny built-up patches stays bounded by the sample
//! budget rather than by vertex count.

use geo::{Coord, Line, LineString, MapCoords, MultiPolygon, Simplify, unary_union};

/// Sphere radius used by EPSG:3857.
pub const WEB_MERCATOR_RADIUS_M: f64 = 6_378_137.0;

/// Latitude limit of the Web Mercator square.
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

pub const DEFAULT_SAMPLE_COUNT: usize = 300;
pub const DEFAULT_SIMPLIFY_TOLERANCE_M: f64 = 5.0;

/// Projects a WGS84 lon/lat coordinate to Web Mercator meters.
#[must_use]
pub fn to_web_mercator(c: Coord<f64>) -> Coord<f64> {
    let lat = c.y.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    Coord {
        x: WEB_MERCATOR_RADIUS_M * c.x.to_radians(),
        y: WEB_MERCATOR_RADIUS_M * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}

/// Samples a fixed budget of points along the exterior rings of a
/// footprint, proportionally to ring length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometrySampler {
    /// Total number of points spread across all rings.
    pub sample_count: usize,
    /// Douglas-Peucker tolerance in meters.
    pub simplify_tolerance_m: f64,
}

impl Default for GeometrySampler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_COUNT, DEFAULT_SIMPLIFY_TOLERANCE_M)
    }
}

impl GeometrySampler {
    #[must_use]
    pub const fn new(sample_count: usize, simplify_tolerance_m: f64) -> Self {
        Self {
            sample_count,
            simplify_tolerance_m,
        }
    }

    /// Projects a lon/lat footprint to Web Mercator and unions overlapping
    /// polygons.
    #[must_use]
    pub fn project_footprint(footprint: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        let planar = footprint.map_coords(to_web_mercator);
        unary_union(&planar.0)
    }

    /// Simplified exterior rings of a planar footprint.
    ///
    /// A ring that Douglas-Peucker would collapse below a triangle (a patch
    /// smaller than the tolerance) is kept unsimplified, so small patches
    /// still get their share of the budget.
    #[must_use]
    pub fn rings(&self, planar: &MultiPolygon<f64>) -> Vec<LineString<f64>> {
        planar
            .0
            .iter()
            .map(|polygon| {
                let simplified = polygon.exterior().simplify(self.simplify_tolerance_m);
                if simplified.0.len() < 4 {
                    polygon.exterior().clone()
                } else {
                    simplified
                }
            })
            .filter(|ring| !ring.0.is_empty())
            .collect()
    }

    /// Samples points along every ring of a planar footprint.
    ///
    /// Each ring receives `max(floor(budget * len / total_len), 1)` points
    /// at equal arc-length spacing starting from its first vertex. Returns
    /// no points when the total ring length is zero.
    #[must_use]
    pub fn sample(&self, planar: &MultiPolygon<f64>) -> Vec<Coord<f64>> {
        let rings = self.rings(planar);
        let lengths: Vec<f64> = rings.iter().map(ring_length).collect();
        let total: f64 = lengths.iter().sum();

        if total <= 0.0 {
            return Vec::new();
        }

        let mut points = Vec::with_capacity(self.sample_count + rings.len());
        for (ring, &length) in rings.iter().zip(&lengths) {
            #[allow(
                clippy::cast_precision_loss,
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss
            )]
            let n = ((self.sample_count as f64 * length / total).floor() as usize).max(1);
            points.extend(sample_ring(ring, length, n));
        }
        points
    }
}

fn segment_length(line: &Line<f64>) -> f64 {
    line.dx().hypot(line.dy())
}

fn ring_length(ring: &LineString<f64>) -> f64 {
    ring.lines().map(|l| segment_length(&l)).sum()
}

/// `n` points at distances `length * k / n` for `k in 0..n` along `ring`.
fn sample_ring(ring: &LineString<f64>, length: f64, n: usize) -> Vec<Coord<f64>> {
    let segments: Vec<Line<f64>> = ring.lines().collect();
    let Some(&first) = ring.0.first() else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(n);
    let mut idx = 0;
    let mut walked = 0.0;

    for k in 0..n {
        #[allow(clippy::cast_precision_loss)]
        let target = length * k as f64 / n as f64;

        while let Some(line) = segments.get(idx) {
            let seg = segment_length(line);
            if target <= walked + seg {
                break;
            }
            walked += seg;
            idx += 1;
        }

        let point = segments.get(idx).map_or(first, |line| {
            let seg = segment_length(line);
            if seg > 0.0 {
                let t = (target - walked) / seg;
                Coord {
                    x: t.mul_add(line.dx(), line.start.x),
                    y: t.mul_add(line.dy(), line.start.y),
                }
            } else {
                line.start
            }
        });
        out.push(point);
    }

    out
}

#[cfg(test)]
mod tests {
    use geo::{Polygon, polygon};

    use super::*;

    fn square(x0: f64, y0: f64, side: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + side, y: y0),
            (x: x0 + side, y: y0 + side),
            (x: x0, y: y0 + side),
            (x: x0, y: y0),
        ]
    }

    #[test]
    fn mercator_origin_and_scale() {
        let origin = to_web_mercator(Coord { x: 0.0, y: 0.0 });
        assert!(origin.x.abs() < 1e-9 && origin.y.abs() < 1e-9);

        let east = to_web_mercator(Coord { x: 180.0, y: 0.0 });
        assert!((east.x - 20_037_508.342_789_244).abs() < 1e-6);
    }

    #[test]
    fn samples_ring_at_equal_spacing() {
        let ring = square(0.0, 0.0, 10.0).exterior().clone();
        let points = sample_ring(&ring, 40.0, 4);
        assert_eq!(
            points,
            vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 10.0, y: 0.0 },
                Coord { x: 10.0, y: 10.0 },
                Coord { x: 0.0, y: 10.0 },
            ]
        );
    }

    #[test]
    fn patch_below_tolerance_is_not_collapsed() {
        let sampler = GeometrySampler::new(10, 5.0);
        let planar = MultiPolygon(vec![square(0.0, 0.0, 2.0)]);

        let rings = sampler.rings(&planar);
        assert_eq!(rings.len(), 1);
        assert!((ring_length(&rings[0]) - 8.0).abs() < 1e-12);
        assert_eq!(sampler.sample(&planar).len(), 10);
    }

    #[test]
    fn budget_is_split_by_length() {
        let sampler = GeometrySampler::new(100, 0.0);
        let planar = MultiPolygon(vec![square(0.0, 0.0, 300.0), square(1000.0, 0.0, 100.0)]);
        let points = sampler.sample(&planar);
        // 75 points on the large square, 25 on the small one.
        assert_eq!(points.len(), 100);
        assert_eq!(points.iter().filter(|p| p.x >= 1000.0).count(), 25);
    }

    #[test]
    fn tiny_ring_gets_at_least_one_point() {
        let sampler = GeometrySampler::new(10, 0.0);
        let planar = MultiPolygon(vec![square(0.0, 0.0, 1000.0), square(5000.0, 0.0, 0.1)]);
        let points = sampler.sample(&planar);
        assert_eq!(points.iter().filter(|p| p.x >= 5000.0).count(), 1);
    }

    #[test]
    fn empty_footprint_has_no_samples() {
        let sampler = GeometrySampler::default();
        assert!(sampler.sample(&MultiPolygon(vec![])).is_empty());
    }

    #[test]
    fn simplification_keeps_ring_closed() {
        let sampler = GeometrySampler::new(10, 5.0);
        let mut coords: Vec<Coord<f64>> = (0..=100)
            .map(|i| Coord {
                x: f64::from(i),
                y: if i % 2 == 0 { 0.0 } else { 0.5 },
            })
            .collect();
        coords.extend([Coord { x: 100.0, y: 100.0 }, Coord { x: 0.0, y: 100.0 }, Coord { x: 0.0, y: 0.0 }]);
        let planar = MultiPolygon(vec![Polygon::new(LineString::from(coords), vec![])]);

        let rings = sampler.rings(&planar);
        assert_eq!(rings.len(), 1);
        assert!(rings[0].0.len() < 20);
        assert_eq!(rings[0].0.first(), rings[0].0.last());
    }

    #[test]
    fn projection_unions_overlaps() {
        let footprint = MultiPolygon(vec![square(0.0, 0.0, 0.01), square(0.005, 0.0, 0.01)]);
        let planar = GeometrySampler::project_footprint(&footprint);
        assert_eq!(planar.0.len(), 1);
    }
}
