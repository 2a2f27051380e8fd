//! Great-circle distances and brute-force radius search.

use crate::error::{AnalysisError, AnalysisResult};
use geo::Point;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two WGS84 points (x = lon, y = lat).
pub fn haversine_m(a: Point<f64>, b: Point<f64>) -> f64 {
    let lat1 = a.y().to_radians();
    let lat2 = b.y().to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.x() - a.x()).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // rounding can push h a hair past 1 for antipodal points
    2.0 * EARTH_RADIUS_M * h.min(1.0).sqrt().asin()
}

fn check_radius(radius_m: f64) -> AnalysisResult<()> {
    if radius_m.is_nan() || radius_m < 0.0 {
        return Err(AnalysisError::InvalidParameter {
            name: "radius",
            value: radius_m.to_string(),
            reason: "must be a non-negative number of meters".into(),
        });
    }
    Ok(())
}

/// Candidates within `radius_m` of `reference` as `(index, distance)`,
/// nearest first. Equal distances keep their input order.
pub fn within_radius(
    reference: Point<f64>,
    candidates: &[Point<f64>],
    radius_m: f64,
) -> AnalysisResult<Vec<(usize, f64)>> {
    check_radius(radius_m)?;
    let mut hits: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, haversine_m(reference, *c)))
        .filter(|(_, d)| *d <= radius_m)
        .collect();
    hits.sort_by(|a, b| a.1.total_cmp(&b.1));
    Ok(hits)
}

pub fn count_within_radius(
    reference: Point<f64>,
    candidates: &[Point<f64>],
    radius_m: f64,
) -> AnalysisResult<usize> {
    check_radius(radius_m)?;
    Ok(candidates
        .iter()
        .filter(|c| haversine_m(reference, **c) <= radius_m)
        .count())
}
