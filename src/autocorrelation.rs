//! Spatial autocorrelation over tract centroids
//!
//! - **K-nearest-neighbour weights** with row standardization
//! - **Global Moran's I** with a permutation pseudo p-value
//! - **Local Moran's I (LISA)** with conditional permutation and quadrant labels

use crate::error::{AnalysisError, AnalysisResult};
use geo::Point;
use rand::seq::index::sample;
use rand::seq::SliceRandom;
use rand::Rng;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use std::fmt;
use tracing::warn;

/// Sparse spatial weights: for each unit, its neighbours and their weights.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialWeights {
    neighbours: Vec<Vec<(usize, f64)>>,
}

impl SpatialWeights {
    /// Binary weights linking each point to its `k` nearest other points.
    pub fn knn(points: &[Point<f64>], k: usize) -> AnalysisResult<Self> {
        let n = points.len();
        if n < 2 {
            return Err(AnalysisError::TooFewObservations { needed: 2, got: n });
        }
        if k == 0 {
            return Err(AnalysisError::InvalidParameter {
                name: "k",
                value: "0".into(),
                reason: "need at least one neighbour".into(),
            });
        }
        let k = if k >= n {
            warn!("k = {} with only {} units; using k = {}", k, n, n - 1);
            n - 1
        } else {
            k
        };

        let tree = RTree::bulk_load(
            points
                .iter()
                .enumerate()
                .map(|(i, p)| GeomWithData::new([p.x(), p.y()], i))
                .collect(),
        );

        let neighbours: Vec<Vec<(usize, f64)>> = points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                tree.nearest_neighbor_iter(&[p.x(), p.y()])
                    .filter(|candidate| candidate.data != i)
                    .take(k)
                    .map(|candidate| (candidate.data, 1.0))
                    .collect()
            })
            .collect();

        Ok(SpatialWeights { neighbours })
    }

    pub fn from_neighbours(neighbours: Vec<Vec<(usize, f64)>>) -> Self {
        SpatialWeights { neighbours }
    }

    pub fn len(&self) -> usize {
        self.neighbours.len()
    }

    pub fn neighbours(&self, i: usize) -> &[(usize, f64)] {
        &self.neighbours[i]
    }

    /// Scales each row to sum to one. Rows without neighbours stay empty.
    pub fn row_standardize(&mut self) {
        for row in &mut self.neighbours {
            let sum: f64 = row.iter().map(|(_, w)| w).sum();
            if sum > 0.0 {
                for (_, w) in row.iter_mut() {
                    *w /= sum;
                }
            }
        }
    }

    /// Sum of all weights (S0).
    pub fn total(&self) -> f64 {
        self.neighbours.iter().flatten().map(|(_, w)| w).sum()
    }

    /// Spatial lag: weighted sum of each unit's neighbour values.
    pub fn lag(&self, values: &[f64]) -> AnalysisResult<Vec<f64>> {
        self.check_len(values)?;
        Ok(self.neighbours.iter().map(|row| row.iter().map(|&(j, w)| w * values[j]).sum::<f64>()).collect())
    }

    fn check_len(&self, values: &[f64]) -> AnalysisResult<()> {
        if values.len() != self.len() {
            return Err(AnalysisError::LengthMismatch {
                what: "values",
                expected: self.len(),
                got: values.len(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalMoran {
    pub i: f64,
    /// Expected I under spatial randomness
    pub expected: f64,
    /// Pseudo p-value from permutations
    pub p_sim: f64,
    /// Standardized observed I against the permutation distribution
    pub z_sim: f64,
    pub permutations: usize,
}

fn deviations(values: &[f64]) -> (Vec<f64>, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let z: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let sum_sq = z.iter().map(|d| d * d).sum();
    (z, sum_sq)
}

fn moran_i(z: &[f64], sum_sq: f64, weights: &SpatialWeights, s0: f64) -> AnalysisResult<f64> {
    let lag = weights.lag(z)?;
    let cross: f64 = z.iter().zip(&lag).map(|(a, b)| a * b).sum();
    Ok(z.len() as f64 / s0 * cross / sum_sq)
}

// Folds the count of simulations at least as large as the observed value
// into the smaller tail.
fn pseudo_p(larger: usize, permutations: usize) -> f64 {
    let larger = larger.min(permutations - larger);
    (larger as f64 + 1.0) / (permutations as f64 + 1.0)
}

fn check_inputs(values: &[f64], weights: &SpatialWeights, permutations: usize) -> AnalysisResult<()> {
    weights.check_len(values)?;
    if values.len() < 3 {
        return Err(AnalysisError::TooFewObservations { needed: 3, got: values.len() });
    }
    if permutations == 0 {
        return Err(AnalysisError::InvalidParameter {
            name: "permutations",
            value: "0".into(),
            reason: "need at least one permutation".into(),
        });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::InvalidParameter {
            name: "values",
            value: "non-finite".into(),
            reason: "values must be finite".into(),
        });
    }
    Ok(())
}

/// Global Moran's I with a permutation test.
pub fn global_moran<R: Rng + ?Sized>(
    values: &[f64],
    weights: &SpatialWeights,
    permutations: usize,
    rng: &mut R,
) -> AnalysisResult<GlobalMoran> {
    check_inputs(values, weights, permutations)?;
    let n = values.len() as f64;
    let expected = -1.0 / (n - 1.0);

    let (z, sum_sq) = deviations(values);
    let s0 = weights.total();
    if sum_sq.abs() < f64::EPSILON || s0 == 0.0 {
        return Ok(GlobalMoran { i: 0.0, expected, p_sim: 1.0, z_sim: 0.0, permutations });
    }

    let observed = moran_i(&z, sum_sq, weights, s0)?;

    let mut shuffled = z.clone();
    let mut sims = Vec::with_capacity(permutations);
    for _ in 0..permutations {
        shuffled.shuffle(rng);
        sims.push(moran_i(&shuffled, sum_sq, weights, s0)?);
    }

    let larger = sims.iter().filter(|&&s| s >= observed).count();
    let mean = sims.iter().sum::<f64>() / permutations as f64;
    let sd = (sims.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / permutations as f64).sqrt();
    let z_sim = if sd > 0.0 { (observed - mean) / sd } else { 0.0 };

    Ok(GlobalMoran {
        i: observed,
        expected,
        p_sim: pseudo_p(larger, permutations),
        z_sim,
        permutations,
    })
}

/// Moran scatterplot quadrant of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quadrant {
    HighHigh,
    LowHigh,
    LowLow,
    HighLow,
}

impl Quadrant {
    pub fn classify(z: f64, lag: f64) -> Self {
        match (z > 0.0, lag > 0.0) {
            (true, true) => Quadrant::HighHigh,
            (false, true) => Quadrant::LowHigh,
            (false, false) => Quadrant::LowLow,
            (true, false) => Quadrant::HighLow,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Quadrant::HighHigh => "HH",
            Quadrant::LowHigh => "LH",
            Quadrant::LowLow => "LL",
            Quadrant::HighLow => "HL",
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalMoran {
    pub statistic: f64,
    /// Standardized value
    pub z: f64,
    /// Spatial lag of the standardized value
    pub lag: f64,
    pub quadrant: Quadrant,
    pub p_sim: f64,
    pub significant: bool,
}

/// Local Moran's I for every unit with conditional permutation inference.
pub fn local_moran<R: Rng + ?Sized>(
    values: &[f64],
    weights: &SpatialWeights,
    permutations: usize,
    significance: f64,
    rng: &mut R,
) -> AnalysisResult<Vec<LocalMoran>> {
    check_inputs(values, weights, permutations)?;
    let n = values.len();
    let n_1 = (n - 1) as f64;

    let (mut z, _) = deviations(values);
    let sd = (z.iter().map(|d| d * d).sum::<f64>() / n as f64).sqrt();
    if sd < f64::EPSILON {
        return Err(AnalysisError::InvalidParameter {
            name: "values",
            value: "constant".into(),
            reason: "local Moran's I is undefined without variance".into(),
        });
    }
    for v in z.iter_mut() {
        *v /= sd;
    }
    let den: f64 = z.iter().map(|d| d * d).sum();
    let lag = weights.lag(&z)?;

    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let statistic = n_1 * z[i] * lag[i] / den;
        let row = weights.neighbours(i);

        let mut larger = 0;
        for _ in 0..permutations {
            // neighbours drawn from every unit except i
            let picks = sample(rng, n - 1, row.len().min(n - 1));
            let sim_lag: f64 = picks
                .iter()
                .zip(row)
                .map(|(j, &(_, w))| {
                    let j = if j >= i { j + 1 } else { j };
                    w * z[j]
                })
                .sum();
            if n_1 * z[i] * sim_lag / den >= statistic {
                larger += 1;
            }
        }
        let p_sim = pseudo_p(larger, permutations);

        out.push(LocalMoran {
            statistic,
            z: z[i],
            lag: lag[i],
            quadrant: Quadrant::classify(z[i], lag[i]),
            p_sim,
            significant: p_sim < significance,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn grid(size: usize) -> Vec<Point<f64>> {
        (0..size * size)
            .map(|i| Point::new((i % size) as f64, (i / size) as f64))
            .collect()
    }

    fn weights(points: &[Point<f64>], k: usize) -> SpatialWeights {
        let mut w = SpatialWeights::knn(points, k).unwrap();
        w.row_standardize();
        w
    }

    #[test]
    fn knn_excludes_self_and_rows_sum_to_one() {
        let points = grid(5);
        let w = weights(&points, 8);
        assert_eq!(w.len(), 25);
        for i in 0..w.len() {
            let row = w.neighbours(i);
            assert_eq!(row.len(), 8);
            assert!(row.iter().all(|(j, _)| *j != i));
            let sum: f64 = row.iter().map(|(_, w)| w).sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
        // the centre cell's neighbours are its 8 surrounding cells
        let mut centre: Vec<usize> = w.neighbours(12).iter().map(|(j, _)| *j).collect();
        centre.sort();
        assert_eq!(centre, vec![6, 7, 8, 11, 13, 16, 17, 18]);
    }

    #[test]
    fn knn_clamps_k_and_rejects_tiny_inputs() {
        let points = grid(2);
        let w = SpatialWeights::knn(&points, 8).unwrap();
        assert!((0..4).all(|i| w.neighbours(i).len() == 3));
        assert!(matches!(
            SpatialWeights::knn(&points[..1], 8),
            Err(AnalysisError::TooFewObservations { .. })
        ));
        assert!(SpatialWeights::knn(&points, 0).is_err());
    }

    #[test]
    fn lag_is_neighbour_average() {
        let w = SpatialWeights::from_neighbours(vec![
            vec![(1, 0.5), (2, 0.5)],
            vec![(0, 1.0)],
            vec![],
        ]);
        assert_eq!(w.lag(&[1.0, 3.0, 5.0]).unwrap(), vec![4.0, 1.0, 0.0]);
        assert!(w.lag(&[1.0]).is_err());
    }

    #[test]
    fn clustered_values_have_positive_moran() {
        let points = grid(10);
        let values: Vec<f64> = points.iter().map(|p| if p.x() < 5.0 { 0.0 } else { 100.0 }).collect();
        let w = weights(&points, 8);
        let mut rng = StdRng::seed_from_u64(7);
        let result = global_moran(&values, &w, 199, &mut rng).unwrap();
        assert!(result.i > 0.5, "I = {}", result.i);
        assert!(result.p_sim <= 0.01, "p = {}", result.p_sim);
        assert!(result.z_sim > 2.0);
        assert!((result.expected + 1.0 / 99.0).abs() < 1e-12);
    }

    #[test]
    fn checkerboard_has_negative_moran() {
        let points = grid(10);
        // checkerboard
        let values: Vec<f64> = points.iter().map(|p| ((p.x() + p.y()) as usize % 2) as f64).collect();
        let w = weights(&points, 4);
        let mut rng = StdRng::seed_from_u64(7);
        let result = global_moran(&values, &w, 99, &mut rng).unwrap();
        assert!(result.i < 0.0, "I = {}", result.i);
    }

    #[test]
    fn constant_values_are_not_autocorrelated() {
        let points = grid(4);
        let w = weights(&points, 3);
        let mut rng = StdRng::seed_from_u64(1);
        let result = global_moran(&[2.0; 16], &w, 9, &mut rng).unwrap();
        assert_eq!(result.i, 0.0);
        assert_eq!(result.p_sim, 1.0);
        assert!(local_moran(&[2.0; 16], &w, 9, 0.05, &mut rng).is_err());
    }

    #[test]
    fn same_seed_same_result() {
        let points = grid(6);
        let values: Vec<f64> = (0..36).map(|i| ((i * 7) % 11) as f64).collect();
        let w = weights(&points, 8);
        let a = global_moran(&values, &w, 99, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = global_moran(&values, &w, 99, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
        let la = local_moran(&values, &w, 99, 0.05, &mut StdRng::seed_from_u64(42)).unwrap();
        let lb = local_moran(&values, &w, 99, 0.05, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(la, lb);
    }

    #[test]
    fn local_moran_finds_hot_and_cold_clusters() {
        let points = grid(10);
        let values: Vec<f64> = points.iter().map(|p| if p.x() < 5.0 { 0.0 } else { 100.0 }).collect();
        let w = weights(&points, 8);
        let mut rng = StdRng::seed_from_u64(3);
        let lisa = local_moran(&values, &w, 499, 0.05, &mut rng).unwrap();
        assert_eq!(lisa.len(), 100);

        // far right column: high values among high neighbours
        let hot = &lisa[9];
        assert_eq!(hot.quadrant, Quadrant::HighHigh);
        assert!(hot.statistic > 0.0);
        assert!(hot.significant, "p = {}", hot.p_sim);

        // far left column: low among low
        let cold = &lisa[90];
        assert_eq!(cold.quadrant, Quadrant::LowLow);
        assert!(cold.significant, "p = {}", cold.p_sim);

        assert!(lisa.iter().all(|l| l.p_sim > 0.0 && l.p_sim <= 0.5 + 1e-12));
    }

    #[test]
    fn quadrants_follow_signs() {
        assert_eq!(Quadrant::classify(1.0, 2.0), Quadrant::HighHigh);
        assert_eq!(Quadrant::classify(-1.0, 2.0), Quadrant::LowHigh);
        assert_eq!(Quadrant::classify(-1.0, -2.0), Quadrant::LowLow);
        assert_eq!(Quadrant::classify(1.0, -2.0), Quadrant::HighLow);
        assert_eq!(Quadrant::HighLow.to_string(), "HL");
    }
}
