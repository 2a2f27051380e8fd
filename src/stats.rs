//! Chi-square test of independence on a contingency table.

use crate::aggregate::ContingencyTable;
use crate::error::{AnalysisError, AnalysisResult};
use statrs::distribution::{ChiSquared, ContinuousCDF};

#[derive(Debug, Clone, PartialEq)]
pub struct ChiSquareResult {
    pub statistic: f64,
    pub p_value: f64,
    pub dof: usize,
    pub expected: Vec<Vec<f64>>,
}

/// Chi-square test over a tract × chain-flag table.
///
/// Flags that never occur are dropped first, the same columns a
/// cross-tabulation would produce.
pub fn chi2_test(table: &ContingencyTable, correction: bool) -> AnalysisResult<ChiSquareResult> {
    let observed = table.matrix();
    let keep: Vec<usize> = (0..2)
        .filter(|&col| observed.iter().any(|row| row[col] > 0.0))
        .collect();
    let observed: Vec<Vec<f64>> = observed
        .iter()
        .map(|row| keep.iter().map(|&c| row[c]).collect())
        .collect();
    chi2_contingency(&observed, correction)
}

/// Pearson's chi-square test of independence.
///
/// With one degree of freedom and `correction` set, Yates' continuity
/// correction is applied.
pub fn chi2_contingency(observed: &[Vec<f64>], correction: bool) -> AnalysisResult<ChiSquareResult> {
    let rows = observed.len();
    let cols = observed.first().map_or(0, Vec::len);
    if rows == 0 || cols == 0 {
        return Err(AnalysisError::EmptyTable);
    }
    if let Some(bad) = observed.iter().find(|r| r.len() != cols) {
        return Err(AnalysisError::LengthMismatch {
            what: "contingency row",
            expected: cols,
            got: bad.len(),
        });
    }
    if observed.iter().flatten().any(|&v| v < 0.0 || !v.is_finite()) {
        return Err(AnalysisError::InvalidParameter {
            name: "observed",
            value: "negative or non-finite count".into(),
            reason: "counts must be finite and non-negative".into(),
        });
    }

    let row_sums: Vec<f64> = observed.iter().map(|r| r.iter().sum()).collect();
    let col_sums: Vec<f64> = (0..cols).map(|c| observed.iter().map(|r| r[c]).sum()).collect();
    let total: f64 = row_sums.iter().sum();
    if total == 0.0 {
        return Err(AnalysisError::EmptyTable);
    }

    let expected: Vec<Vec<f64>> = row_sums
        .iter()
        .map(|rs| col_sums.iter().map(|cs| rs * cs / total).collect())
        .collect();
    for (r, row) in expected.iter().enumerate() {
        if let Some(c) = row.iter().position(|&e| e == 0.0) {
            return Err(AnalysisError::ZeroExpected { row: r, col: c });
        }
    }

    let dof = (rows - 1) * (cols - 1);
    if dof == 0 {
        return Ok(ChiSquareResult { statistic: 0.0, p_value: 1.0, dof, expected });
    }

    let mut statistic = 0.0;
    for (obs_row, exp_row) in observed.iter().zip(&expected) {
        for (&o, &e) in obs_row.iter().zip(exp_row) {
            let mut diff = o - e;
            if correction && dof == 1 {
                diff = diff.signum() * (diff.abs() - diff.abs().min(0.5));
            }
            statistic += diff * diff / e;
        }
    }

    let p_value = chi2_sf(statistic, dof as f64)?;
    Ok(ChiSquareResult { statistic, p_value, dof, expected })
}

/// Survival function of the chi-square distribution with `dof` degrees
/// of freedom.
pub fn chi2_sf(x: f64, dof: f64) -> AnalysisResult<f64> {
    let dist = ChiSquared::new(dof).map_err(|e| AnalysisError::InvalidParameter {
        name: "dof",
        value: dof.to_string(),
        reason: e.to_string(),
    })?;
    if x <= 0.0 {
        return Ok(1.0);
    }
    Ok(dist.sf(x))
}
