//! Error type for the numeric modules (distance, projections, statistics).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Contingency table is empty")]
    EmptyTable,

    #[error("Contingency table has a zero expected frequency at ({row}, {col})")]
    ZeroExpected { row: usize, col: usize },

    #[error("Need at least {needed} observations, got {got}")]
    TooFewObservations { needed: usize, got: usize },

    #[error("Length mismatch: {what} has {got} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;
