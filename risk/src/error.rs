//! Error types for risk estimation, simulation and stress testing

use thiserror::Error;

/// Errors that can occur anywhere in the risk pipeline
#[derive(Error, Debug)]
pub enum RiskError {
    /// Shapes of mean, covariance and weights do not agree
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Which operand was inspected
        context: String,
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// Covariance matrix is not symmetric within tolerance
    #[error("Covariance matrix is not symmetric: max |Σ - Σᵗ| = {max_deviation:e} exceeds {tolerance:e}")]
    Asymmetry {
        /// Largest absolute elementwise deviation from the transpose
        max_deviation: f64,
        /// Tolerance that was applied
        tolerance: f64,
    },

    /// Covariance matrix has an eigenvalue below the negative tolerance
    #[error("Covariance matrix is not positive semi-definite: smallest eigenvalue {min_eigenvalue:e}")]
    NotPositiveSemiDefinite {
        /// Smallest eigenvalue found (or offending diagonal entry)
        min_eigenvalue: f64,
    },

    /// Scalar parameter outside its domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Risk metric requested on an empty sample
    #[error("Cannot compute risk metric on an empty sample")]
    EmptySample,

    /// Not enough observations for estimation
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData {
        /// Required number of observations
        required: usize,
        /// Actual number of observations
        actual: usize,
    },

    /// Malformed input table
    #[error("Data error: {0}")]
    Data(String),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl RiskError {
    pub(crate) fn dimension(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        RiskError::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }
}

impl From<serde_yaml::Error> for RiskError {
    fn from(err: serde_yaml::Error) -> Self {
        RiskError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for RiskError {
    fn from(err: serde_json::Error) -> Self {
        RiskError::Config(err.to_string())
    }
}

/// Result type for risk operations
pub type Result<T> = std::result::Result<T, RiskError>;
