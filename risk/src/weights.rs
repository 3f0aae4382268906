//! Portfolio weighting schemes
//!
//! Weights are not required to sum to one and may be negative (short
//! positions). Callers that need a fully invested long-only book check
//! [`PortfolioWeights::is_fully_invested`] themselves.

use crate::error::{Result, RiskError};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Tolerance used by [`PortfolioWeights::is_fully_invested`]
pub const FULL_INVESTMENT_TOLERANCE: f64 = 1e-9;

/// Weight vector over the asset universe, in returns-table column order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct PortfolioWeights {
    weights: DVector<f64>,
}

impl PortfolioWeights {
    /// Wrap an arbitrary weight vector
    ///
    /// Only empty vectors and non-finite entries are rejected.
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(RiskError::InvalidArgument(
                "portfolio must contain at least one asset".to_string(),
            ));
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite()) {
            return Err(RiskError::InvalidArgument(format!(
                "portfolio weight must be finite, got {}",
                w
            )));
        }

        Ok(Self {
            weights: DVector::from_vec(weights),
        })
    }

    /// Equal-weight portfolio: every entry is `1/n`
    ///
    /// # Example
    ///
    /// ```
    /// use mc_risk::PortfolioWeights;
    ///
    /// let w = PortfolioWeights::equal_weight(4).unwrap();
    /// assert_eq!(w.as_slice(), &[0.25, 0.25, 0.25, 0.25]);
    /// ```
    pub fn equal_weight(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(RiskError::InvalidArgument(
                "equal-weight portfolio needs n > 0 assets".to_string(),
            ));
        }
        Ok(Self {
            weights: DVector::from_element(n, 1.0 / n as f64),
        })
    }

    /// Number of assets
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn as_vector(&self) -> &DVector<f64> {
        &self.weights
    }

    pub fn as_slice(&self) -> &[f64] {
        self.weights.as_slice()
    }

    /// Sum of all weights (net exposure)
    pub fn sum(&self) -> f64 {
        self.weights.sum()
    }

    /// Whether weights sum to one within [`FULL_INVESTMENT_TOLERANCE`]
    pub fn is_fully_invested(&self) -> bool {
        (self.sum() - 1.0).abs() <= FULL_INVESTMENT_TOLERANCE
    }

    /// Whether any weight is negative
    pub fn has_short_positions(&self) -> bool {
        self.weights.iter().any(|w| *w < 0.0)
    }

    /// Expected portfolio return `wᵀμ`
    pub fn expected_return(&self, mean: &DVector<f64>) -> Result<f64> {
        if mean.len() != self.len() {
            return Err(RiskError::dimension("mean vector", self.len(), mean.len()));
        }
        Ok(self.weights.dot(mean))
    }

    /// Portfolio variance `wᵀΣw`
    pub fn variance(&self, covariance: &DMatrix<f64>) -> Result<f64> {
        if covariance.nrows() != self.len() || covariance.ncols() != self.len() {
            return Err(RiskError::dimension(
                "covariance matrix",
                self.len(),
                covariance.nrows().max(covariance.ncols()),
            ));
        }
        Ok((self.weights.transpose() * covariance * &self.weights)[(0, 0)])
    }
}

impl TryFrom<Vec<f64>> for PortfolioWeights {
    type Error = RiskError;

    fn try_from(weights: Vec<f64>) -> Result<Self> {
        Self::new(weights)
    }
}

impl From<PortfolioWeights> for Vec<f64> {
    fn from(weights: PortfolioWeights) -> Self {
        weights.weights.iter().copied().collect()
    }
}
