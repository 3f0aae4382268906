//! Value at Risk and Conditional Value at Risk
//!
//! VaR here is a return level, not a positive loss amount: at confidence
//! `alpha` it is the `(1 - alpha)`-quantile of the return sample, so a
//! fraction `alpha` of outcomes are no worse than it. CVaR (expected
//! shortfall) is the mean of the sample at or below that level.
//!
//! Quantiles use linear interpolation between order statistics at rank
//! `h = (n - 1)(1 - alpha)`.

use crate::error::{Result, RiskError};
use crate::estimator::{check_covariance, CovarianceMatrix, MeanVector};
use crate::weights::PortfolioWeights;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use statrs::statistics::Statistics;

/// Where the return sample behind a risk measure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleSource {
    /// Monte Carlo draws from the fitted (or stressed) distribution
    Simulated,
    /// Observed portfolio returns
    Historical,
    /// Closed-form normal quantile, no sample
    Parametric,
}

/// VaR and CVaR at one confidence level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskMeasure {
    pub confidence_level: f64,
    pub var: f64,
    pub cvar: f64,
    pub source: SampleSource,
}

impl RiskMeasure {
    /// VaR/CVaR of a simulated sample
    pub fn simulated(sample: &[f64], alpha: f64) -> Result<Self> {
        Self::from_sample(sample, alpha, SampleSource::Simulated)
    }

    /// VaR/CVaR of an observed sample
    pub fn historical(sample: &[f64], alpha: f64) -> Result<Self> {
        Self::from_sample(sample, alpha, SampleSource::Historical)
    }

    fn from_sample(sample: &[f64], alpha: f64, source: SampleSource) -> Result<Self> {
        let sorted = sorted_sample(sample, alpha)?;
        let var = quantile_sorted(&sorted, 1.0 - alpha);
        let cvar = tail_mean(&sorted, var);

        Ok(Self {
            confidence_level: alpha,
            var,
            cvar,
            source,
        })
    }
}

/// `(1 - alpha)`-quantile of a return sample
///
/// # Example
///
/// ```
/// use mc_risk::value_at_risk;
///
/// let sample: Vec<f64> = (1..=101).map(|i| i as f64).collect();
/// let var = value_at_risk(&sample, 0.95).unwrap();
/// assert!((var - 6.0).abs() < 1e-9);
/// ```
pub fn value_at_risk(sample: &[f64], alpha: f64) -> Result<f64> {
    let sorted = sorted_sample(sample, alpha)?;
    Ok(quantile_sorted(&sorted, 1.0 - alpha))
}

/// Mean of sample values at or below the VaR at `alpha`
///
/// Equals the VaR itself when no value falls in the tail.
pub fn conditional_value_at_risk(sample: &[f64], alpha: f64) -> Result<f64> {
    let sorted = sorted_sample(sample, alpha)?;
    let var = quantile_sorted(&sorted, 1.0 - alpha);
    Ok(tail_mean(&sorted, var))
}

/// VaR of observed (not simulated) portfolio returns
///
/// Same quantile contract as [`value_at_risk`]; kept as its own entry point
/// so historical and simulated figures cannot be mixed up at call sites.
pub fn historical_var(observed_returns: &[f64], alpha: f64) -> Result<f64> {
    value_at_risk(observed_returns, alpha)
}

/// Closed-form VaR/CVaR of `wᵀx` for `x ~ N(mean, covariance)`
///
/// VaR = μp + z σp and CVaR = μp − σp φ(z) / (1 − α), with z = Φ⁻¹(1 − α).
/// Serves as a cross-check for simulated figures.
pub fn parametric_risk(
    mean: &MeanVector,
    covariance: &CovarianceMatrix,
    weights: &PortfolioWeights,
    alpha: f64,
) -> Result<RiskMeasure> {
    validate_alpha(alpha)?;
    check_covariance(covariance)?;

    let mu = weights.expected_return(mean)?;
    let sigma = weights.variance(covariance)?.max(0.0).sqrt();

    let normal =
        Normal::new(0.0, 1.0).map_err(|e| RiskError::InvalidArgument(e.to_string()))?;
    let z = normal.inverse_cdf(1.0 - alpha);

    Ok(RiskMeasure {
        confidence_level: alpha,
        var: mu + z * sigma,
        cvar: mu - sigma * normal.pdf(z) / (1.0 - alpha),
        source: SampleSource::Parametric,
    })
}

/// Descriptive statistics of a return sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n−1); NaN for a single observation
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl SampleSummary {
    pub fn from_sample(sample: &[f64]) -> Result<Self> {
        if sample.is_empty() {
            return Err(RiskError::EmptySample);
        }

        Ok(Self {
            count: sample.len(),
            mean: sample.iter().mean(),
            std_dev: sample.iter().std_dev(),
            min: Statistics::min(sample.iter()),
            max: Statistics::max(sample.iter()),
        })
    }
}

fn validate_alpha(alpha: f64) -> Result<()> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(RiskError::InvalidArgument(format!(
            "confidence level must be in (0, 1), got {}",
            alpha
        )));
    }
    Ok(())
}

fn sorted_sample(sample: &[f64], alpha: f64) -> Result<Vec<f64>> {
    validate_alpha(alpha)?;
    if sample.is_empty() {
        return Err(RiskError::EmptySample);
    }
    if sample.iter().any(|v| !v.is_finite()) {
        return Err(RiskError::InvalidArgument(
            "return sample contains non-finite values".to_string(),
        ));
    }

    let mut sorted = sample.to_vec();
    sorted.sort_by(f64::total_cmp);
    Ok(sorted)
}

fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = h - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

fn tail_mean(sorted: &[f64], var: f64) -> f64 {
    let tail_len = sorted.partition_point(|v| *v <= var);
    if tail_len == 0 {
        return var;
    }
    // Running mean is exact on a flat tail; rounding elsewhere may still overshoot
    sorted[..tail_len].iter().mean().min(var)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    fn create_test_returns() -> Vec<f64> {
        vec![
            -0.05, -0.03, -0.02, -0.01, 0.00,
            0.01, 0.02, 0.03, 0.04, 0.05,
            -0.04, 0.01, 0.02, -0.01, 0.03,
            0.00, -0.02, 0.01, 0.02, -0.01,
        ]
    }

    #[test]
    fn test_var_interpolates_between_order_statistics() {
        // sorted: -0.05, -0.04, -0.03, ... ; h = 19 * 0.05 = 0.95
        let var = value_at_risk(&create_test_returns(), 0.95).unwrap();
        assert_relative_eq!(var, -0.05 + 0.95 * 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_var_on_exact_rank() {
        let sample: Vec<f64> = (0..=100).map(|i| i as f64).collect();
        assert_relative_eq!(value_at_risk(&sample, 0.95).unwrap(), 5.0, epsilon = 1e-9);
        assert_relative_eq!(value_at_risk(&sample, 0.99).unwrap(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(value_at_risk(&sample, 0.5).unwrap(), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_var_ignores_input_order() {
        let mut sample = create_test_returns();
        let before = value_at_risk(&sample, 0.9).unwrap();
        sample.reverse();
        assert_eq!(value_at_risk(&sample, 0.9).unwrap(), before);
    }

    #[test]
    fn test_cvar_is_tail_mean() {
        let sample: Vec<f64> = (0..=100).map(|i| i as f64).collect();
        // values <= 5.0 are 0..=5
        assert_relative_eq!(conditional_value_at_risk(&sample, 0.95).unwrap(), 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_cvar_not_above_var() {
        let returns = create_test_returns();
        for alpha in [0.5, 0.9, 0.95, 0.99] {
            let m = RiskMeasure::simulated(&returns, alpha).unwrap();
            assert!(m.cvar <= m.var);
        }
    }

    #[test]
    fn test_degenerate_sample_cvar_equals_var() {
        let sample = vec![0.1; 7];
        assert_eq!(conditional_value_at_risk(&sample, 0.5).unwrap(), 0.1);
        assert_eq!(conditional_value_at_risk(&vec![-0.037; 1000], 0.99).unwrap(), -0.037);
        let m = RiskMeasure::historical(&sample, 0.95).unwrap();
        assert_eq!(m.var, 0.1);
        assert_eq!(m.cvar, 0.1);
        assert_eq!(m.source, SampleSource::Historical);
    }

    #[test]
    fn test_single_value_sample() {
        assert_eq!(value_at_risk(&[-0.02], 0.99).unwrap(), -0.02);
        assert_eq!(conditional_value_at_risk(&[-0.02], 0.99).unwrap(), -0.02);
    }

    #[test]
    fn test_invalid_confidence_level() {
        let returns = create_test_returns();
        for alpha in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
            let err = value_at_risk(&returns, alpha).unwrap_err();
            assert!(matches!(err, RiskError::InvalidArgument(_)));
        }
    }

    #[test]
    fn test_empty_sample() {
        assert!(matches!(value_at_risk(&[], 0.95), Err(RiskError::EmptySample)));
        assert!(matches!(
            conditional_value_at_risk(&[], 0.95),
            Err(RiskError::EmptySample)
        ));
        assert!(matches!(historical_var(&[], 0.95), Err(RiskError::EmptySample)));
    }

    #[test]
    fn test_nan_in_sample_rejected() {
        let err = value_at_risk(&[0.01, f64::NAN], 0.95).unwrap_err();
        assert!(matches!(err, RiskError::InvalidArgument(_)));
    }

    #[test]
    fn test_historical_var_matches_value_at_risk() {
        let returns = create_test_returns();
        assert_eq!(
            historical_var(&returns, 0.99).unwrap(),
            value_at_risk(&returns, 0.99).unwrap()
        );
    }

    #[test]
    fn test_parametric_risk() {
        let mean = DVector::from_vec(vec![0.0, 0.0]);
        let cov = DMatrix::from_row_slice(2, 2, &[0.0004, 0.0, 0.0, 0.0004]);
        let weights = PortfolioWeights::new(vec![1.0, 0.0]).unwrap();

        let m = parametric_risk(&mean, &cov, &weights, 0.95).unwrap();
        // z(0.05) = -1.644854, sigma = 0.02
        assert_relative_eq!(m.var, -1.644_853_626_951 * 0.02, epsilon = 1e-8);
        // phi(z) / 0.05 = 2.062713
        assert_relative_eq!(m.cvar, -2.062_712_807 * 0.02, epsilon = 1e-7);
        assert!(m.cvar < m.var);
    }

    #[test]
    fn test_sample_summary() {
        let summary = SampleSummary::from_sample(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(summary.count, 4);
        assert_relative_eq!(summary.mean, 2.5);
        assert_relative_eq!(summary.std_dev, (5.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 4.0);
        assert!(SampleSummary::from_sample(&[]).is_err());
    }
}
