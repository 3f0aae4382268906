//! Mean/covariance estimation and covariance validation
//!
//! Every covariance matrix that reaches the simulator passes through
//! [`check_covariance`] first, stressed matrices included. A failing matrix
//! is reported, never repaired.

use crate::data::ReturnsTable;
use crate::error::{Result, RiskError};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-asset mean return, in returns-table column order
pub type MeanVector = DVector<f64>;

/// N×N covariance of per-asset returns
pub type CovarianceMatrix = DMatrix<f64>;

/// Tolerances applied by [`check_covariance_with`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CovarianceTolerance {
    /// Absolute bound on `max |Σ - Σᵗ|`
    #[serde(default = "default_symmetry_tolerance")]
    pub symmetry: f64,

    /// Eigenvalues may dip to `-eigenvalue * max(1, spectral radius)`
    #[serde(default = "default_eigenvalue_tolerance")]
    pub eigenvalue: f64,
}

fn default_symmetry_tolerance() -> f64 {
    1e-8
}

fn default_eigenvalue_tolerance() -> f64 {
    1e-10
}

impl Default for CovarianceTolerance {
    fn default() -> Self {
        Self {
            symmetry: default_symmetry_tolerance(),
            eigenvalue: default_eigenvalue_tolerance(),
        }
    }
}

/// Mean vector and covariance matrix estimated from one returns table
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterEstimates {
    pub mean: MeanVector,
    pub covariance: CovarianceMatrix,
    /// Number of observations the estimate was built from
    pub n_observations: usize,
}

/// Estimates distribution parameters and validates them
#[derive(Debug, Clone, Default)]
pub struct ParameterEstimator {
    tolerance: CovarianceTolerance,
}

impl ParameterEstimator {
    pub fn new(tolerance: CovarianceTolerance) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> CovarianceTolerance {
        self.tolerance
    }

    /// Estimate mean and covariance, then validate the covariance
    pub fn estimate(&self, returns: &ReturnsTable) -> Result<ParameterEstimates> {
        let (mean, covariance) = estimate_mean_cov(returns)?;
        check_covariance_with(&covariance, &self.tolerance)?;

        Ok(ParameterEstimates {
            mean,
            covariance,
            n_observations: returns.n_observations(),
        })
    }

    /// Validate any covariance matrix against this estimator's tolerances
    pub fn check(&self, covariance: &CovarianceMatrix) -> Result<()> {
        check_covariance_with(covariance, &self.tolerance)
    }
}

/// Per-column arithmetic mean and sample covariance (divides by T−1)
pub fn estimate_mean_cov(returns: &ReturnsTable) -> Result<(MeanVector, CovarianceMatrix)> {
    let t = returns.n_observations();
    if t < 2 {
        return Err(RiskError::InsufficientData {
            required: 2,
            actual: t,
        });
    }

    let data = returns.as_matrix();
    let n = data.ncols();
    let mean = DVector::from_iterator(n, data.column_iter().map(|col| col.mean()));

    let mut centered = data.clone();
    for (j, mut col) in centered.column_iter_mut().enumerate() {
        col.add_scalar_mut(-mean[j]);
    }

    // Column dot products are order-independent, so the result is exactly symmetric
    let covariance = centered.tr_mul(&centered) / (t - 1) as f64;

    debug!(
        n_assets = n,
        n_observations = t,
        "estimated mean vector and covariance matrix"
    );

    Ok((mean, covariance))
}

/// Validate symmetry and positive semi-definiteness with default tolerances
pub fn check_covariance(covariance: &CovarianceMatrix) -> Result<()> {
    check_covariance_with(covariance, &CovarianceTolerance::default())
}

/// Validate symmetry and positive semi-definiteness
///
/// # Example
///
/// ```
/// use mc_risk::{check_covariance, RiskError};
/// use nalgebra::DMatrix;
///
/// // eigenvalues 3 and -1
/// let sigma = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
/// let err = check_covariance(&sigma).unwrap_err();
/// assert!(matches!(err, RiskError::NotPositiveSemiDefinite { .. }));
/// ```
pub fn check_covariance_with(
    covariance: &CovarianceMatrix,
    tolerance: &CovarianceTolerance,
) -> Result<()> {
    let (rows, cols) = covariance.shape();
    if rows != cols {
        return Err(RiskError::dimension("covariance columns", rows, cols));
    }
    if rows == 0 {
        return Err(RiskError::InvalidArgument(
            "covariance matrix must be at least 1x1".to_string(),
        ));
    }
    if covariance.iter().any(|v| !v.is_finite()) {
        return Err(RiskError::InvalidArgument(
            "covariance matrix contains non-finite entries".to_string(),
        ));
    }

    let max_deviation = (covariance - covariance.transpose()).amax();
    if max_deviation > tolerance.symmetry {
        return Err(RiskError::Asymmetry {
            max_deviation,
            tolerance: tolerance.symmetry,
        });
    }

    let eigenvalues = SymmetricEigen::new(covariance.clone()).eigenvalues;
    let min_eigenvalue = eigenvalues.min();
    let spectral_radius = eigenvalues.amax();
    let floor = -tolerance.eigenvalue * spectral_radius.max(1.0);

    if min_eigenvalue < floor {
        return Err(RiskError::NotPositiveSemiDefinite { min_eigenvalue });
    }

    Ok(())
}

/// Square roots of the diagonal of a covariance matrix
///
/// Fails with `NotPositiveSemiDefinite` on a negative variance, which no
/// valid covariance matrix can have.
pub fn standard_deviations(covariance: &CovarianceMatrix) -> Result<DVector<f64>> {
    if !covariance.is_square() {
        return Err(RiskError::dimension(
            "covariance columns",
            covariance.nrows(),
            covariance.ncols(),
        ));
    }

    let diagonal = covariance.diagonal();
    if let Some(&variance) = diagonal.iter().find(|v| **v < 0.0) {
        return Err(RiskError::NotPositiveSemiDefinite {
            min_eigenvalue: variance,
        });
    }
    Ok(diagonal.map(f64::sqrt))
}

/// Correlation matrix `Σ / (s sᵗ)`
///
/// Assets with zero variance get zero correlation with every other asset
/// and a unit diagonal.
pub fn correlation_matrix(covariance: &CovarianceMatrix) -> Result<DMatrix<f64>> {
    let std_devs = standard_deviations(covariance)?;
    let n = std_devs.len();

    Ok(DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            1.0
        } else {
            let scale = std_devs[i] * std_devs[j];
            if scale > 0.0 {
                covariance[(i, j)] / scale
            } else {
                0.0
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_table() -> ReturnsTable {
        ReturnsTable::from_rows(
            vec!["A".into(), "B".into(), "C".into()],
            &[
                vec![0.010, 0.020, -0.005],
                vec![-0.004, 0.011, 0.003],
                vec![0.007, -0.013, 0.009],
                vec![0.002, 0.004, -0.001],
                vec![-0.009, -0.006, 0.012],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_mean_and_bessel_corrected_covariance() {
        let table = ReturnsTable::from_rows(
            vec!["X".into(), "Y".into()],
            &[vec![1.0, 2.0], vec![3.0, 6.0]],
        )
        .unwrap();

        let (mean, cov) = estimate_mean_cov(&table).unwrap();
        assert_relative_eq!(mean[0], 2.0);
        assert_relative_eq!(mean[1], 4.0);
        // deviations (-1, 1) and (-2, 2), T - 1 = 1
        assert_relative_eq!(cov[(0, 0)], 2.0);
        assert_relative_eq!(cov[(1, 1)], 8.0);
        assert_relative_eq!(cov[(0, 1)], 4.0);
        assert_relative_eq!(cov[(1, 0)], 4.0);
    }

    #[test]
    fn test_covariance_is_symmetric() {
        let (_, cov) = estimate_mean_cov(&sample_table()).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert!((cov[(i, j)] - cov[(j, i)]).abs() < 1e-15);
            }
        }
        check_covariance(&cov).unwrap();
    }

    #[test]
    fn test_single_observation_is_insufficient() {
        let table = ReturnsTable::from_rows(vec!["A".into()], &[vec![0.01]]).unwrap();
        let err = estimate_mean_cov(&table).unwrap_err();
        assert!(matches!(err, RiskError::InsufficientData { required: 2, actual: 1 }));
    }

    #[test]
    fn test_check_covariance_rejects_indefinite_matrix() {
        let sigma = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        match check_covariance(&sigma) {
            Err(RiskError::NotPositiveSemiDefinite { min_eigenvalue }) => {
                assert_relative_eq!(min_eigenvalue, -1.0, epsilon = 1e-12);
            }
            other => panic!("expected NotPositiveSemiDefinite, got {:?}", other),
        }
    }

    #[test]
    fn test_check_covariance_rejects_asymmetric_matrix() {
        let sigma = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.4, 1.0]);
        let err = check_covariance(&sigma).unwrap_err();
        assert!(matches!(err, RiskError::Asymmetry { .. }));
    }

    #[test]
    fn test_check_covariance_accepts_singular_psd() {
        // Perfectly correlated assets: eigenvalues 2 and 0
        let sigma = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        check_covariance(&sigma).unwrap();
    }

    #[test]
    fn test_check_covariance_rejects_non_square() {
        let sigma = DMatrix::<f64>::zeros(2, 3);
        let err = check_covariance(&sigma).unwrap_err();
        assert!(matches!(err, RiskError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_estimator_validates_estimate() {
        let estimator = ParameterEstimator::default();
        let estimates = estimator.estimate(&sample_table()).unwrap();
        assert_eq!(estimates.mean.len(), 3);
        assert_eq!(estimates.covariance.shape(), (3, 3));
        assert_eq!(estimates.n_observations, 5);
    }

    #[test]
    fn test_correlation_matrix_unit_diagonal() {
        let sigma = DMatrix::from_row_slice(2, 2, &[0.0004, 0.0001, 0.0001, 0.0009]);
        let corr = correlation_matrix(&sigma).unwrap();
        assert_relative_eq!(corr[(0, 0)], 1.0);
        assert_relative_eq!(corr[(1, 1)], 1.0);
        assert_relative_eq!(corr[(0, 1)], 0.0001 / (0.02 * 0.03), epsilon = 1e-12);
    }

    #[test]
    fn test_zero_variance_asset_has_zero_correlation() {
        let sigma = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 0.0, 0.0009]);
        let corr = correlation_matrix(&sigma).unwrap();
        assert_eq!(corr[(0, 1)], 0.0);
        assert_eq!(corr[(0, 0)], 1.0);
    }

    #[test]
    fn test_negative_variance_has_no_standard_deviation() {
        let sigma = DMatrix::from_row_slice(1, 1, &[-0.01]);
        assert!(matches!(
            standard_deviations(&sigma),
            Err(RiskError::NotPositiveSemiDefinite { .. })
        ));
    }
}
