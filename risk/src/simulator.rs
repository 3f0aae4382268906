//! Monte Carlo simulation of portfolio returns
//!
//! Joint asset returns are drawn exactly from N(μ, Σ) as `x = μ + L z`,
//! where `z` is a vector of independent standard normals and `L Lᵗ = Σ`.
//! `L` is the Cholesky factor when Σ is positive definite. Singular but
//! valid matrices (perfectly correlated assets, zero-variance assets) fall
//! back to the symmetric eigen factor `V √Λ`, which is equally exact.

use crate::error::{Result, RiskError};
use crate::estimator::{check_covariance_with, CovarianceMatrix, CovarianceTolerance, MeanVector};
use crate::weights::PortfolioWeights;
use nalgebra::{DMatrix, SymmetricEigen};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

/// How the covariance factor was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Factorization {
    Cholesky,
    Eigen,
}

/// Simulated portfolio returns from one call to [`MonteCarloSimulator::simulate`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedReturns {
    returns: Vec<f64>,
    factorization: Factorization,
}

impl SimulatedReturns {
    pub fn as_slice(&self) -> &[f64] {
        &self.returns
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    pub fn factorization(&self) -> Factorization {
        self.factorization
    }

    /// Sample mean of the simulated portfolio returns
    pub fn mean(&self) -> f64 {
        self.returns.iter().mean()
    }

    /// Sample variance (n−1 denominator)
    pub fn variance(&self) -> f64 {
        self.returns.iter().variance()
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.returns
    }
}

impl AsRef<[f64]> for SimulatedReturns {
    fn as_ref(&self) -> &[f64] {
        &self.returns
    }
}

/// Draws multivariate-normal asset returns from an injected random source
///
/// # Example
///
/// ```
/// use mc_risk::{MonteCarloSimulator, PortfolioWeights};
/// use nalgebra::{DMatrix, DVector};
///
/// let mean = DVector::from_vec(vec![0.001, 0.002]);
/// let cov = DMatrix::from_row_slice(2, 2, &[0.0004, 0.0001, 0.0001, 0.0009]);
/// let weights = PortfolioWeights::equal_weight(2).unwrap();
///
/// let mut sim = MonteCarloSimulator::seeded(42);
/// let sample = sim.simulate(&mean, &cov, &weights, 1_000).unwrap();
/// assert_eq!(sample.len(), 1_000);
/// ```
#[derive(Debug, Clone)]
pub struct MonteCarloSimulator<R = StdRng> {
    rng: R,
    tolerance: CovarianceTolerance,
}

impl MonteCarloSimulator<StdRng> {
    /// Reproducible simulator
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Nondeterministic simulator seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> MonteCarloSimulator<R> {
    /// Wrap any random source
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            tolerance: CovarianceTolerance::default(),
        }
    }

    /// Override the tolerances used to validate incoming covariance matrices
    pub fn with_tolerance(mut self, tolerance: CovarianceTolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Simulate `n_simulations` portfolio returns `wᵀx`, `x ~ N(mean, covariance)`
    ///
    /// The covariance matrix is validated before any entropy is consumed.
    pub fn simulate(
        &mut self,
        mean: &MeanVector,
        covariance: &CovarianceMatrix,
        weights: &PortfolioWeights,
        n_simulations: usize,
    ) -> Result<SimulatedReturns> {
        if weights.len() != mean.len() {
            return Err(RiskError::dimension("weights", mean.len(), weights.len()));
        }

        let (draws, factorization) = self.draw(mean, covariance, n_simulations)?;
        let returns = (&draws * weights.as_vector()).iter().copied().collect();

        Ok(SimulatedReturns {
            returns,
            factorization,
        })
    }

    /// Simulate raw joint asset returns, one row per trial (M×N)
    pub fn simulate_asset_returns(
        &mut self,
        mean: &MeanVector,
        covariance: &CovarianceMatrix,
        n_simulations: usize,
    ) -> Result<DMatrix<f64>> {
        self.draw(mean, covariance, n_simulations)
            .map(|(draws, _)| draws)
    }

    fn draw(
        &mut self,
        mean: &MeanVector,
        covariance: &CovarianceMatrix,
        n_simulations: usize,
    ) -> Result<(DMatrix<f64>, Factorization)> {
        let n = mean.len();
        if covariance.nrows() != n {
            return Err(RiskError::dimension("covariance rows", n, covariance.nrows()));
        }
        if covariance.ncols() != n {
            return Err(RiskError::dimension("covariance columns", n, covariance.ncols()));
        }
        if n_simulations == 0 {
            return Err(RiskError::InvalidArgument(
                "number of simulations must be positive".to_string(),
            ));
        }
        if mean.iter().any(|m| !m.is_finite()) {
            return Err(RiskError::InvalidArgument(
                "mean vector contains non-finite entries".to_string(),
            ));
        }
        check_covariance_with(covariance, &self.tolerance)?;

        let (factor, factorization) = covariance_factor(covariance);
        debug!(
            n_assets = n,
            n_simulations,
            ?factorization,
            "drawing multivariate normal samples"
        );

        // Row k is (μ + L z_k)ᵀ; z is filled trial by trial so a seed fixes the whole sample
        let rng = &mut self.rng;
        let z = DMatrix::<f64>::from_fn(n, n_simulations, |_, _| rng.sample(StandardNormal));
        let mut draws = (factor * z).transpose();
        for mut row in draws.row_iter_mut() {
            row += mean.transpose();
        }

        Ok((draws, factorization))
    }
}

/// Relative size below which a pivot or eigenvalue counts as zero
const SINGULAR_THRESHOLD: f64 = 1e-12;

/// Lower factor `L` with `L Lᵗ = Σ` for an already validated matrix
fn covariance_factor(covariance: &CovarianceMatrix) -> (DMatrix<f64>, Factorization) {
    let max_variance = covariance.diagonal().amax();
    let min_pivot = (max_variance * SINGULAR_THRESHOLD).sqrt();

    if let Some(chol) = covariance.clone().cholesky() {
        let l = chol.l();
        // Near-singular pivots leave rounding noise on directions that carry no variance
        if l.diagonal().iter().all(|d| d.is_finite() && *d > min_pivot) {
            return (l, Factorization::Cholesky);
        }
    }

    let eigen = SymmetricEigen::new(covariance.clone());
    let cutoff = eigen.eigenvalues.amax() * SINGULAR_THRESHOLD;
    let roots = eigen
        .eigenvalues
        .map(|v| if v > cutoff { v.sqrt() } else { 0.0 });
    let factor = &eigen.eigenvectors * DMatrix::from_diagonal(&roots);
    (factor, Factorization::Eigen)
}

/// Simulate with a fresh simulator seeded from `seed`, or from entropy when `None`
pub fn simulate_portfolio_returns(
    mean: &MeanVector,
    covariance: &CovarianceMatrix,
    weights: &PortfolioWeights,
    n_simulations: usize,
    seed: Option<u64>,
) -> Result<SimulatedReturns> {
    let mut simulator = match seed {
        Some(seed) => MonteCarloSimulator::seeded(seed),
        None => MonteCarloSimulator::from_entropy(),
    };
    simulator.simulate(mean, covariance, weights, n_simulations)
}
