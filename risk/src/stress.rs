//! Covariance stress testing
//!
//! Two transforms build "what-if" covariance matrices from a baseline:
//! - Volatility stress: scale every volatility by the same multiplier
//! - Correlation stress: blend correlations toward the identity while
//!   holding each asset's variance fixed
//!
//! Both are pure. Neither checks positive semi-definiteness: stressed
//! matrices are validated when they reach the simulator, like any other
//! covariance matrix.

use crate::error::{Result, RiskError};
use crate::estimator::{CovarianceMatrix, ParameterEstimates};
use crate::metrics::{RiskMeasure, SampleSummary};
use crate::simulator::MonteCarloSimulator;
use crate::weights::PortfolioWeights;
use chrono::{DateTime, Utc};
use nalgebra::DMatrix;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Scale volatilities by `scale`: returns `scale² · Σ`
///
/// # Example
///
/// ```
/// use mc_risk::stress_volatility;
/// use nalgebra::DMatrix;
///
/// let sigma = DMatrix::from_row_slice(2, 2, &[0.0004, 0.0001, 0.0001, 0.0009]);
/// let stressed = stress_volatility(&sigma, 2.0).unwrap();
/// assert_eq!(stressed, DMatrix::from_row_slice(2, 2, &[0.0016, 0.0004, 0.0004, 0.0036]));
/// ```
pub fn stress_volatility(covariance: &CovarianceMatrix, scale: f64) -> Result<CovarianceMatrix> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(RiskError::InvalidArgument(format!(
            "volatility scale must be positive, got {}",
            scale
        )));
    }
    Ok(covariance * (scale * scale))
}

/// Blend correlations toward the identity: `C' = rho·C + (1 − rho)·I`
///
/// Variances are copied from the input unchanged. Off the diagonal
/// `s_i s_j C'_ij = rho · Σ_ij`, so no correlation is ever divided out and
/// zero-variance assets carry their covariances through untouched. `rho = 1`
/// reproduces the baseline, `rho = 0` gives independent assets. `rho` outside
/// `[0, 1]`, like an invalid baseline, yields a matrix that fails validation
/// downstream.
pub fn stress_correlation(covariance: &CovarianceMatrix, rho: f64) -> Result<CovarianceMatrix> {
    if !rho.is_finite() {
        return Err(RiskError::InvalidArgument(format!(
            "correlation blend must be finite, got {}",
            rho
        )));
    }
    if !covariance.is_square() {
        return Err(RiskError::dimension(
            "covariance columns",
            covariance.nrows(),
            covariance.ncols(),
        ));
    }

    let n = covariance.nrows();
    let stressed = DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            covariance[(i, i)]
        } else {
            rho * covariance[(i, j)]
        }
    });

    Ok(stressed)
}

/// A hypothetical market regime expressed as a covariance transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StressScenario {
    /// Multiply every volatility by `scale`
    Volatility { name: String, scale: f64 },

    /// Blend correlations toward the identity with weight `rho` on the baseline
    Correlation { name: String, rho: f64 },

    /// Correlation blend followed by volatility scaling
    Combined { name: String, scale: f64, rho: f64 },
}

impl StressScenario {
    pub fn volatility(scale: f64) -> Self {
        StressScenario::Volatility {
            name: format!("Volatility x{}", scale),
            scale,
        }
    }

    pub fn correlation(rho: f64) -> Self {
        StressScenario::Correlation {
            name: format!("Correlation rho={}", rho),
            rho,
        }
    }

    /// Scenario name used in reports
    pub fn name(&self) -> &str {
        match self {
            StressScenario::Volatility { name, .. }
            | StressScenario::Correlation { name, .. }
            | StressScenario::Combined { name, .. } => name,
        }
    }

    /// Produce the stressed covariance matrix; the baseline is untouched
    pub fn apply(&self, covariance: &CovarianceMatrix) -> Result<CovarianceMatrix> {
        match self {
            StressScenario::Volatility { scale, .. } => stress_volatility(covariance, *scale),
            StressScenario::Correlation { rho, .. } => stress_correlation(covariance, *rho),
            StressScenario::Combined { scale, rho, .. } => {
                let blended = stress_correlation(covariance, *rho)?;
                stress_volatility(&blended, *scale)
            }
        }
    }
}

/// Risk of one branch (baseline or stressed) of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    /// Scenario name ("Baseline" for the unstressed branch)
    pub name: String,

    /// Analytic portfolio volatility `√(wᵀΣw)` under this branch's covariance
    pub portfolio_volatility: f64,

    /// Statistics of the simulated portfolio returns
    pub summary: SampleSummary,

    /// VaR/CVaR at each requested confidence level
    pub measures: Vec<RiskMeasure>,
}

impl ScenarioOutcome {
    /// Measure at a given confidence level, if it was computed
    pub fn measure(&self, confidence_level: f64) -> Option<&RiskMeasure> {
        self.measures
            .iter()
            .find(|m| (m.confidence_level - confidence_level).abs() < 1e-12)
    }
}

/// Change of one scenario's VaR/CVaR against the baseline at one level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressComparison {
    pub scenario: String,
    pub confidence_level: f64,
    pub baseline_var: f64,
    pub stressed_var: f64,
    /// `stressed_var - baseline_var`; negative means a deeper loss threshold
    pub var_change: f64,
    pub baseline_cvar: f64,
    pub stressed_cvar: f64,
    pub cvar_change: f64,
}

/// Baseline against every stressed branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressReport {
    pub baseline: ScenarioOutcome,
    pub scenarios: Vec<ScenarioOutcome>,
    pub comparisons: Vec<StressComparison>,

    /// Scenario with the lowest CVaR at the highest confidence level
    pub worst_scenario: Option<String>,

    pub timestamp: DateTime<Utc>,
}

/// Simulation size and confidence levels shared by every branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSettings {
    pub n_simulations: usize,
    pub confidence_levels: Vec<f64>,
}

/// Runs stress scenarios against a baseline estimate
#[derive(Debug, Clone, Default)]
pub struct StressEngine {
    scenarios: Vec<StressScenario>,
}

impl StressEngine {
    pub fn new(scenarios: Vec<StressScenario>) -> Self {
        Self { scenarios }
    }

    /// Volatility doubling and a 0.7 correlation blend
    pub fn with_default_scenarios() -> Self {
        Self::new(vec![
            StressScenario::volatility(2.0),
            StressScenario::correlation(0.7),
        ])
    }

    pub fn add_scenario(&mut self, scenario: StressScenario) {
        self.scenarios.push(scenario);
    }

    pub fn scenarios(&self) -> &[StressScenario] {
        &self.scenarios
    }

    /// Simulate one branch under `covariance` and measure it
    pub fn run_branch<R: Rng>(
        &self,
        name: &str,
        estimates: &ParameterEstimates,
        covariance: &CovarianceMatrix,
        weights: &PortfolioWeights,
        simulator: &mut MonteCarloSimulator<R>,
        settings: &BranchSettings,
    ) -> Result<ScenarioOutcome> {
        let sample =
            simulator.simulate(&estimates.mean, covariance, weights, settings.n_simulations)?;

        let measures = settings
            .confidence_levels
            .iter()
            .map(|&alpha| RiskMeasure::simulated(sample.as_slice(), alpha))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            scenario = name,
            n_simulations = settings.n_simulations,
            "measured branch"
        );

        Ok(ScenarioOutcome {
            name: name.to_string(),
            portfolio_volatility: weights.variance(covariance)?.max(0.0).sqrt(),
            summary: SampleSummary::from_sample(sample.as_slice())?,
            measures,
        })
    }

    /// Apply `scenario` to the baseline covariance, then simulate and measure
    pub fn run_scenario<R: Rng>(
        &self,
        scenario: &StressScenario,
        estimates: &ParameterEstimates,
        weights: &PortfolioWeights,
        simulator: &mut MonteCarloSimulator<R>,
        settings: &BranchSettings,
    ) -> Result<ScenarioOutcome> {
        let stressed = scenario.apply(&estimates.covariance)?;
        self.run_branch(scenario.name(), estimates, &stressed, weights, simulator, settings)
    }

    /// Compare every scenario outcome against the baseline
    pub fn generate_report(
        &self,
        baseline: ScenarioOutcome,
        scenarios: Vec<ScenarioOutcome>,
    ) -> Result<StressReport> {
        let mut comparisons = Vec::new();
        for outcome in &scenarios {
            for base in &baseline.measures {
                let stressed = outcome.measure(base.confidence_level).ok_or_else(|| {
                    RiskError::InvalidArgument(format!(
                        "scenario '{}' has no measure at confidence level {}",
                        outcome.name, base.confidence_level
                    ))
                })?;

                comparisons.push(StressComparison {
                    scenario: outcome.name.clone(),
                    confidence_level: base.confidence_level,
                    baseline_var: base.var,
                    stressed_var: stressed.var,
                    var_change: stressed.var - base.var,
                    baseline_cvar: base.cvar,
                    stressed_cvar: stressed.cvar,
                    cvar_change: stressed.cvar - base.cvar,
                });
            }
        }

        let top_level = baseline
            .measures
            .iter()
            .map(|m| m.confidence_level)
            .fold(f64::NEG_INFINITY, f64::max);

        let worst_scenario = comparisons
            .iter()
            .filter(|c| c.confidence_level == top_level)
            .min_by(|a, b| a.stressed_cvar.total_cmp(&b.stressed_cvar))
            .map(|c| c.scenario.clone());

        Ok(StressReport {
            baseline,
            scenarios,
            comparisons,
            worst_scenario,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::check_covariance;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    fn sigma() -> CovarianceMatrix {
        DMatrix::from_row_slice(2, 2, &[0.0004, 0.0001, 0.0001, 0.0009])
    }

    fn three_asset_sigma() -> CovarianceMatrix {
        DMatrix::from_row_slice(
            3,
            3,
            &[
                0.0400, 0.0120, -0.0040,
                0.0120, 0.0900, 0.0270,
                -0.0040, 0.0270, 0.0100,
            ],
        )
    }

    #[test]
    fn test_stress_volatility_doubles() {
        let stressed = stress_volatility(&sigma(), 2.0).unwrap();
        let expected = DMatrix::from_row_slice(2, 2, &[0.0016, 0.0004, 0.0004, 0.0036]);
        assert_eq!(stressed, expected);
    }

    #[test]
    fn test_stress_volatility_composes() {
        let base = three_asset_sigma();
        let twice = stress_volatility(&stress_volatility(&base, 1.5).unwrap(), 0.8).unwrap();
        let once = stress_volatility(&base, 1.5 * 0.8).unwrap();
        for (a, b) in twice.iter().zip(once.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-15, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_stress_volatility_rejects_non_positive_scale() {
        for scale in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = stress_volatility(&sigma(), scale).unwrap_err();
            assert!(matches!(err, RiskError::InvalidArgument(_)));
        }
    }

    #[test]
    fn test_stress_does_not_mutate_baseline() {
        let base = three_asset_sigma();
        let copy = base.clone();
        let _ = stress_volatility(&base, 3.0).unwrap();
        let _ = stress_correlation(&base, 0.2).unwrap();
        assert_eq!(base, copy);
    }

    #[test]
    fn test_stress_correlation_identity_blend() {
        let base = three_asset_sigma();
        let stressed = stress_correlation(&base, 1.0).unwrap();
        assert_eq!(stressed, base);
    }

    #[test]
    fn test_stress_correlation_keeps_invalid_baseline_invalid() {
        // Zero variance with a nonzero covariance is not a covariance matrix
        let base = DMatrix::from_row_slice(2, 2, &[0.0, 0.1, 0.1, 1.0]);
        assert!(check_covariance(&base).is_err());

        let stressed = stress_correlation(&base, 1.0).unwrap();
        assert_eq!(stressed, base);
        assert!(matches!(
            check_covariance(&stressed),
            Err(RiskError::NotPositiveSemiDefinite { .. })
        ));

        let weights = PortfolioWeights::equal_weight(2).unwrap();
        let mean = DVector::from_vec(vec![0.0, 0.0]);
        let err = MonteCarloSimulator::seeded(1)
            .simulate(&mean, &stressed, &weights, 10)
            .unwrap_err();
        assert!(matches!(err, RiskError::NotPositiveSemiDefinite { .. }));
    }

    #[test]
    fn test_stress_correlation_defers_negative_variance() {
        let base = DMatrix::from_row_slice(2, 2, &[-0.01, 0.0, 0.0, 1.0]);
        let stressed = stress_correlation(&base, 0.5).unwrap();
        assert_eq!(stressed[(0, 0)], -0.01);
        assert!(matches!(
            check_covariance(&stressed),
            Err(RiskError::NotPositiveSemiDefinite { .. })
        ));
    }

    #[test]
    fn test_stress_correlation_rejects_non_square() {
        let err = stress_correlation(&DMatrix::zeros(2, 3), 0.5).unwrap_err();
        assert!(matches!(err, RiskError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_stress_correlation_zero_is_diagonal() {
        let base = three_asset_sigma();
        let stressed = stress_correlation(&base, 0.0).unwrap();
        assert_eq!(stressed, DMatrix::from_diagonal(&base.diagonal()));
    }

    #[test]
    fn test_stress_correlation_preserves_variances() {
        let base = three_asset_sigma();
        let stressed = stress_correlation(&base, 0.7).unwrap();
        assert_eq!(stressed.diagonal(), base.diagonal());
        assert_relative_eq!(stressed[(0, 1)], 0.7 * 0.0120, epsilon = 1e-15);
        assert_eq!(stressed[(0, 1)], stressed[(1, 0)]);
        check_covariance(&stressed).unwrap();
    }

    #[test]
    fn test_stress_correlation_out_of_range_fails_later() {
        // Strong correlations amplified beyond 1 break positive semi-definiteness
        let base = DMatrix::from_row_slice(2, 2, &[1.0, 0.9, 0.9, 1.0]);
        let stressed = stress_correlation(&base, 1.5).unwrap();
        assert_relative_eq!(stressed[(0, 1)], 1.35, epsilon = 1e-12);
        let err = check_covariance(&stressed).unwrap_err();
        assert!(matches!(err, RiskError::NotPositiveSemiDefinite { .. }));
    }

    #[test]
    fn test_stress_correlation_rejects_nan_rho() {
        assert!(matches!(
            stress_correlation(&sigma(), f64::NAN),
            Err(RiskError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_combined_scenario() {
        let scenario = StressScenario::Combined {
            name: "Crisis".to_string(),
            scale: 2.0,
            rho: 0.5,
        };
        let stressed = scenario.apply(&sigma()).unwrap();
        assert_relative_eq!(stressed[(0, 0)], 0.0016, epsilon = 1e-15);
        assert_relative_eq!(stressed[(0, 1)], 4.0 * 0.5 * 0.0001, epsilon = 1e-15);
        assert_eq!(scenario.name(), "Crisis");
    }

    #[test]
    fn test_scenario_yaml() {
        let yaml = r#"
- type: Volatility
  name: "Vol spike"
  scale: 2.5
- type: Correlation
  name: "Contagion"
  rho: 0.9
"#;
        let scenarios: Vec<StressScenario> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].name(), "Vol spike");
        assert!(matches!(scenarios[1], StressScenario::Correlation { rho, .. } if rho == 0.9));
    }

    #[test]
    fn test_volatility_stress_widens_tail() {
        let estimates = ParameterEstimates {
            mean: DVector::from_vec(vec![0.001, 0.002]),
            covariance: sigma(),
            n_observations: 250,
        };
        let weights = PortfolioWeights::equal_weight(2).unwrap();
        let engine = StressEngine::with_default_scenarios();
        let settings = BranchSettings {
            n_simulations: 20_000,
            confidence_levels: vec![0.95, 0.99],
        };

        let baseline = engine
            .run_branch(
                "Baseline",
                &estimates,
                &estimates.covariance,
                &weights,
                &mut MonteCarloSimulator::seeded(1),
                &settings,
            )
            .unwrap();

        // Same seed per branch: the stressed samples are transforms of the baseline draws
        let stressed: Vec<ScenarioOutcome> = engine
            .scenarios()
            .iter()
            .map(|s| {
                let mut sim = MonteCarloSimulator::seeded(1);
                engine
                    .run_scenario(s, &estimates, &weights, &mut sim, &settings)
                    .unwrap()
            })
            .collect();

        let report = engine.generate_report(baseline, stressed).unwrap();
        assert_eq!(report.comparisons.len(), 4);

        let vol = report
            .comparisons
            .iter()
            .find(|c| c.scenario == "Volatility x2" && c.confidence_level == 0.99)
            .unwrap();
        assert!(vol.var_change < 0.0);
        assert!(vol.cvar_change < 0.0);
        assert_eq!(report.worst_scenario.as_deref(), Some("Volatility x2"));
    }
}
