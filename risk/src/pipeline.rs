//! End-to-end risk run
//!
//! One call takes a returns table through estimation, baseline simulation,
//! every configured stress scenario and the historical cross-check.

use crate::config::PipelineConfig;
use crate::data::{ReturnsLoader, ReturnsTable};
use crate::error::Result;
use crate::estimator::{ParameterEstimates, ParameterEstimator};
use crate::metrics::{parametric_risk, RiskMeasure};
use crate::simulator::MonteCarloSimulator;
use crate::stress::{BranchSettings, StressEngine, StressReport};
use crate::weights::PortfolioWeights;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Name of the unstressed branch in reports
pub const BASELINE: &str = "Baseline";

/// Everything a pipeline run produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub assets: Vec<String>,
    pub n_observations: usize,
    pub weights: Vec<f64>,

    /// Analytic portfolio mean `wᵀμ`
    pub expected_return: f64,

    /// VaR/CVaR of the observed portfolio returns
    pub historical: Vec<RiskMeasure>,

    /// Closed-form normal VaR/CVaR under the fitted parameters
    pub parametric: Vec<RiskMeasure>,

    /// Simulated baseline and stressed branches
    pub stress: StressReport,
}

impl RiskReport {
    /// Baseline simulated measure at `confidence_level`
    pub fn baseline_measure(&self, confidence_level: f64) -> Option<&RiskMeasure> {
        self.stress.baseline.measure(confidence_level)
    }
}

/// Runs the configured analysis over a returns table
#[derive(Debug, Clone)]
pub struct RiskPipeline {
    config: PipelineConfig,
    estimator: ParameterEstimator,
    engine: StressEngine,
}

impl RiskPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            estimator: ParameterEstimator::new(config.tolerance),
            engine: StressEngine::new(config.scenarios.clone()),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load a table and run on it
    pub fn load_and_run(&self, loader: &dyn ReturnsLoader) -> Result<RiskReport> {
        let returns = loader.load()?;
        self.run(&returns)
    }

    pub fn run(&self, returns: &ReturnsTable) -> Result<RiskReport> {
        info!(
            n_assets = returns.n_assets(),
            n_observations = returns.n_observations(),
            n_simulations = self.config.n_simulations,
            n_scenarios = self.engine.scenarios().len(),
            "starting risk run"
        );

        let weights = self.config.weights.resolve(returns.n_assets())?;
        if !weights.is_fully_invested() {
            warn!(sum = weights.sum(), "portfolio weights do not sum to 1");
        }

        let estimates = self.estimator.estimate(returns)?;
        let settings = BranchSettings {
            n_simulations: self.config.n_simulations,
            confidence_levels: self.config.confidence_levels.clone(),
        };

        let baseline = self.engine.run_branch(
            BASELINE,
            &estimates,
            &estimates.covariance,
            &weights,
            &mut self.simulator(),
            &settings,
        )?;

        let mut outcomes = Vec::with_capacity(self.engine.scenarios().len());
        for scenario in self.engine.scenarios() {
            let outcome = self.engine.run_scenario(
                scenario,
                &estimates,
                &weights,
                &mut self.simulator(),
                &settings,
            )?;
            info!(
                scenario = scenario.name(),
                portfolio_volatility = outcome.portfolio_volatility,
                "stress scenario complete"
            );
            outcomes.push(outcome);
        }
        let stress = self.engine.generate_report(baseline, outcomes)?;

        let historical = self.historical_measures(returns, &weights)?;
        let parametric = self.parametric_measures(&estimates, &weights)?;

        if let Some(worst) = &stress.worst_scenario {
            info!(worst_scenario = %worst, "risk run complete");
        } else {
            info!("risk run complete");
        }

        Ok(RiskReport {
            assets: returns.assets().to_vec(),
            n_observations: estimates.n_observations,
            weights: weights.as_slice().to_vec(),
            expected_return: weights.expected_return(&estimates.mean)?,
            historical,
            parametric,
            stress,
        })
    }

    /// Every branch starts from the configured seed so that branch
    /// differences come from the covariance alone
    fn simulator(&self) -> MonteCarloSimulator<StdRng> {
        let simulator = match self.config.seed {
            Some(seed) => MonteCarloSimulator::seeded(seed),
            None => MonteCarloSimulator::from_entropy(),
        };
        simulator.with_tolerance(self.config.tolerance)
    }

    fn historical_measures(
        &self,
        returns: &ReturnsTable,
        weights: &PortfolioWeights,
    ) -> Result<Vec<RiskMeasure>> {
        let observed = returns.portfolio_returns(weights)?;
        self.config
            .confidence_levels
            .iter()
            .map(|&alpha| RiskMeasure::historical(&observed, alpha))
            .collect()
    }

    fn parametric_measures(
        &self,
        estimates: &ParameterEstimates,
        weights: &PortfolioWeights,
    ) -> Result<Vec<RiskMeasure>> {
        self.config
            .confidence_levels
            .iter()
            .map(|&alpha| parametric_risk(&estimates.mean, &estimates.covariance, weights, alpha))
            .collect()
    }
}
