//! # mc-risk: Monte Carlo portfolio risk with covariance stress testing
//!
//! Estimates a multivariate normal model of asset returns from history,
//! simulates portfolio returns from it and reports Value at Risk and
//! Conditional Value at Risk, for the fitted covariance and for stressed
//! variants of it.
//!
//! ## Core Components
//!
//! - **ParameterEstimator**: mean vector and sample covariance, validated
//! - **MonteCarloSimulator**: exact correlated normal draws (`μ + L z`)
//! - **Metrics**: quantile VaR, tail-mean CVaR, historical and parametric checks
//! - **StressEngine**: volatility scaling and correlation blending scenarios
//! - **RiskPipeline**: the whole run, configured from YAML or JSON
//!
//! ## Example Usage
//!
//! ```rust
//! use mc_risk::{PipelineConfig, ReturnsTable, RiskPipeline};
//!
//! let rows: Vec<Vec<f64>> = (0..100)
//!     .map(|t| {
//!         let shock = (t as f64 * 0.37).sin() * 0.01;
//!         vec![shock, 0.5 * shock + (t as f64 * 0.91).cos() * 0.02]
//!     })
//!     .collect();
//! let returns = ReturnsTable::from_rows(vec!["SPY".into(), "TLT".into()], &rows).unwrap();
//!
//! let config = PipelineConfig::from_yaml(r#"
//! n_simulations: 2000
//! seed: 42
//! scenarios:
//!   - type: Volatility
//!     name: "Volatility x2"
//!     scale: 2.0
//! "#).unwrap();
//!
//! let report = RiskPipeline::new(config).unwrap().run(&returns).unwrap();
//! let baseline = report.baseline_measure(0.99).unwrap();
//! assert!(baseline.cvar <= baseline.var);
//! assert_eq!(report.stress.worst_scenario.as_deref(), Some("Volatility x2"));
//! ```

mod config;
mod data;
mod error;
mod estimator;
mod metrics;
mod pipeline;
mod simulator;
mod stress;
mod weights;

pub use config::{PipelineConfig, WeightScheme};
pub use data::{
    log_returns, write_returns_csv, write_returns_csv_path, CsvReturnsLoader,
    InMemoryReturnsLoader, LoaderConfig, PriceTable, ReturnsLoader, ReturnsTable,
};
pub use error::{Result, RiskError};
pub use estimator::{
    check_covariance, check_covariance_with, correlation_matrix, estimate_mean_cov,
    standard_deviations, CovarianceMatrix, CovarianceTolerance, MeanVector, ParameterEstimates,
    ParameterEstimator,
};
pub use metrics::{
    conditional_value_at_risk, historical_var, parametric_risk, value_at_risk, RiskMeasure,
    SampleSource, SampleSummary,
};
pub use pipeline::{RiskPipeline, RiskReport, BASELINE};
pub use simulator::{simulate_portfolio_returns, Factorization, MonteCarloSimulator, SimulatedReturns};
pub use stress::{
    stress_correlation, stress_volatility, BranchSettings, ScenarioOutcome, StressComparison,
    StressEngine, StressReport, StressScenario,
};
pub use weights::{PortfolioWeights, FULL_INVESTMENT_TOLERANCE};
