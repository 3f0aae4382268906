//! Pipeline configuration
//!
//! Loaded from YAML or JSON. Every field has a default, so an empty
//! document is a valid configuration.
//!
//! ```yaml
//! n_simulations: 10000
//! confidence_levels: [0.95, 0.99]
//! seed: 42
//! weights:
//!   type: EqualWeight
//! scenarios:
//!   - type: Volatility
//!     name: "Volatility x2"
//!     scale: 2.0
//!   - type: Correlation
//!     name: "Contagion"
//!     rho: 0.7
//! ```

use crate::error::{Result, RiskError};
use crate::estimator::CovarianceTolerance;
use crate::stress::{StressEngine, StressScenario};
use crate::weights::PortfolioWeights;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How portfolio weights are chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum WeightScheme {
    /// `1/N` in every asset
    #[default]
    EqualWeight,

    /// Caller-supplied weights in returns-table column order
    Custom { weights: PortfolioWeights },
}

impl WeightScheme {
    /// Weights for a universe of `n_assets`
    pub fn resolve(&self, n_assets: usize) -> Result<PortfolioWeights> {
        match self {
            WeightScheme::EqualWeight => PortfolioWeights::equal_weight(n_assets),
            WeightScheme::Custom { weights } => {
                if weights.len() != n_assets {
                    return Err(RiskError::dimension("custom weights", n_assets, weights.len()));
                }
                Ok(weights.clone())
            }
        }
    }
}

/// Full risk pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Monte Carlo draws per branch
    #[serde(default = "default_n_simulations")]
    pub n_simulations: usize,

    /// Confidence levels for VaR/CVaR
    #[serde(default = "default_confidence_levels")]
    pub confidence_levels: Vec<f64>,

    /// Seed shared by every branch. `None` draws from OS entropy
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub weights: WeightScheme,

    /// Stress branches compared against the baseline
    #[serde(default = "default_scenarios")]
    pub scenarios: Vec<StressScenario>,

    #[serde(default)]
    pub tolerance: CovarianceTolerance,
}

fn default_n_simulations() -> usize {
    10_000
}

fn default_confidence_levels() -> Vec<f64> {
    vec![0.95, 0.99]
}

fn default_scenarios() -> Vec<StressScenario> {
    StressEngine::with_default_scenarios().scenarios().to_vec()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            n_simulations: default_n_simulations(),
            confidence_levels: default_confidence_levels(),
            seed: None,
            weights: WeightScheme::default(),
            scenarios: default_scenarios(),
            tolerance: CovarianceTolerance::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json` file, or YAML for any other extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Reject parameters no run could succeed with
    pub fn validate(&self) -> Result<()> {
        if self.n_simulations == 0 {
            return Err(RiskError::InvalidArgument(
                "n_simulations must be positive".to_string(),
            ));
        }
        if self.confidence_levels.is_empty() {
            return Err(RiskError::InvalidArgument(
                "at least one confidence level is required".to_string(),
            ));
        }
        if let Some(alpha) = self
            .confidence_levels
            .iter()
            .find(|a| !(**a > 0.0 && **a < 1.0))
        {
            return Err(RiskError::InvalidArgument(format!(
                "confidence level must be in (0, 1), got {}",
                alpha
            )));
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
