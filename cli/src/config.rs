use crate::report::OutputFormat;
use anyhow::{Context, Result};
use mc_risk::{LoaderConfig, PipelineConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// `mcrisk run` configuration file
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    pub data: LoaderConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Write the report here instead of stdout
    pub path: Option<PathBuf>,
}

impl RunConfig {
    /// Load a YAML file; a relative data path is taken from the file's directory
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: RunConfig = serde_yaml::from_str(&contents)?;
        config.pipeline.validate()?;

        if config.data.path.is_relative() {
            if let Some(dir) = path.parent() {
                config.data.path = dir.join(&config.data.path);
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_risk::WeightScheme;

    #[test]
    fn test_load_resolves_relative_data_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        fs::write(
            &path,
            "data:\n  path: returns.csv\npipeline:\n  n_simulations: 500\noutput:\n  format: json\n",
        )
        .unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.data.path, dir.path().join("returns.csv"));
        assert_eq!(config.pipeline.n_simulations, 500);
        assert_eq!(config.pipeline.weights, WeightScheme::EqualWeight);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.path.is_none());
    }

    #[test]
    fn test_load_rejects_invalid_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        fs::write(&path, "data:\n  path: r.csv\npipeline:\n  n_simulations: 0\n").unwrap();
        assert!(RunConfig::load(&path).is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.yaml");
        let config = RunConfig::load(Path::new(path)).unwrap();
        assert_eq!(config.pipeline.scenarios.len(), 3);
        assert_eq!(config.output.format, OutputFormat::Text);
    }
}
