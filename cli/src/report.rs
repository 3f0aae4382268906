//! Text and JSON rendering of results

use anyhow::Result;
use clap::ValueEnum;
use mc_risk::{
    correlation_matrix, ParameterEstimates, RiskMeasure, RiskReport, SampleSummary,
    StressReport,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Serialize)]
struct EstimatesView<'a> {
    assets: &'a [String],
    n_observations: usize,
    mean: Vec<f64>,
    covariance: Vec<Vec<f64>>,
    correlation: Vec<Vec<f64>>,
}

#[derive(Debug, Serialize)]
struct MeasuresView<'a> {
    summary: &'a SampleSummary,
    measures: &'a [RiskMeasure],
}

pub fn render_estimates(
    assets: &[String],
    estimates: &ParameterEstimates,
    format: OutputFormat,
) -> Result<String> {
    let n = estimates.mean.len();
    let correlation = correlation_matrix(&estimates.covariance)?;
    let rows = |m: &mc_risk::CovarianceMatrix| -> Vec<Vec<f64>> {
        (0..n).map(|i| m.row(i).iter().copied().collect()).collect()
    };

    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&EstimatesView {
            assets,
            n_observations: estimates.n_observations,
            mean: estimates.mean.iter().copied().collect(),
            covariance: rows(&estimates.covariance),
            correlation: rows(&correlation),
        })?),
        OutputFormat::Text => {
            let mut out = String::new();
            writeln!(out, "Observations: {}", estimates.n_observations)?;
            writeln!(out, "{:<12} {:>12} {:>12}", "Asset", "Mean", "Volatility")?;
            for (i, asset) in assets.iter().enumerate() {
                writeln!(
                    out,
                    "{:<12} {:>12.6} {:>12.6}",
                    asset,
                    estimates.mean[i],
                    estimates.covariance[(i, i)].max(0.0).sqrt()
                )?;
            }
            writeln!(out, "\nCovariance:{:.8}", estimates.covariance)?;
            writeln!(out, "Correlation:{:.4}", correlation)?;
            Ok(out)
        }
    }
}

pub fn render_measures(
    summary: &SampleSummary,
    measures: &[RiskMeasure],
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&MeasuresView { summary, measures })?),
        OutputFormat::Text => {
            let mut out = String::new();
            write_summary(&mut out, summary)?;
            write_measures(&mut out, measures)?;
            Ok(out)
        }
    }
}

pub fn render_stress(report: &StressReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            let mut out = String::new();
            write_stress(&mut out, report)?;
            Ok(out)
        }
    }
}

pub fn render_report(report: &RiskReport, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(report)?);
    }

    let mut out = String::new();
    writeln!(out, "=== Portfolio Risk Report ===")?;
    writeln!(out, "Generated: {}", report.stress.timestamp.to_rfc3339())?;
    writeln!(
        out,
        "Assets: {} ({} observations)",
        report.assets.join(", "),
        report.n_observations
    )?;
    let weights: Vec<String> = report.weights.iter().map(|w| format!("{:.4}", w)).collect();
    writeln!(out, "Weights: [{}]", weights.join(", "))?;
    writeln!(out, "Expected return: {:.6}", report.expected_return)?;
    writeln!(out)?;

    writeln!(out, "--- Historical ---")?;
    write_measures(&mut out, &report.historical)?;
    writeln!(out, "--- Parametric (normal) ---")?;
    write_measures(&mut out, &report.parametric)?;
    write_stress(&mut out, &report.stress)?;
    Ok(out)
}

fn write_summary(out: &mut String, summary: &SampleSummary) -> std::fmt::Result {
    writeln!(
        out,
        "Draws: {}  mean {:.6}  std {:.6}  min {:.6}  max {:.6}",
        summary.count, summary.mean, summary.std_dev, summary.min, summary.max
    )
}

fn write_measures(out: &mut String, measures: &[RiskMeasure]) -> std::fmt::Result {
    if measures.is_empty() {
        return Ok(());
    }
    writeln!(out, "{:>8} {:>12} {:>12} {:>12}", "Level", "VaR", "CVaR", "Source")?;
    for m in measures {
        writeln!(
            out,
            "{:>7.2}% {:>12.6} {:>12.6} {:>12}",
            m.confidence_level * 100.0,
            m.var,
            m.cvar,
            format!("{:?}", m.source)
        )?;
    }
    writeln!(out)
}

fn write_stress(out: &mut String, report: &StressReport) -> std::fmt::Result {
    writeln!(out, "--- Simulated: {} ---", report.baseline.name)?;
    writeln!(
        out,
        "Portfolio volatility: {:.6}",
        report.baseline.portfolio_volatility
    )?;
    write_summary(out, &report.baseline.summary)?;
    write_measures(out, &report.baseline.measures)?;

    if report.comparisons.is_empty() {
        return Ok(());
    }

    writeln!(out, "--- Stress Scenarios ---")?;
    writeln!(
        out,
        "{:<24} {:>8} {:>12} {:>12} {:>12} {:>12}",
        "Scenario", "Level", "VaR", "VaR chg", "CVaR", "CVaR chg"
    )?;
    for c in &report.comparisons {
        writeln!(
            out,
            "{:<24} {:>7.2}% {:>12.6} {:>12.6} {:>12.6} {:>12.6}",
            c.scenario,
            c.confidence_level * 100.0,
            c.stressed_var,
            c.var_change,
            c.stressed_cvar,
            c.cvar_change
        )?;
    }
    if let Some(worst) = &report.worst_scenario {
        writeln!(out, "\nWorst scenario: {}", worst)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_risk::{PipelineConfig, ReturnsTable, RiskPipeline};

    fn report() -> RiskReport {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|t| {
                let x = (t as f64 * 0.5).sin() * 0.01;
                vec![x, 0.5 * x + (t as f64 * 1.1).cos() * 0.01]
            })
            .collect();
        let returns = ReturnsTable::from_rows(vec!["A".into(), "B".into()], &rows).unwrap();
        let config = PipelineConfig {
            n_simulations: 1_000,
            seed: Some(3),
            ..Default::default()
        };
        RiskPipeline::new(config).unwrap().run(&returns).unwrap()
    }

    #[test]
    fn test_text_report_lists_scenarios() {
        let text = render_report(&report(), OutputFormat::Text).unwrap();
        assert!(text.contains("Volatility x2"));
        assert!(text.contains("Correlation rho=0.7"));
        assert!(text.contains("Worst scenario:"));
    }

    #[test]
    fn test_json_report_parses_back() {
        let json = render_report(&report(), OutputFormat::Json).unwrap();
        let parsed: RiskReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.assets, vec!["A", "B"]);
    }
}
