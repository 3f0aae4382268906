//! Baseline versus stressed portfolio risk
//!
//! Builds a small three-asset history, fits the model, and prints how
//! VaR and CVaR move under volatility and correlation stress.
//!
//! Run with: cargo run --example stress_comparison

use mc_risk::*;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("=== Stress Comparison Example ===\n");

    // 1. Historical daily returns (synthetic)
    let rows: Vec<Vec<f64>> = (0..504)
        .map(|t| {
            let market = (t as f64 * 0.21).sin() * 0.011 + ((t * 13) % 17) as f64 / 4000.0 - 0.002;
            vec![
                market + (t as f64 * 0.9).cos() * 0.006,
                1.3 * market + (t as f64 * 1.4).sin() * 0.009,
                -0.4 * market + (t as f64 * 0.33).cos() * 0.004,
            ]
        })
        .collect();
    let returns = ReturnsTable::from_rows(vec!["SPY".into(), "QQQ".into(), "TLT".into()], &rows)?;
    println!(
        "History: {} assets, {} observations\n",
        returns.n_assets(),
        returns.n_observations()
    );

    // 2. Fitted parameters
    let estimates = ParameterEstimator::default().estimate(&returns)?;
    let correlation = correlation_matrix(&estimates.covariance)?;
    println!("--- Fitted Model ---");
    for (i, asset) in returns.assets().iter().enumerate() {
        println!(
            "  {:<4} mean {:>9.5}  vol {:>8.5}",
            asset,
            estimates.mean[i],
            estimates.covariance[(i, i)].sqrt()
        );
    }
    println!("Correlation:\n{:.3}", correlation);

    // 3. Pipeline with a custom book and scenario set
    let config = PipelineConfig {
        n_simulations: 100_000,
        confidence_levels: vec![0.95, 0.99],
        seed: Some(42),
        weights: WeightScheme::Custom {
            weights: PortfolioWeights::new(vec![0.5, 0.3, 0.2])?,
        },
        scenarios: vec![
            StressScenario::volatility(2.0),
            StressScenario::correlation(0.7),
            StressScenario::Combined {
                name: "Crisis".to_string(),
                scale: 2.5,
                rho: 1.0,
            },
        ],
        tolerance: CovarianceTolerance::default(),
    };
    let report = RiskPipeline::new(config)?.run(&returns)?;

    println!("--- Baseline ---");
    println!("Expected return: {:.5}", report.expected_return);
    println!("Volatility:      {:.5}", report.stress.baseline.portfolio_volatility);
    for m in &report.stress.baseline.measures {
        println!(
            "  {:.0}%: VaR {:>9.5}  CVaR {:>9.5}",
            m.confidence_level * 100.0,
            m.var,
            m.cvar
        );
    }
    println!();

    println!("--- Cross-checks ---");
    for (h, p) in report.historical.iter().zip(&report.parametric) {
        println!(
            "  {:.0}%: historical VaR {:>9.5}  parametric VaR {:>9.5}",
            h.confidence_level * 100.0,
            h.var,
            p.var
        );
    }
    println!();

    println!("--- Stress Scenarios ---");
    println!("Scenario                 Level      VaR chg     CVaR chg");
    println!("{:-<58}", "");
    for c in &report.stress.comparisons {
        println!(
            "{:<22}   {:>4.0}%   {:>10.5}   {:>10.5}",
            c.scenario,
            c.confidence_level * 100.0,
            c.var_change,
            c.cvar_change
        );
    }
    println!();

    if let Some(worst) = &report.stress.worst_scenario {
        println!("Worst scenario: {}", worst);
    }

    println!("\n=== Example Complete ===");
    Ok(())
}
