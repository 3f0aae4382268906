use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use mc_risk::{
    log_returns, write_returns_csv_path, CsvReturnsLoader, MonteCarloSimulator, ParameterEstimator,
    PipelineConfig, PortfolioWeights, PriceTable, ReturnsLoader, ReturnsTable, RiskMeasure,
    RiskPipeline, SampleSummary, StressScenario, WeightScheme,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

mod config;
mod report;

use config::RunConfig;
use report::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "mcrisk", about = "Monte Carlo portfolio VaR/CVaR with stress testing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a prices CSV into a log-returns CSV
    Returns {
        /// Prices CSV (index column, then one column per asset)
        #[arg(long)]
        prices: PathBuf,

        /// Where to write the returns CSV
        #[arg(long)]
        output: PathBuf,
    },

    /// Estimate and validate mean vector and covariance matrix
    Estimate {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Simulate portfolio returns and summarize them
    Simulate {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        sim: SimulationArgs,

        /// Also write the simulated returns, one per line
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Simulated and historical VaR/CVaR of the portfolio
    Risk {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        sim: SimulationArgs,
    },

    /// Compare baseline risk against stressed covariance matrices
    Stress {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        sim: SimulationArgs,

        /// Volatility multipliers, one scenario each
        #[arg(long, value_delimiter = ',')]
        scale: Vec<f64>,

        /// Correlation blend weights, one scenario each
        #[arg(long, value_delimiter = ',')]
        rho: Vec<f64>,
    },

    /// Full pipeline driven by a YAML config file
    Run {
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Override the configured output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Returns CSV (index column, then one column per asset)
    #[arg(long)]
    returns: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Args, Debug)]
struct SimulationArgs {
    /// Portfolio weights in column order; equal weight when omitted
    #[arg(long, value_delimiter = ',')]
    weights: Vec<f64>,

    #[arg(short = 'n', long, default_value_t = 10_000)]
    simulations: usize,

    #[arg(long, value_delimiter = ',', default_values_t = vec![0.95, 0.99])]
    levels: Vec<f64>,

    #[arg(long)]
    seed: Option<u64>,
}

impl SimulationArgs {
    fn weight_scheme(&self) -> Result<WeightScheme> {
        if self.weights.is_empty() {
            return Ok(WeightScheme::EqualWeight);
        }
        Ok(WeightScheme::Custom {
            weights: PortfolioWeights::new(self.weights.clone())?,
        })
    }

    fn pipeline_config(&self, scenarios: Vec<StressScenario>) -> Result<PipelineConfig> {
        let config = PipelineConfig {
            n_simulations: self.simulations,
            confidence_levels: self.levels.clone(),
            seed: self.seed,
            weights: self.weight_scheme()?,
            scenarios,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Returns { prices, output } => {
            info!("Reading prices from {:?}", prices);
            let prices = PriceTable::from_csv_path(&prices)?;
            let returns = log_returns(&prices)?;
            let dropped = prices.n_observations().saturating_sub(1) - returns.n_observations();
            if dropped > 0 {
                warn!("Dropped {} rows with missing or non-positive prices", dropped);
            }
            write_returns_csv_path(&returns, &output)?;
            info!(
                "Wrote {} returns for {} assets to {:?}",
                returns.n_observations(),
                returns.n_assets(),
                output
            );
        }
        Commands::Estimate { input } => {
            let returns = load_returns(&input.returns)?;
            let estimates = ParameterEstimator::default().estimate(&returns)?;
            println!(
                "{}",
                report::render_estimates(returns.assets(), &estimates, input.format)?
            );
        }
        Commands::Simulate { input, sim, output } => {
            let returns = load_returns(&input.returns)?;
            let (sample, _) = simulate(&returns, &sim)?;
            let summary = SampleSummary::from_sample(&sample)?;
            println!("{}", report::render_measures(&summary, &[], input.format)?);

            if let Some(path) = output {
                let lines: Vec<String> = sample.iter().map(|r| r.to_string()).collect();
                std::fs::write(&path, lines.join("\n") + "\n")?;
                info!("Wrote {} simulated returns to {:?}", sample.len(), path);
            }
        }
        Commands::Risk { input, sim } => {
            let returns = load_returns(&input.returns)?;
            let (sample, weights) = simulate(&returns, &sim)?;
            let observed = returns.portfolio_returns(&weights)?;

            let mut measures = Vec::with_capacity(2 * sim.levels.len());
            for &alpha in &sim.levels {
                measures.push(RiskMeasure::simulated(&sample, alpha)?);
                measures.push(RiskMeasure::historical(&observed, alpha)?);
            }
            let summary = SampleSummary::from_sample(&sample)?;
            println!("{}", report::render_measures(&summary, &measures, input.format)?);
        }
        Commands::Stress {
            input,
            sim,
            scale,
            rho,
        } => {
            let mut scenarios: Vec<StressScenario> =
                scale.into_iter().map(StressScenario::volatility).collect();
            scenarios.extend(rho.into_iter().map(StressScenario::correlation));
            if scenarios.is_empty() {
                bail!("at least one --scale or --rho is required");
            }

            let returns = load_returns(&input.returns)?;
            let pipeline = RiskPipeline::new(sim.pipeline_config(scenarios)?)?;
            let risk_report = pipeline.run(&returns)?;
            println!("{}", report::render_stress(&risk_report.stress, input.format)?);
        }
        Commands::Run { config, format } => {
            info!("Loading configuration from {:?}", config);
            let config = RunConfig::load(&config)?;

            let pipeline = RiskPipeline::new(config.pipeline)?;
            let risk_report = pipeline.load_and_run(&CsvReturnsLoader::new(config.data))?;

            let format = format.unwrap_or(config.output.format);
            let rendered = report::render_report(&risk_report, format)?;
            match config.output.path {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    info!("Wrote report to {:?}", path);
                }
                None => println!("{}", rendered),
            }
        }
    }

    Ok(())
}

fn load_returns(path: &Path) -> Result<ReturnsTable> {
    info!("Loading returns from {:?}", path);
    let returns = CsvReturnsLoader::from_path(path).load()?;
    info!(
        "Loaded {} observations for {} assets",
        returns.n_observations(),
        returns.n_assets()
    );
    Ok(returns)
}

fn simulate(
    returns: &ReturnsTable,
    args: &SimulationArgs,
) -> Result<(Vec<f64>, PortfolioWeights)> {
    let config = args.pipeline_config(Vec::new())?;
    let weights = config.weights.resolve(returns.n_assets())?;
    if !weights.is_fully_invested() {
        warn!("Portfolio weights sum to {}, not 1", weights.sum());
    }

    let estimates = ParameterEstimator::new(config.tolerance).estimate(returns)?;
    let mut simulator = match config.seed {
        Some(seed) => MonteCarloSimulator::seeded(seed),
        None => MonteCarloSimulator::from_entropy(),
    };
    let sample = simulator.simulate(
        &estimates.mean,
        &estimates.covariance,
        &weights,
        config.n_simulations,
    )?;
    info!(
        "Simulated {} portfolio returns ({:?} factor)",
        sample.len(),
        sample.factorization()
    );
    Ok((sample.into_vec(), weights))
}
