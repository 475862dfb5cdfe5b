//! CLI entry point: run one commodity pipeline end to end

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use wholesale_forecast::config::PipelineConfig;
use wholesale_forecast::data::SeriesLoader;
use wholesale_forecast::error::Result;
use wholesale_forecast::pipeline::Pipeline;

#[derive(Debug, Parser)]
#[command(name = "forecast", about = "Forecast daily wholesale commodity prices")]
struct Args {
    /// Commodity preset: onion, radish or cabbage
    #[arg(long, required_unless_present = "config")]
    commodity: Option<String>,

    /// JSON pipeline configuration, used instead of a preset
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the raw per-source CSV files
    #[arg(long)]
    data_dir: PathBuf,

    /// Directory for the evaluation and forecast CSV outputs
    #[arg(long, default_value = "outputs_daily")]
    out_dir: PathBuf,

    /// Also run the historical 2021-2023 -> 2024 backtest experiment
    #[arg(long)]
    backtest: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;

    let pipeline = Pipeline::new(config);
    let series = SeriesLoader::load_dir(&args.data_dir, pipeline.config())?;

    let report = pipeline.run_series(&series)?;
    if let Some(metrics) = &report.validation {
        println!(
            "VALID (last {}d) -> {}",
            pipeline.config().valid_window_days,
            metrics
        );
    }
    if let Some(metrics) = &report.test {
        println!("TEST -> {}", metrics);
    }
    report.write_csv(&args.out_dir)?;

    if args.backtest {
        match pipeline.backtest_years(&series, (2021, 2023), 2024)? {
            Some(metrics) => println!("BACKTEST (2021~23 -> 2024) -> {}", metrics),
            None => println!("BACKTEST skipped: not enough data"),
        }
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    if let Some(path) = &args.config {
        let text = std::fs::read_to_string(path)?;
        return serde_json::from_str(&text).map_err(|err| {
            wholesale_forecast::ForecastError::InvalidParameter(format!(
                "Bad configuration file '{}': {}",
                path.display(),
                err
            ))
        });
    }

    let commodity = args.commodity.as_deref().unwrap_or_default();
    PipelineConfig::preset(commodity).ok_or_else(|| {
        wholesale_forecast::ForecastError::InvalidParameter(format!(
            "Unknown commodity '{}'; expected onion, radish or cabbage",
            commodity
        ))
    })
}
