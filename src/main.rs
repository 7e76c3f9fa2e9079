//! Trendscope - main entry point
//!
//! This binary provides two subcommands:
//! - analyze: Detect levels, trend lines and breakouts, render and narrate the chart
//! - download: Fetch historical data from Yahoo Finance into the CSV cache

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "trendscope")]
#[command(about = "Support/resistance levels, trend channels and breakout detection", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Instrument and date range shared by both subcommands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct MarketArgs {
    /// Path to configuration file (JSON); built-in defaults when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Ticker symbol (overrides config). E.g., "AAPL"
    #[arg(short, long)]
    pub symbol: Option<String>,

    /// Start date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<String>,

    /// End date, exclusive (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<String>,

    /// Bar interval. E.g., "1d", "1wk"
    #[arg(short, long)]
    pub interval: Option<String>,

    /// Directory holding cached CSV files
    #[arg(long)]
    pub data_dir: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze support/resistance levels and trend breakouts
    Analyze {
        #[command(flatten)]
        market: MarketArgs,

        /// Minimum bars between two extrema of the same kind
        #[arg(short, long)]
        window: Option<usize>,

        /// Decimal digits used to bucket level prices
        #[arg(long)]
        rounding: Option<u32>,

        /// Most-touched levels kept per kind
        #[arg(short, long)]
        top: Option<usize>,

        /// Chart output path (.png; the .svg and .json land beside it)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip chart rendering (also disables narration)
        #[arg(long)]
        no_chart: bool,

        /// Skip AI narration of the chart
        #[arg(long)]
        no_ai: bool,

        /// Ignore the CSV cache and fetch fresh data
        #[arg(long)]
        refresh: bool,
    },

    /// Download historical data into the CSV cache
    Download {
        #[command(flatten)]
        market: MarketArgs,
    },
}

const LOG_DIR: &str = "logs";

/// Console plus `logs/<command>_<timestamp>.log`; `RUST_LOG` overrides the level
fn setup_logging(verbose: bool, command_name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(LOG_DIR)?;
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},reqwest=warn,hyper=warn", default_level)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(tracing_appender::rolling::never(LOG_DIR, &log_filename))
                .with_ansi(false),
        )
        .init();

    Ok(PathBuf::from(LOG_DIR).join(log_filename))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Analyze { .. } => "analyze",
        Commands::Download { .. } => "download",
    };

    let log_path = setup_logging(cli.verbose, command_name)?;
    info!("Logging to {}", log_path.display());

    match cli.command {
        Commands::Analyze {
            market,
            window,
            rounding,
            top,
            output,
            no_chart,
            no_ai,
            refresh,
        } => commands::analyze::run(commands::analyze::AnalyzeOptions {
            market,
            window,
            rounding,
            top,
            output,
            no_chart,
            no_ai,
            refresh,
        }),

        Commands::Download { market } => commands::download::run(market),
    }
}
