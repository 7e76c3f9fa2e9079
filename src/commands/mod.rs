//! Subcommand implementations

pub mod analyze;
pub mod download;

use anyhow::Result;
use tracing::info;
use trendscope::Config;

use crate::MarketArgs;

/// Load the configuration and apply command-line overrides
pub fn load_config(args: &MarketArgs) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(path) = &args.config {
        info!("Loaded configuration from: {}", path.display());
    }

    if let Some(symbol) = &args.symbol {
        info!("Overriding symbol to: {}", symbol);
        config.market.symbol = symbol.clone();
    }
    if let Some(start) = &args.start {
        info!("Overriding start date to: {}", start);
        config.market.start = start.clone();
    }
    if let Some(end) = &args.end {
        info!("Overriding end date to: {}", end);
        config.market.end = end.clone();
    }
    if let Some(interval) = &args.interval {
        info!("Overriding interval to: {}", interval);
        config.market.interval = interval.clone();
    }
    if let Some(dir) = &args.data_dir {
        config.market.data_dir = dir.clone();
    }

    Ok(config)
}
