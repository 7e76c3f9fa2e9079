//! Download command - fetch historical data into the CSV cache

use anyhow::Result;
use tracing::info;
use trendscope::data::{save_csv, SeriesProvider, YahooDataFetcher};

use crate::MarketArgs;

pub fn run(args: MarketArgs) -> Result<()> {
    let config = super::load_config(&args)?;
    let market = &config.market;
    let symbol = market.symbol();
    let (start, end) = market.date_range()?;

    info!("Starting data download for {}", symbol);

    println!("\n{}", "=".repeat(60));
    println!("DOWNLOADING HISTORICAL DATA FROM YAHOO FINANCE");
    println!("{}", "=".repeat(60));
    println!("  Symbol:   {}", symbol);
    println!("  Range:    {} -> {}", start, end);
    println!("  Interval: {}", market.interval);
    println!("  Output:   {}", market.csv_path().display());
    println!("{}\n", "=".repeat(60));

    let fetcher = YahooDataFetcher::new()?;
    let series = fetcher.fetch(&symbol, start, end, &market.interval)?;
    let path = save_csv(&series, market.csv_path())?;

    println!("✓ {} points saved to {}", series.len(), path.display());
    Ok(())
}
