//! Analyze command implementation

use anyhow::Result;
use std::path::PathBuf;
use tracing::{info, warn};
use trendscope::chart::{ChartRenderer, SvgChartRenderer};
use trendscope::data::{self, YahooDataFetcher};
use trendscope::narration::{ChartNarrator, GeminiNarrator};
use trendscope::{analyze, Analysis, LevelKind, PricePoint, Symbol, TrendSide};

use crate::MarketArgs;

pub struct AnalyzeOptions {
    pub market: MarketArgs,
    pub window: Option<usize>,
    pub rounding: Option<u32>,
    pub top: Option<usize>,
    pub output: Option<PathBuf>,
    pub no_chart: bool,
    pub no_ai: bool,
    pub refresh: bool,
}

pub fn run(options: AnalyzeOptions) -> Result<()> {
    info!("Starting analysis");

    let mut config = super::load_config(&options.market)?;
    if let Some(window) = options.window {
        config.analysis.min_separation = window;
    }
    if let Some(rounding) = options.rounding {
        config.analysis.rounding = rounding;
    }
    if let Some(top) = options.top {
        config.analysis.top_n = top;
    }
    if let Some(output) = options.output {
        config.chart.output = Some(output);
    }
    config.analysis.validate()?;

    let symbol = config.market.symbol();
    let range = config.market.date_range()?;
    let csv_path = config.market.csv_path();

    let fetcher = YahooDataFetcher::new()?;
    let series = data::load_or_fetch(
        &csv_path,
        &fetcher,
        &symbol,
        range,
        &config.market.interval,
        options.refresh,
    );

    if series.is_empty() {
        warn!("No data available for {}", symbol);
        println!("Could not process data for {}: no analysis possible.", symbol);
        return Ok(());
    }

    let validation = data::validate_series(&series);
    for w in &validation.warnings {
        warn!("{}", w);
    }
    for e in &validation.errors {
        warn!("{}", e);
    }

    let analysis = analyze(&series, &config.analysis)?;
    print_report(&symbol, &series, &analysis);

    if options.no_chart {
        info!("Chart rendering disabled");
        return Ok(());
    }

    let renderer = SvgChartRenderer::new(&config.chart);
    let chart_path = match renderer.render(&symbol, &series, &analysis, &config.chart_path()) {
        Ok(path) => path,
        Err(e) => {
            warn!("Chart rendering failed: {:#}", e);
            return Ok(());
        }
    };
    println!("Chart saved to {}", chart_path.display());

    if options.no_ai {
        info!("Chart narration disabled");
        return Ok(());
    }

    let Some(api_key) = config.narration.api_key.clone() else {
        warn!("{} not set, skipping chart narration", trendscope::config::GEMINI_API_KEY_ENV);
        return Ok(());
    };

    let narrator = GeminiNarrator::new(api_key, config.narration.model.clone())?;
    let commentary = narrator.narrate(&chart_path);

    println!("\n{}", "=".repeat(60));
    println!("AI CHART ANALYSIS");
    println!("{}", "=".repeat(60));
    println!("{}", commentary);
    println!("{}", "=".repeat(60));

    info!("Analysis completed successfully");
    Ok(())
}

fn print_report(symbol: &Symbol, series: &[PricePoint], analysis: &Analysis) {
    let date = |i: usize| {
        series
            .get(i)
            .map(|p| p.datetime.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    };

    println!("\n{}", "=".repeat(60));
    println!("LEVELS & TREND CHANNEL: {}", symbol);
    println!("{}", "=".repeat(60));
    println!("Points:             {}", series.len());
    println!("Local highs:        {}", analysis.extrema.highs.len());
    println!("Local lows:         {}", analysis.extrema.lows.len());

    for kind in [LevelKind::Resistance, LevelKind::Support] {
        println!("\n{} levels:", kind);
        for ranked in analysis.levels_of(kind) {
            println!(
                "  {}  {:>12.4}  (bucket {:.*}, {} touches)",
                date(ranked.level.position),
                ranked.level.price,
                ranked.precision as usize,
                ranked.rounded,
                ranked.touches
            );
        }
    }

    for side in [TrendSide::Lower, TrendSide::Upper] {
        println!();
        let label = match side {
            TrendSide::Lower => "Lower trend",
            TrendSide::Upper => "Upper trend",
        };
        let Some(trend) = analysis.trend(side) else {
            println!("{}:        not enough extrema", label);
            continue;
        };

        println!(
            "{}:        {} -> {} ({} bars, slope {:+.4}/day)",
            label,
            date(trend.anchor.first),
            date(trend.anchor.second),
            trend.anchor.span(),
            trend.line.slope
        );
        match &trend.breakout {
            Some(event) => println!(
                "  {} at {}: price {:.4}, line {:.4}",
                event.severity,
                event.datetime.format("%Y-%m-%d"),
                event.price,
                event.trend_value
            ),
            None => println!("  no points after the second anchor"),
        }
    }
    println!("{}", "=".repeat(60));
}
