//! Data loading and management
//!
//! Handles OHLCV persistence in CSV files and fetching daily history from the
//! Yahoo Finance chart API.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

use crate::{PricePoint, Symbol};

// =============================================================================
// Constants
// =============================================================================

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Valid intervals for the Yahoo chart API
pub const INTERVALS: &[&str] = &[
    "1m", "2m", "5m", "15m", "30m", "60m", "90m", "1h", "1d", "5d", "1wk", "1mo",
];

const CSV_HEADER: [&str; 6] = ["datetime", "open", "high", "low", "close", "volume"];
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// =============================================================================
// CSV Persistence
// =============================================================================

/// Parse the datetime forms found in saved series: RFC 3339,
/// `YYYY-MM-DD HH:MM:SS` and bare `YYYY-MM-DD` (all taken as UTC)
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    s.parse::<DateTime<Utc>>()
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
                .ok()
                .map(|ndt| ndt.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|ndt| ndt.and_utc())
        })
}

/// Sort by time and drop repeated timestamps (first occurrence wins)
pub fn normalize_series(mut series: Vec<PricePoint>) -> Vec<PricePoint> {
    series.sort_by_key(|p| p.datetime);
    series.dedup_by_key(|p| p.datetime);
    series
}

/// Load an OHLCV series from a CSV file.
///
/// Columns are located by header name (case-insensitive; `date` is accepted
/// for `datetime`, extra columns are ignored). Rows with a missing or
/// non-numeric field are skipped.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<PricePoint>> {
    let mut reader = csv::Reader::from_path(path.as_ref()).context("Failed to open CSV file")?;

    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| {
                let h = h.trim().to_lowercase();
                h == name || (name == "datetime" && h == "date")
            })
            .context(format!("Missing {} column", name))
    };
    let idx = [
        column("datetime")?,
        column("open")?,
        column("high")?,
        column("low")?,
        column("close")?,
        column("volume")?,
    ];

    let mut series = Vec::new();
    let mut skipped = 0usize;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let datetime = record.get(idx[0]).and_then(parse_datetime);
        let mut values = [0.0f64; 5];
        let mut complete = datetime.is_some();
        for (slot, &col) in values.iter_mut().zip(&idx[1..]) {
            match record.get(col).and_then(|v| v.trim().parse::<f64>().ok()) {
                Some(v) if v.is_finite() => *slot = v,
                _ => complete = false,
            }
        }

        match (complete, datetime) {
            (true, Some(datetime)) => {
                let [open, high, low, close, volume] = values;
                series.push(PricePoint::new_unchecked(datetime, open, high, low, close, volume));
            }
            _ => {
                debug!("Skipping incomplete row {}", row_idx + 1);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} incomplete rows in {}", skipped, path.as_ref().display());
    }

    Ok(normalize_series(series))
}

/// Save a series to CSV, creating parent directories as needed
pub fn save_csv(series: &[PricePoint], path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create data directory")?;
    }

    let mut writer = csv::Writer::from_path(path).context("Failed to create output file")?;
    writer.write_record(CSV_HEADER)?;

    for p in series {
        writer.write_record([
            p.datetime.format(DATETIME_FORMAT).to_string(),
            p.open.to_string(),
            p.high.to_string(),
            p.low.to_string(),
            p.close.to_string(),
            p.volume.to_string(),
        ])?;
    }
    writer.flush().context("Failed to flush CSV file")?;

    info!("Saved {} rows to {}", series.len(), path.display());
    Ok(path.to_path_buf())
}

// =============================================================================
// Series Providers
// =============================================================================

/// Source of historical bars for one symbol
pub trait SeriesProvider {
    fn fetch(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
        interval: &str,
    ) -> Result<Vec<PricePoint>>;
}

/// Fetch historical OHLCV data from the Yahoo Finance chart API
pub struct YahooDataFetcher {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

impl YahooDataFetcher {
    pub fn new() -> Result<Self> {
        Self::with_base_url(YAHOO_CHART_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(StdDuration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Chart request URL; `end` is exclusive
    pub fn chart_url(&self, symbol: &Symbol, start: NaiveDate, end: NaiveDate, interval: &str) -> String {
        let to_ts = |d: NaiveDate| {
            d.and_hms_opt(0, 0, 0)
                .map(|ndt| ndt.and_utc().timestamp())
                .unwrap_or_default()
        };
        format!(
            "{}/{}?period1={}&period2={}&interval={}&events=history",
            self.base_url.trim_end_matches('/'),
            symbol,
            to_ts(start),
            to_ts(end),
            interval
        )
    }

    /// Turn a chart API payload into a clean series
    pub fn parse_chart(body: &str) -> Result<Vec<PricePoint>> {
        let response: ChartResponse =
            serde_json::from_str(body).context("Failed to parse chart response")?;

        if let Some(err) = response.chart.error {
            anyhow::bail!(
                "Chart API error {}: {}",
                err.code.unwrap_or_default(),
                err.description.unwrap_or_default()
            );
        }

        let result = response
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .context("Chart response has no result")?;
        let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

        let mut series = Vec::with_capacity(result.timestamp.len());
        let mut dropped = 0usize;
        let mut rejected = 0usize;
        for (i, &ts) in result.timestamp.iter().enumerate() {
            let field = |v: &Vec<Option<f64>>| v.get(i).copied().flatten().filter(|x| x.is_finite());
            let row = (
                DateTime::from_timestamp(ts, 0),
                field(&quote.open),
                field(&quote.high),
                field(&quote.low),
                field(&quote.close),
                field(&quote.volume),
            );
            match row {
                (Some(dt), Some(open), Some(high), Some(low), Some(close), Some(volume)) => {
                    match PricePoint::new(dt, open, high, low, close, volume) {
                        Ok(point) => series.push(point),
                        Err(e) => {
                            debug!("Rejecting bar at {}: {}", dt, e);
                            rejected += 1;
                        }
                    }
                }
                _ => dropped += 1,
            }
        }

        if dropped > 0 {
            debug!("Dropped {} rows with missing fields", dropped);
        }
        if rejected > 0 {
            warn!("Rejected {} inconsistent bars from provider", rejected);
        }

        Ok(normalize_series(series))
    }
}

impl SeriesProvider for YahooDataFetcher {
    fn fetch(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
        interval: &str,
    ) -> Result<Vec<PricePoint>> {
        if !INTERVALS.contains(&interval) {
            anyhow::bail!("Unsupported interval: {} (valid: {})", interval, INTERVALS.join(", "));
        }

        let url = self.chart_url(symbol, start, end, interval);
        info!("Fetching {} {} data from {} to {}", symbol, interval, start, end);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().context("Failed to send request")?;
        let status = response.status();
        let body = response.text().context("Failed to read response body")?;

        if !status.is_success() {
            // The API reports unknown symbols in the body, prefer that message
            if let Err(e) = Self::parse_chart(&body) {
                anyhow::bail!("API returned status {}: {}", status, e);
            }
            anyhow::bail!("API returned status: {}", status);
        }

        let series = Self::parse_chart(&body)?;
        if series.is_empty() {
            anyhow::bail!("No data found for {}", symbol);
        }

        info!("Total points fetched: {}", series.len());
        Ok(series)
    }
}

/// Load the cached CSV, falling back to `provider` when the file is missing,
/// unreadable or empty (or when `refresh` is set). A fetched series is saved
/// back to `path`.
///
/// Failures are logged and yield an empty series.
pub fn load_or_fetch(
    path: &Path,
    provider: &dyn SeriesProvider,
    symbol: &Symbol,
    range: (NaiveDate, NaiveDate),
    interval: &str,
    refresh: bool,
) -> Vec<PricePoint> {
    if !refresh && path.exists() {
        match load_csv(path) {
            Ok(series) if !series.is_empty() => {
                info!("Loaded {} points for {} from {}", series.len(), symbol, path.display());
                return series;
            }
            Ok(_) => warn!("No rows in {}, fetching {}", path.display(), symbol),
            Err(e) => warn!("Error loading data from {}: {:#}", path.display(), e),
        }
    }

    let series = match provider.fetch(symbol, range.0, range.1, interval) {
        Ok(series) => series,
        Err(e) => {
            warn!("Error fetching data for {}: {:#}", symbol, e);
            return Vec::new();
        }
    };

    if let Err(e) = save_csv(&series, path) {
        warn!("Could not cache {} data: {:#}", symbol, e);
    }

    series
}

// =============================================================================
// Data Validation
// =============================================================================

/// Validate a series for consistency
pub fn validate_series(series: &[PricePoint]) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if series.is_empty() {
        errors.push("No price points provided".to_string());
        return ValidationResult { errors, warnings };
    }

    for (i, point) in series.iter().enumerate() {
        if let Err(e) = point.validate() {
            errors.push(format!("Point {}: {}", i, e));
        }
        if i > 0 && point.datetime <= series[i - 1].datetime {
            warnings.push(format!("Point {}: not chronological", i));
        }
    }

    ValidationResult { errors, warnings }
}

/// Result of data validation
#[derive(Debug)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
