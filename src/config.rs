//! Configuration management
//!
//! Handles loading of JSON configuration files. Every section is optional and
//! falls back to the built-in run (AAPL daily bars, 2022-2024). The narration
//! API key is read from the environment (`GEMINI_API_KEY`, `.env` honoured).

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AnalysisError, AnalysisResult};
use crate::Symbol;

pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub narration: NarrationConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.load_env();
        Ok(config)
    }

    /// Load from `path` if given, otherwise use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let mut config = Config::default();
                config.load_env();
                Ok(config)
            }
        }
    }

    fn load_env(&mut self) {
        dotenv::dotenv().ok();
        if let Ok(api_key) = std::env::var(GEMINI_API_KEY_ENV) {
            if !api_key.trim().is_empty() {
                self.narration.api_key = Some(api_key);
            }
        }
    }

    /// Chart path: configured output, or `charts/<SYMBOL>_chart.png`
    pub fn chart_path(&self) -> PathBuf {
        self.chart.output.clone().unwrap_or_else(|| {
            PathBuf::from("charts").join(format!("{}_chart.png", self.market.symbol()))
        })
    }
}

/// Which instrument and date range to analyse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Inclusive start date (YYYY-MM-DD)
    #[serde(default = "default_start")]
    pub start: String,
    /// Exclusive end date (YYYY-MM-DD)
    #[serde(default = "default_end")]
    pub end: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_symbol() -> String {
    "AAPL".to_string()
}
fn default_start() -> String {
    "2022-01-01".to_string()
}
fn default_end() -> String {
    "2024-01-01".to_string()
}
fn default_interval() -> String {
    "1d".to_string()
}
fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for MarketConfig {
    fn default() -> Self {
        MarketConfig {
            symbol: default_symbol(),
            start: default_start(),
            end: default_end(),
            interval: default_interval(),
            data_dir: default_data_dir(),
        }
    }
}

impl MarketConfig {
    pub fn symbol(&self) -> Symbol {
        Symbol::new(&self.symbol)
    }

    /// Parsed `(start, end)`; start must precede end
    pub fn date_range(&self) -> Result<(NaiveDate, NaiveDate)> {
        let start = NaiveDate::parse_from_str(&self.start, "%Y-%m-%d")
            .context(format!("Invalid start date: {}", self.start))?;
        let end = NaiveDate::parse_from_str(&self.end, "%Y-%m-%d")
            .context(format!("Invalid end date: {}", self.end))?;
        if start >= end {
            anyhow::bail!("Start date {} must be before end date {}", start, end);
        }
        Ok((start, end))
    }

    /// CSV cache file for this symbol: `<data_dir>/<SYMBOL>_data.csv`
    pub fn csv_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(format!("{}_data.csv", self.symbol()))
    }
}

/// Parameters of the level/trend analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Minimum positions between two kept extrema of the same kind (default: 5)
    #[serde(default = "default_min_separation")]
    pub min_separation: usize,

    /// Decimal digits used to bucket level prices (default: 2)
    #[serde(default = "default_rounding")]
    pub rounding: u32,

    /// Most-touched buckets kept per level kind (default: 2)
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_min_separation() -> usize {
    5
}
fn default_rounding() -> u32 {
    2
}
fn default_top_n() -> usize {
    2
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            min_separation: default_min_separation(),
            rounding: default_rounding(),
            top_n: default_top_n(),
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.min_separation == 0 {
            return Err(AnalysisError::InvalidParameter {
                name: "min_separation",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.top_n == 0 {
            return Err(AnalysisError::InvalidParameter {
                name: "top_n",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

fn default_width() -> u32 {
    1400
}
fn default_height() -> u32 {
    800
}

impl Default for ChartConfig {
    fn default() -> Self {
        ChartConfig {
            output: None,
            width: default_width(),
            height: default_height(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

impl Default for NarrationConfig {
    fn default() -> Self {
        NarrationConfig {
            model: default_model(),
            api_key: None,
        }
    }
}
