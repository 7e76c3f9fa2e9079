//! Trendscope
//!
//! Support/resistance levels, trend channels and breakout detection for a
//! single instrument's price history, with CSV caching, SVG chart rendering
//! and optional chart narration by a vision-capable language model.

pub mod analysis;
pub mod breakout;
pub mod chart;
pub mod config;
pub mod data;
pub mod error;
pub mod extrema;
pub mod levels;
pub mod narration;
pub mod trend;
pub mod types;

pub use analysis::{analyze, Analysis, TrendAnalysis, TrendSide};
pub use config::{AnalysisConfig, Config};
pub use error::AnalysisError;
pub use trend::TrendLine;
pub use types::*;
