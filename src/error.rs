//! Errors raised by the level/trend analysis core

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    /// Both trend-line anchors map to the same numeric x
    #[error("degenerate trend line: both anchor points have x = {x}")]
    DegenerateInput { x: f64 },

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
