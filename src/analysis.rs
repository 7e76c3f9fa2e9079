//! Level and trend-channel analysis of a single price series
//!
//! Extrema feed two independent consumers: level aggregation (all extrema)
//! and the trend channel (widest pair of lows for the lower line, widest pair
//! of highs for the upper line), each line then scanned for a breakout.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::breakout;
use crate::config::AnalysisConfig;
use crate::error::AnalysisResult;
use crate::extrema;
use crate::levels;
use crate::trend::{self, TrendLine};
use crate::{
    AnchorPair, BreakDirection, BreakoutEvent, ExtremumSet, LevelKind, PriceField, PricePoint,
    RankedLevel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendSide {
    /// Through lows, broken downwards
    Lower,
    /// Through highs, broken upwards
    Upper,
}

impl TrendSide {
    pub fn field(&self) -> PriceField {
        match self {
            TrendSide::Lower => PriceField::Low,
            TrendSide::Upper => PriceField::High,
        }
    }

    pub fn direction(&self) -> BreakDirection {
        match self {
            TrendSide::Lower => BreakDirection::Below,
            TrendSide::Upper => BreakDirection::Above,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub side: TrendSide,
    pub anchor: AnchorPair,
    pub line: TrendLine,
    pub breakout: Option<BreakoutEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub extrema: ExtremumSet,
    pub levels: Vec<RankedLevel>,
    pub lower: Option<TrendAnalysis>,
    pub upper: Option<TrendAnalysis>,
}

impl Analysis {
    /// True when nothing could be derived (e.g. an empty series)
    pub fn is_empty(&self) -> bool {
        self.extrema.is_empty()
            && self.levels.is_empty()
            && self.lower.is_none()
            && self.upper.is_none()
    }

    pub fn levels_of(&self, kind: LevelKind) -> impl Iterator<Item = &RankedLevel> {
        self.levels.iter().filter(move |l| l.level.kind == kind)
    }

    pub fn trend(&self, side: TrendSide) -> Option<&TrendAnalysis> {
        match side {
            TrendSide::Lower => self.lower.as_ref(),
            TrendSide::Upper => self.upper.as_ref(),
        }
    }
}

/// Fit one side of the channel and scan it for a breakout.
///
/// `None` when the side has fewer than two distinct extrema.
pub fn analyze_trend(
    series: &[PricePoint],
    positions: &[usize],
    side: TrendSide,
) -> AnalysisResult<Option<TrendAnalysis>> {
    let Some(anchor) = trend::most_separated(positions) else {
        debug!("{:?} trend skipped: {} extrema", side, positions.len());
        return Ok(None);
    };

    let line = TrendLine::through(series, anchor, side.field())?;
    debug!(
        "{:?} trend anchored at {} and {} ({} bars), slope {:.6}",
        side,
        anchor.first,
        anchor.second,
        anchor.span(),
        line.slope
    );
    let breakout = breakout::scan(series, anchor, &line, side.field(), side.direction());

    Ok(Some(TrendAnalysis {
        side,
        anchor,
        line,
        breakout,
    }))
}

/// Run the full analysis. An empty series yields an empty [`Analysis`].
pub fn analyze(series: &[PricePoint], config: &AnalysisConfig) -> AnalysisResult<Analysis> {
    config.validate()?;

    if series.is_empty() {
        info!("Empty series, no analysis possible");
        return Ok(Analysis::default());
    }

    let extrema = extrema::detect(series, config.min_separation);
    let candidates = levels::levels_from_extrema(series, &extrema);
    let levels = levels::filter_levels(&candidates, config.rounding, config.top_n);

    let lower = analyze_trend(series, &extrema.lows, TrendSide::Lower)?;
    let upper = analyze_trend(series, &extrema.highs, TrendSide::Upper)?;

    info!(
        "Analysis: {} highs, {} lows, {} ranked levels, lower trend {}, upper trend {}",
        extrema.highs.len(),
        extrema.lows.len(),
        levels.len(),
        if lower.is_some() { "fitted" } else { "absent" },
        if upper.is_some() { "fitted" } else { "absent" },
    );

    Ok(Analysis {
        extrema,
        levels,
        lower,
        upper,
    })
}
