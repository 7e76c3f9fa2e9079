//! Chart rendering
//!
//! The analysis hands the renderer plain geometry ([`ChartAnnotations`]):
//! level prices, trend-line anchors and coefficients, breakout points. The
//! bundled renderer draws them over a candlestick chart as a standalone SVG,
//! rasterizes that to PNG for consumers that need pixels, and writes the
//! annotations next to both as JSON.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analysis::{Analysis, TrendAnalysis, TrendSide};
use crate::config::ChartConfig;
use crate::trend::date_to_num;
use crate::{BreakoutEvent, BreakoutSeverity, LevelKind, PricePoint, Symbol};

/// Produces a visual artifact from a series and its analysis
pub trait ChartRenderer {
    fn render(
        &self,
        symbol: &Symbol,
        series: &[PricePoint],
        analysis: &Analysis,
        path: &Path,
    ) -> Result<PathBuf>;
}

// =============================================================================
// Annotations
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelAnnotation {
    pub price: f64,
    pub rounded: f64,
    pub kind: LevelKind,
    pub touches: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorPoint {
    pub position: usize,
    pub datetime: DateTime<Utc>,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnnotation {
    pub side: TrendSide,
    pub slope: f64,
    pub intercept: f64,
    pub start: AnchorPoint,
    pub end: AnchorPoint,
    pub breakout: Option<BreakoutEvent>,
}

/// Everything a renderer needs to know about the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartAnnotations {
    pub symbol: Symbol,
    pub points: usize,
    pub levels: Vec<LevelAnnotation>,
    pub trends: Vec<TrendAnnotation>,
}

impl ChartAnnotations {
    pub fn from_analysis(symbol: &Symbol, series: &[PricePoint], analysis: &Analysis) -> Self {
        let levels = analysis
            .levels
            .iter()
            .map(|r| LevelAnnotation {
                price: r.level.price,
                rounded: r.rounded,
                kind: r.level.kind,
                touches: r.touches,
            })
            .collect();

        let trends = [&analysis.lower, &analysis.upper]
            .into_iter()
            .flatten()
            .filter_map(|t| trend_annotation(series, t))
            .collect();

        ChartAnnotations {
            symbol: symbol.clone(),
            points: series.len(),
            levels,
            trends,
        }
    }
}

fn trend_annotation(series: &[PricePoint], trend: &TrendAnalysis) -> Option<TrendAnnotation> {
    let field = trend.side.field();
    let anchor = |position: usize| {
        series.get(position).map(|p| AnchorPoint {
            position,
            datetime: p.datetime,
            price: p.price(field),
        })
    };

    Some(TrendAnnotation {
        side: trend.side,
        slope: trend.line.slope,
        intercept: trend.line.intercept,
        start: anchor(trend.anchor.first)?,
        end: anchor(trend.anchor.second)?,
        breakout: trend.breakout.clone(),
    })
}

/// Write annotations as pretty JSON
pub fn save_annotations(annotations: &ChartAnnotations, path: &Path) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(annotations).context("Failed to serialize annotations")?;
    std::fs::write(path, json).context("Failed to write annotations file")?;
    Ok(path.to_path_buf())
}

// =============================================================================
// SVG Renderer
// =============================================================================

const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_BOTTOM: f64 = 70.0;

const UP_COLOR: &str = "#26a69a";
const DOWN_COLOR: &str = "#ef5350";
const SUPPORT_COLOR: &str = "green";
const RESISTANCE_COLOR: &str = "red";
const TREND_COLOR: &str = "blue";
const CONFIRMED_COLOR: &str = "red";
const POTENTIAL_COLOR: &str = "orange";

pub struct SvgChartRenderer {
    width: f64,
    height: f64,
}

impl SvgChartRenderer {
    pub fn new(config: &ChartConfig) -> Self {
        Self {
            width: config.width.max(200) as f64,
            height: config.height.max(150) as f64,
        }
    }

    /// Build the SVG document
    pub fn to_svg(&self, symbol: &Symbol, series: &[PricePoint], analysis: &Analysis) -> Result<String> {
        let (Some(first), Some(last)) = (series.first(), series.last()) else {
            anyhow::bail!("Nothing to render: empty series");
        };

        let scale = Scale::new(self, series, analysis, first.datetime, last.datetime);
        let mut svg = String::new();

        writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif">"#,
            w = self.width,
            h = self.height
        )?;
        writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
        writeln!(
            svg,
            r#"<text x="{}" y="32" font-size="20" text-anchor="middle">{} support/resistance + trend channel</text>"#,
            self.width / 2.0,
            escape(symbol.as_str())
        )?;

        self.write_axes(&mut svg, &scale, first.datetime, last.datetime)?;
        self.write_candles(&mut svg, &scale, series)?;

        for ranked in &analysis.levels {
            let (color, dash) = match ranked.level.kind {
                LevelKind::Support => (SUPPORT_COLOR, "8,3,2,3"),
                LevelKind::Resistance => (RESISTANCE_COLOR, "6,4"),
            };
            let y = scale.y(ranked.level.price);
            writeln!(
                svg,
                r#"<line x1="{:.2}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" stroke="{color}" stroke-width="1" stroke-dasharray="{dash}"/>"#,
                scale.left,
                scale.right,
            )?;
        }

        for trend in [&analysis.lower, &analysis.upper].into_iter().flatten() {
            self.write_trend(&mut svg, &scale, series, trend)?;
        }

        self.write_legend(&mut svg, analysis)?;
        writeln!(svg, "</svg>")?;

        Ok(svg)
    }

    fn write_axes(&self, svg: &mut String, scale: &Scale, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
        writeln!(
            svg,
            r##"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="none" stroke="#444"/>"##,
            scale.left,
            scale.top,
            scale.right - scale.left,
            scale.bottom - scale.top
        )?;

        const TICKS: usize = 6;
        for i in 0..=TICKS {
            let price = scale.min_price + (scale.max_price - scale.min_price) * i as f64 / TICKS as f64;
            let y = scale.y(price);
            writeln!(
                svg,
                r##"<line x1="{:.2}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" stroke="#ddd"/><text x="{:.2}" y="{:.2}" font-size="12" text-anchor="end">{price:.2}</text>"##,
                scale.left,
                scale.right,
                scale.left - 6.0,
                y + 4.0,
            )?;
        }

        let span = end - start;
        for i in 0..=TICKS {
            let when = start + span * i as i32 / TICKS as i32;
            let x = scale.x(when);
            writeln!(
                svg,
                r##"<line x1="{x:.2}" y1="{:.2}" x2="{x:.2}" y2="{:.2}" stroke="#ddd"/><text x="{x:.2}" y="{:.2}" font-size="12" text-anchor="middle">{}</text>"##,
                scale.top,
                scale.bottom,
                scale.bottom + 18.0,
                when.format("%Y-%m-%d"),
            )?;
        }

        writeln!(
            svg,
            r#"<text x="{:.2}" y="{:.2}" font-size="14" text-anchor="middle">Date</text>"#,
            (scale.left + scale.right) / 2.0,
            self.height - 20.0
        )?;
        writeln!(
            svg,
            r#"<text x="20" y="{y:.2}" font-size="14" text-anchor="middle" transform="rotate(-90 20 {y:.2})">Price</text>"#,
            y = (scale.top + scale.bottom) / 2.0
        )?;
        Ok(())
    }

    fn write_candles(&self, svg: &mut String, scale: &Scale, series: &[PricePoint]) -> Result<()> {
        let body_width = ((scale.right - scale.left) / series.len() as f64 * 0.7).clamp(1.0, 12.0);

        for p in series {
            let x = scale.x(p.datetime);
            let color = if p.close >= p.open { UP_COLOR } else { DOWN_COLOR };
            let top = scale.y(p.open.max(p.close));
            let bottom = scale.y(p.open.min(p.close));

            writeln!(
                svg,
                r#"<line x1="{x:.2}" y1="{:.2}" x2="{x:.2}" y2="{:.2}" stroke="{color}"/><rect x="{:.2}" y="{top:.2}" width="{body_width:.2}" height="{:.2}" fill="{color}"/>"#,
                scale.y(p.high),
                scale.y(p.low),
                x - body_width / 2.0,
                (bottom - top).max(0.5),
            )?;
        }
        Ok(())
    }

    fn write_trend(&self, svg: &mut String, scale: &Scale, series: &[PricePoint], trend: &TrendAnalysis) -> Result<()> {
        let Some(annotation) = trend_annotation(series, trend) else {
            return Ok(());
        };

        let dash = match trend.side {
            TrendSide::Lower => "",
            TrendSide::Upper => r#" stroke-dasharray="8,4""#,
        };
        writeln!(
            svg,
            r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="{TREND_COLOR}" stroke-width="1.5"{dash}/>"#,
            scale.x(annotation.start.datetime),
            scale.y(annotation.start.price),
            scale.x(annotation.end.datetime),
            scale.y(annotation.end.price),
        )?;

        if let Some(event) = &trend.breakout {
            let (color, label) = breakout_style(trend.side, event.severity);
            let x = scale.x(event.datetime);
            let y = scale.y(event.price);
            writeln!(
                svg,
                r##"<line x1="{x:.2}" y1="{:.2}" x2="{x:.2}" y2="{:.2}" stroke="{color}" stroke-width="2"/><circle cx="{x:.2}" cy="{y:.2}" r="4" fill="{color}"/><text x="{x:.2}" y="{:.2}" font-size="12" text-anchor="middle" fill="#222">{label}</text>"##,
                y - 34.0,
                y - 6.0,
                y - 40.0,
            )?;
        }
        Ok(())
    }

    fn write_legend(&self, svg: &mut String, analysis: &Analysis) -> Result<()> {
        let mut entries: Vec<(&str, &str, &str)> = Vec::new();
        if analysis.levels_of(LevelKind::Support).next().is_some() {
            entries.push((SUPPORT_COLOR, "8,3,2,3", "Support"));
        }
        if analysis.levels_of(LevelKind::Resistance).next().is_some() {
            entries.push((RESISTANCE_COLOR, "6,4", "Resistance"));
        }
        if analysis.lower.is_some() {
            entries.push((TREND_COLOR, "none", "Lower trend"));
        }
        if analysis.upper.is_some() {
            entries.push((TREND_COLOR, "8,4", "Upper trend"));
        }

        let x = MARGIN_LEFT + 12.0;
        for (i, (color, dash, label)) in entries.iter().enumerate() {
            let y = MARGIN_TOP + 18.0 + i as f64 * 18.0;
            writeln!(
                svg,
                r#"<line x1="{x:.2}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" stroke="{color}" stroke-width="1.5" stroke-dasharray="{dash}"/><text x="{:.2}" y="{:.2}" font-size="12">{label}</text>"#,
                x + 28.0,
                x + 34.0,
                y + 4.0,
            )?;
        }
        Ok(())
    }
}

/// Rasterize SVG markup to PNG bytes at its intrinsic size
pub fn rasterize(svg: &str) -> Result<Vec<u8>> {
    let mut options = resvg::usvg::Options::default();
    options.fontdb_mut().load_system_fonts();

    let tree = resvg::usvg::Tree::from_str(svg, &options).context("Failed to parse chart SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .context("Chart has zero size")?;
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap.as_mut());

    pixmap.encode_png().context("Failed to encode chart PNG")
}

impl ChartRenderer for SvgChartRenderer {
    /// Writes `<stem>.svg`, `<stem>.png` and `<stem>.json`; returns the PNG path
    fn render(
        &self,
        symbol: &Symbol,
        series: &[PricePoint],
        analysis: &Analysis,
        path: &Path,
    ) -> Result<PathBuf> {
        let svg = self.to_svg(symbol, series, analysis)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create chart directory")?;
        }

        let svg_path = path.with_extension("svg");
        std::fs::write(&svg_path, &svg).context("Failed to write chart SVG")?;

        let png_path = path.with_extension("png");
        std::fs::write(&png_path, rasterize(&svg)?).context("Failed to write chart PNG")?;

        let annotations = ChartAnnotations::from_analysis(symbol, series, analysis);
        let json_path = save_annotations(&annotations, &path.with_extension("json"))?;

        info!(
            "Chart saved to {} and {} (annotations: {})",
            png_path.display(),
            svg_path.display(),
            json_path.display()
        );
        Ok(png_path)
    }
}

fn breakout_style(side: TrendSide, severity: BreakoutSeverity) -> (&'static str, &'static str) {
    match (severity, side) {
        (BreakoutSeverity::ConfirmedBreakout, TrendSide::Lower) => (CONFIRMED_COLOR, "Trend breakout"),
        (BreakoutSeverity::ConfirmedBreakout, TrendSide::Upper) => (UP_COLOR, "Upper trend breakout"),
        (BreakoutSeverity::PotentialBreakout, _) => (POTENTIAL_COLOR, "Potential breakout"),
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Data-to-pixel mapping for the plot area
struct Scale {
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
    min_x: f64,
    max_x: f64,
    min_price: f64,
    max_price: f64,
}

impl Scale {
    fn new(
        renderer: &SvgChartRenderer,
        series: &[PricePoint],
        analysis: &Analysis,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let prices = series
            .iter()
            .flat_map(|p| [p.low, p.high])
            .chain(analysis.levels.iter().map(|r| r.level.price));
        let (lo, hi) = prices.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        let pad = ((hi - lo) * 0.05).max(hi.abs() * 0.01).max(1e-6);

        let min_x = date_to_num(start);
        let mut max_x = date_to_num(end);
        if max_x <= min_x {
            max_x = min_x + 1.0;
        }

        Scale {
            left: MARGIN_LEFT,
            right: renderer.width - MARGIN_RIGHT,
            top: MARGIN_TOP,
            bottom: renderer.height - MARGIN_BOTTOM,
            min_x,
            max_x,
            min_price: lo - pad,
            max_price: hi + pad,
        }
    }

    fn x(&self, datetime: DateTime<Utc>) -> f64 {
        let t = (date_to_num(datetime) - self.min_x) / (self.max_x - self.min_x);
        // keep half a candle of room at both ends
        let inset = 8.0;
        self.left + inset + t * (self.right - self.left - 2.0 * inset)
    }

    fn y(&self, price: f64) -> f64 {
        let t = (price - self.min_price) / (self.max_price - self.min_price);
        self.bottom - t * (self.bottom - self.top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::config::AnalysisConfig;
    use chrono::{Duration, TimeZone};

    fn wave_series(count: usize) -> Vec<PricePoint> {
        let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let mid = 100.0 + (i as f64 * 0.6).sin() * 5.0 + i as f64 * 0.2;
                let open = mid - 0.5;
                let close = mid + if i % 3 == 0 { -0.8 } else { 0.8 };
                PricePoint::new_unchecked(
                    start + Duration::days(i as i64),
                    open,
                    open.max(close) + 1.0,
                    open.min(close) - 1.0,
                    close,
                    1000.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_svg_contains_all_layers() {
        let series = wave_series(60);
        let config = AnalysisConfig {
            min_separation: 3,
            ..Default::default()
        };
        let analysis = analyze(&series, &config).unwrap();
        let renderer = SvgChartRenderer::new(&ChartConfig::default());

        let svg = renderer.to_svg(&Symbol::new("TEST"), &series, &analysis).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains("TEST support/resistance"));
        assert!(svg.contains(UP_COLOR) && svg.contains(DOWN_COLOR));
        assert!(svg.contains("Lower trend"));
        assert!(svg.contains("Upper trend"));
    }

    #[test]
    fn test_empty_series_is_rejected() {
        let renderer = SvgChartRenderer::new(&ChartConfig::default());
        assert!(renderer
            .to_svg(&Symbol::new("TEST"), &[], &Analysis::default())
            .is_err());
    }

    #[test]
    fn test_annotations_follow_analysis() {
        let series = wave_series(60);
        let analysis = analyze(&series, &AnalysisConfig::default()).unwrap();
        let annotations = ChartAnnotations::from_analysis(&Symbol::new("TEST"), &series, &analysis);

        assert_eq!(annotations.points, 60);
        assert_eq!(annotations.levels.len(), analysis.levels.len());
        let expected = analysis.lower.iter().count() + analysis.upper.iter().count();
        assert_eq!(annotations.trends.len(), expected);
        for trend in &annotations.trends {
            assert!(trend.start.position < trend.end.position);
        }
    }

    #[test]
    fn test_render_writes_png_svg_and_json() {
        let dir = std::env::temp_dir().join(format!("trendscope_chart_{}", std::process::id()));
        let path = dir.join("chart.png");
        let series = wave_series(40);
        let analysis = analyze(&series, &AnalysisConfig::default()).unwrap();

        let renderer = SvgChartRenderer::new(&ChartConfig::default());
        let written = renderer
            .render(&Symbol::new("TEST"), &series, &analysis, &path)
            .unwrap();

        assert_eq!(written, path);
        let png = std::fs::read(&written).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        assert!(dir.join("chart.svg").exists());

        let json = std::fs::read_to_string(dir.join("chart.json")).unwrap();
        let parsed: ChartAnnotations = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.symbol, Symbol::new("TEST"));
    }

    #[test]
    fn test_svg_output_path_still_yields_png() {
        let dir = std::env::temp_dir().join(format!("trendscope_chart_svg_{}", std::process::id()));
        let series = wave_series(30);
        let analysis = analyze(&series, &AnalysisConfig::default()).unwrap();

        let renderer = SvgChartRenderer::new(&ChartConfig::default());
        let written = renderer
            .render(&Symbol::new("TEST"), &series, &analysis, &dir.join("chart.svg"))
            .unwrap();

        assert_eq!(written, dir.join("chart.png"));
        assert!(written.exists());
    }

    #[test]
    fn test_rasterize_uses_svg_size() {
        let png = rasterize(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20"><rect width="40" height="20" fill="red"/></svg>"#,
        )
        .unwrap();
        assert_eq!(&png[1..4], b"PNG");
        // IHDR width and height, big-endian
        assert_eq!(u32::from_be_bytes([png[16], png[17], png[18], png[19]]), 40);
        assert_eq!(u32::from_be_bytes([png[20], png[21], png[22], png[23]]), 20);
        assert!(rasterize("not svg").is_err());
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("A&B<C>"), "A&amp;B&lt;C&gt;");
    }
}
