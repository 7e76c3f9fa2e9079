//! Chart narration through a vision-capable language model
//!
//! Narration never fails the run: any error comes back as the commentary
//! text itself, prefixed with `Error analyzing chart:`.

use anyhow::{Context, Result};
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT_SECS: u64 = 120;

pub const ANALYSIS_PROMPT: &str = "Please analyze this financial chart and provide insights about:
1. Key support and resistance levels
2. Major trend directions
3. Any notable breakout points
4. Overall market sentiment based on the patterns
Be specific about price levels and dates where possible.";

/// Turns a rendered chart into free-text commentary
pub trait ChartNarrator {
    fn narrate(&self, chart: &Path) -> String;
}

/// Chart payload as sent to the model
#[derive(Debug, Clone, PartialEq)]
pub enum ChartPart {
    /// Markup formats (SVG) go as text
    Text(String),
    /// Raster images go base64 encoded
    Image { mime_type: &'static str, data: String },
}

impl ChartPart {
    pub fn from_file(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let mime_type = match ext.as_str() {
            "svg" => {
                let markup = std::fs::read_to_string(path).context("Failed to read chart")?;
                return Ok(ChartPart::Text(markup));
            }
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "webp" => "image/webp",
            other => anyhow::bail!("Unsupported chart format: {:?}", other),
        };

        let bytes = std::fs::read(path).context("Failed to read chart")?;
        Ok(ChartPart::Image {
            mime_type,
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        })
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            ChartPart::Text(markup) => json!({ "text": format!("Chart (SVG):\n{}", markup) }),
            ChartPart::Image { mime_type, data } => json!({
                "inline_data": { "mime_type": mime_type, "data": data }
            }),
        }
    }
}

/// Build the `generateContent` request body
pub fn request_body(prompt: &str, chart: &ChartPart) -> serde_json::Value {
    json!({
        "contents": [{
            "parts": [{ "text": prompt }, chart.to_json()]
        }]
    })
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Concatenated text parts of the first candidate
pub fn parse_response(body: &str) -> Result<String> {
    let response: GenerateResponse =
        serde_json::from_str(body).context("Failed to parse model response")?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        anyhow::bail!("Model returned no text");
    }
    Ok(text)
}

pub struct GeminiNarrator {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiNarrator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(StdDuration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_URL.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }

    fn try_narrate(&self, chart: &Path) -> Result<String> {
        let part = ChartPart::from_file(chart)?;
        let body = request_body(ANALYSIS_PROMPT, &part);

        info!("Requesting chart narration from {}", self.model);
        debug!("POST {}", self.endpoint());

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .context("Failed to send request")?;

        let status = response.status();
        let text = response.text().context("Failed to read response body")?;
        if !status.is_success() {
            anyhow::bail!("API returned status {}: {}", status, text);
        }

        parse_response(&text)
    }
}

impl ChartNarrator for GeminiNarrator {
    fn narrate(&self, chart: &Path) -> String {
        self.try_narrate(chart).unwrap_or_else(|e| {
            warn!("Chart narration failed: {:#}", e);
            format!("Error analyzing chart: {:#}", e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Support near 125. "},{"text":"Uptrend intact."}]}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "Support near 125. Uptrend intact.");
    }

    #[test]
    fn test_parse_response_without_text() {
        assert!(parse_response(r#"{"candidates":[]}"#).is_err());
        assert!(parse_response("not json").is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let part = ChartPart::Image {
            mime_type: "image/png",
            data: "AAAA".to_string(),
        };
        let body = request_body("describe", &part);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "describe");
        assert_eq!(body["contents"][0]["parts"][1]["inline_data"]["mime_type"], "image/png");
    }

    #[test]
    fn test_chart_part_from_files() {
        let dir = std::env::temp_dir().join(format!("trendscope_narration_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let svg = dir.join("chart.svg");
        std::fs::write(&svg, "<svg></svg>").unwrap();
        assert_eq!(ChartPart::from_file(&svg).unwrap(), ChartPart::Text("<svg></svg>".to_string()));

        let png = dir.join("chart.png");
        std::fs::write(&png, [0x89u8, b'P', b'N', b'G']).unwrap();
        match ChartPart::from_file(&png).unwrap() {
            ChartPart::Image { mime_type, data } => {
                assert_eq!(mime_type, "image/png");
                assert_eq!(data, "iVBORw==");
            }
            other => panic!("unexpected part: {:?}", other),
        }

        assert!(ChartPart::from_file(&dir.join("chart.gif")).is_err());
    }

    #[test]
    fn test_missing_chart_degrades_to_message() {
        let narrator = GeminiNarrator::new("key", "gemini-1.5-flash").unwrap();
        let text = narrator.narrate(Path::new("/nonexistent/chart.svg"));
        assert!(text.starts_with("Error analyzing chart:"));
    }
}
