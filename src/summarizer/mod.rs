//! Policy summarization behind a trait.
//!
//! Backends:
//! - `MoonshotSummarizer` - any OpenAI-compatible chat completions API
//! - `MockSummarizer` - canned responses for tests
//!
//! A backend only returns the raw model text; `parse_analysis` turns it into
//! a `PolicyAnalysis`.

pub mod mock;
pub mod moonshot;

pub use mock::MockSummarizer;
pub use moonshot::MoonshotSummarizer;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::NexusError;

/// Characters of page text kept after markup stripping
pub const MAX_CONTENT_CHARS: usize = 8000;

/// Characters of page text placed into the prompt
pub const PROMPT_CONTENT_CHARS: usize = 5000;

pub const TRUNCATION_MARKER: &str = "...[truncated]";

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that outputs only JSON.";

/// Core trait for summarization backends.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Backend identifier (model name).
    fn id(&self) -> &str;

    /// Send the prompt and return the model's raw reply.
    async fn summarize(&self, prompt: &str) -> Result<String, NexusError>;
}

/// Structured result of analyzing one policy page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyAnalysis {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub publish_city: Option<String>,
    pub publish_year: Option<i32>,
    /// Comma separated
    pub industry_tags: Option<String>,
    pub mind_map: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    publish_city: Option<String>,
    #[serde(default)]
    publish_year: Option<Value>,
    #[serde(default)]
    industry_tags: Option<Value>,
    #[serde(default)]
    mind_map: Option<Value>,
}

/// Cut `text` to at most `max` characters, appending the marker when cut
pub fn truncate_content(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}{}", &text[..idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

fn prefix_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Build the user prompt for a page's text
pub fn build_prompt(content: &str) -> String {
    format!(
        r##"You are a Policy Analysis Expert. Analyze the following policy text (which may be raw scraped text) and extract key information.

Return a STRICT JSON object (no markdown formatting) with the following structure:
{{
  "title": "Policy Title",
  "summary": "A concise summary of the policy (max 200 words)",
  "publishCity": "City or Region name (e.g., Beijing)",
  "publishYear": "YYYY",
  "industryTags": "Comma separated tags (e.g., AI, Manufacturing)",
  "mindMap": {{
    "nodes": [{{"id": "root", "label": "Title", "color": "#3b82f6"}}],
    "links": [{{"source": "root", "target": "child"}}]
  }}
}}

For the mindMap, create a simple tree structure showing: Target Audience, Support Measures (Money/Resources), Qualifications, and Timeline.

Text to analyze:
{}"##,
        prefix_chars(content, PROMPT_CONTENT_CHARS)
    )
}

/// Remove Markdown code fences around a JSON reply
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.strip_prefix("json").unwrap_or(rest);
        text = text.trim_start();
        if let Some(body) = text.trim_end().strip_suffix("```") {
            text = body;
        }
    }
    text.trim()
}

fn year_from(value: Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().get(..4).and_then(|y| y.parse().ok()),
        _ => None,
    }
}

fn tags_from(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => {
            let tags: Vec<String> = items
                .into_iter()
                .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
                .filter(|s| !s.is_empty())
                .collect();
            (!tags.is_empty()).then(|| tags.join(","))
        }
        _ => None,
    }
}

/// Parse a model reply into a `PolicyAnalysis`
pub fn parse_analysis(raw: &str) -> Result<PolicyAnalysis, NexusError> {
    let json = strip_code_fences(raw);
    let parsed: RawAnalysis = serde_json::from_str(json)
        .map_err(|e| NexusError::Upstream(format!("summarizer returned invalid JSON: {}", e)))?;

    Ok(PolicyAnalysis {
        title: parsed.title.filter(|t| !t.trim().is_empty()),
        summary: parsed.summary,
        publish_city: parsed.publish_city,
        publish_year: parsed.publish_year.and_then(year_from),
        industry_tags: parsed.industry_tags.and_then(tags_from),
        mind_map: parsed.mind_map.filter(|m| !m.is_null()),
    })
}
