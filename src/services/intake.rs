//! Quick intake - rule-based extraction of a draft enterprise from a
//! phone-call transcript. Nothing is persisted.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

const UNKNOWN_NAME: &str = "未知主体";
const DEFAULT_INDUSTRY: &str = "通用行业";
const DEFAULT_BASE: &str = "成都";

const TECH_KEYWORDS: [&str; 5] = ["PaddleOCR", "pp-ocrv5", "文心", "ERNIE", "混元"];
const HARDWARE_KEYWORDS: [&str; 5] = ["昇腾", "910B", "CPU", "GPU", "显卡"];

/// Draft fields recognized in a transcript
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeDraft {
    pub enterprise_name: String,
    pub industry: String,
    pub base: String,
    pub clue_stage: &'static str,
    pub clue_source: &'static str,
    pub tech_stack: Vec<String>,
    pub hardware_context: String,
    pub background: String,
    pub scenario: String,
    pub progress: String,
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([\p{Han}a-zA-Z0-9]+集团|[\p{Han}a-zA-Z0-9]+有限公司)").unwrap())
}

fn industry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"【(.*?)】").unwrap())
}

fn base_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)base[：: ]\s*(\S+)").unwrap())
}

// A section ends at a blank line or at the next `标题：` line
fn section_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n|\n\p{Han}+[：:]").unwrap())
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).map(|caps| caps[1].to_string())
}

/// Body of `name：...` up to the next section; empty when absent
fn section(text: &str, name: &str) -> String {
    let start = [format!("{}：", name), format!("{}:", name)]
        .iter()
        .filter_map(|heading| text.find(heading.as_str()).map(|at| at + heading.len()))
        .min();
    let Some(start) = start else {
        return String::new();
    };
    let rest = &text[start..];
    let end = section_end_re().find(rest).map_or(rest.len(), |m| m.start());
    rest[..end].trim().to_string()
}

fn clue_stage(progress: &str) -> &'static str {
    let any = |words: &[&str]| words.iter().any(|w| progress.contains(w));
    if any(&["测试", "调研", "环境搭载"]) {
        "EMPOWERING"
    } else if any(&["合同", "采购", "正式使用"]) {
        "ADOPTED"
    } else if any(&["推广", "推荐"]) {
        "POWERED_BY"
    } else {
        "LEAD"
    }
}

pub fn parse_transcript(text: &str) -> IntakeDraft {
    let progress = section(text, "进展");
    let draft = IntakeDraft {
        enterprise_name: capture(name_re(), text).unwrap_or_else(|| UNKNOWN_NAME.to_string()),
        industry: capture(industry_re(), text).unwrap_or_else(|| DEFAULT_INDUSTRY.to_string()),
        base: capture(base_re(), text).unwrap_or_else(|| DEFAULT_BASE.to_string()),
        clue_stage: clue_stage(&progress),
        clue_source: "PHONE",
        tech_stack: TECH_KEYWORDS
            .iter()
            .filter(|k| text.contains(*k))
            .map(|k| k.to_string())
            .collect(),
        hardware_context: HARDWARE_KEYWORDS
            .iter()
            .copied()
            .filter(|k| text.contains(k))
            .collect::<Vec<_>>()
            .join(", "),
        background: section(text, "企业背景"),
        scenario: section(text, "需求场景"),
        progress,
    };
    debug!(name = %draft.enterprise_name, stage = draft.clue_stage, "Transcript parsed");
    draft
}
