use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

const FENCE: &str = "```";

static FENCE_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

fn fence_regex() -> Option<&'static Regex> {
    FENCE_REGEX
        .get_or_init(|| Regex::new(r"```(?:json)?").ok())
        .as_ref()
}

/// Remove markdown code fences that models wrap around JSON answers.
///
/// A leading fence line (with or without a language tag) and a trailing fence
/// are cut first; any fence left in the body is then removed in place.
pub fn strip_code_fences(text: &str) -> String {
    let mut cleaned = text.trim();
    if cleaned.starts_with(FENCE) {
        cleaned = cleaned.split_once('\n').map_or(cleaned, |(_, rest)| rest);
    }
    if let Some(rest) = cleaned.strip_suffix(FENCE) {
        cleaned = rest;
    }
    let cleaned = match fence_regex() {
        Some(re) => re.replace_all(cleaned, "").into_owned(),
        None => cleaned.replace("```json", "").replace(FENCE, ""),
    };
    cleaned.trim().to_string()
}

/// Parse a model reply as JSON after stripping code fences.
pub fn parse_json_response(text: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(&strip_code_fences(text))
}
