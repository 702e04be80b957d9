use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::{RecommendationScope, TrainingBucket};

const IDENTIFY_PROMPT: &str = r#"You are a gym equipment expert. Analyze these photos of a gym machine or exercise station.
Identify the machine and the specific exercise/movement it's set up for.
Look for details like grip position, seat adjustment, cable angle, etc.

Return ONLY valid JSON (no markdown, no backticks):
{
  "name": "short machine name",
  "exerciseType": "Push | Pull | Legs | Core",
  "movement": "specific movement name with variation",
  "muscleGroups": ["Primary", "Secondary"],
  "variations": ["other exercises possible on this machine"],
  "defaultWeight": 20,
  "defaultReps": 10,
  "notes": "brief form tips"
}"#;

const IDENTIFY_ENRICHED_PROMPT: &str = r#"You are a gym equipment expert. Analyze these photos of a gym machine or exercise station.
Use an enriched lookup approach (as if cross-checking common gym catalogs and web references) to infer likely machine family/model, aliases, and target muscles.
Identify the machine and the specific exercise/movement it's set up for.
Look for details like grip position, seat adjustment, cable angle, and foot/seat/chest-pad positioning.

Return ONLY valid JSON (no markdown, no backticks):
{
  "name": "short machine name",
  "exerciseType": "Push | Pull | Legs | Core",
  "movement": "specific movement name with variation",
  "muscleGroups": ["Primary", "Secondary"],
  "muscleProfile": {
    "primary": ["muscle groups"],
    "secondary": ["muscle groups"]
  },
  "variations": ["other exercises possible on this machine"],
  "aliases": ["common alternate names for this station"],
  "likelyModel": "optional likely machine family or model name",
  "defaultWeight": 20,
  "defaultReps": 10,
  "notes": "brief form tips including confidence caveats"
}"#;

const RECOMMENDATION_INSTRUCTIONS: &str = r#"Use the scope fields exactly as constraints. Prioritize explainable, evidence-based insights.
Treat scope.goals as explicit user priorities and optimize recommendation ranking/order to satisfy those goals first.
When trade-offs are required, call them out and explain how each suggestion serves the listed goals.
Consider volume progression, muscle balance, rest patterns, soreness feedback, and exercise variety.
Do not infer set duration if duration_seconds is missing.

Return ONLY valid JSON:
{
  "summary": "2-3 sentence summary",
  "highlights": ["2-3 positives"],
  "suggestions": ["2-3 actionable improvements"],
  "nextSession": "what to focus on next",
  "progressNotes": "notable trends in strength/volume",
  "evidence": [
    {
      "claim": "short claim",
      "metric": "metric_name",
      "period": "scope-aligned period",
      "delta": 0.0,
      "source": {
        "grouping": "training_day|cluster",
        "included_set_types": ["working"],
        "sample_size": 0
      }
    }
  ]
}"#;

/// Machine identification instructions, appended after the image blocks.
pub fn identify_prompt(enriched: bool) -> &'static str {
    if enriched {
        IDENTIFY_ENRICHED_PROMPT
    } else {
        IDENTIFY_PROMPT
    }
}

/// Two-space indented JSON with non-ASCII characters escaped.
pub fn pretty_json<T: Serialize + ?Sized>(value: &T) -> String {
    let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string());
    if rendered.is_ascii() {
        return rendered;
    }
    // Structural JSON characters are ASCII, so anything else sits inside a string literal.
    let mut out = String::with_capacity(rendered.len() + 16);
    for ch in rendered.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

pub fn recommendation_prompt(
    scope: &RecommendationScope,
    buckets: &[TrainingBucket],
    equipment: &Map<String, Value>,
    soreness: &[Map<String, Value>],
) -> String {
    let soreness_section = if soreness.is_empty() {
        String::new()
    } else {
        format!("\n\nRECENT SORENESS REPORTS:\n{}", pretty_json(soreness))
    };

    format!(
        "You are an expert personal trainer analyzing set-based training data.\n\n\
         ANALYSIS SCOPE:\n{scope}\n\n\
         PRIORITY GOALS (rank recommendations to match these first):\n{goals}\n\n\
         GROUPED TRAINING DATA ({count} buckets):\n{buckets}\n\n\
         EQUIPMENT CATALOG:\n{equipment}{soreness}\n\n\
         {instructions}",
        scope = pretty_json(scope),
        goals = pretty_json(&scope.goals),
        count = buckets.len(),
        buckets = pretty_json(buckets),
        equipment = pretty_json(equipment),
        soreness = soreness_section,
        instructions = RECOMMENDATION_INSTRUCTIONS,
    )
}
