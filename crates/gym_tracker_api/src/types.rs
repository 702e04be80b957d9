//! Request and response types shared by the HTTP handlers and the domain modules.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_SET_TYPE: &str = "working";

// ============================================================================
// Recommendation scope
// ============================================================================

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    #[default]
    TrainingDay,
    Cluster,
    TrainingWeek,
}

impl Grouping {
    pub fn as_str(self) -> &'static str {
        match self {
            Grouping::TrainingDay => "training_day",
            Grouping::Cluster => "cluster",
            Grouping::TrainingWeek => "training_week",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RecommendationScope {
    #[serde(default)]
    pub grouping: Grouping,
    #[serde(default)]
    pub date_start: Option<String>,
    #[serde(default)]
    pub date_end: Option<String>,
    #[serde(
        default = "default_set_types",
        deserialize_with = "deserialize_set_types"
    )]
    pub included_set_types: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_scope_list")]
    pub goals: Vec<String>,
    /// Free-text request. The outer `None` marks the scope synthesized for
    /// legacy payloads, which carries no such field at all.
    #[serde(
        default = "canonical_recommendations",
        deserialize_with = "deserialize_recommendations",
        skip_serializing_if = "Option::is_none"
    )]
    pub recommendations: Option<Option<String>>,
}

impl Default for RecommendationScope {
    fn default() -> Self {
        Self {
            grouping: Grouping::TrainingDay,
            date_start: None,
            date_end: None,
            included_set_types: default_set_types(),
            goals: Vec::new(),
            recommendations: canonical_recommendations(),
        }
    }
}

impl RecommendationScope {
    /// Scope applied to legacy session payloads: defaults only, five fields.
    pub fn legacy() -> Self {
        Self {
            recommendations: None,
            ..Self::default()
        }
    }
}

fn canonical_recommendations() -> Option<Option<String>> {
    Some(None)
}

fn deserialize_recommendations<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn default_set_types() -> Vec<String> {
    vec![DEFAULT_SET_TYPE.to_string()]
}

/// Trim, drop null/empty entries and deduplicate while keeping first occurrences.
pub fn normalize_scope_list(values: &[Value]) -> Result<Vec<String>, String> {
    let mut normalized: Vec<String> = Vec::new();
    for item in values {
        let text = match item {
            Value::Null => continue,
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            other => return Err(format!("expected string entries, got {other}")),
        };
        if !text.is_empty() && !normalized.contains(&text) {
            normalized.push(text);
        }
    }
    Ok(normalized)
}

fn deserialize_scope_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => normalize_scope_list(&items).map_err(D::Error::custom),
        Some(_) => Err(D::Error::custom("Must be an array of strings")),
    }
}

fn deserialize_set_types<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let list = deserialize_scope_list(deserializer)?;
    Ok(if list.is_empty() {
        default_set_types()
    } else {
        list
    })
}

// ============================================================================
// Training buckets
// ============================================================================

/// A group of sets sharing a date or session. Client fields are kept verbatim.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct TrainingBucket(pub Map<String, Value>);

impl TrainingBucket {
    pub fn new(id: impl Into<String>, training_date: impl Into<String>, sets: Value) -> Self {
        let mut map = Map::new();
        map.insert("training_bucket_id".into(), Value::String(id.into()));
        map.insert("training_date".into(), Value::String(training_date.into()));
        map.insert("sets".into(), sets);
        Self(map)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("training_bucket_id").and_then(Value::as_str)
    }

    pub fn training_date(&self) -> Option<&str> {
        self.0.get("training_date").and_then(Value::as_str)
    }

    pub fn sets(&self) -> &[Value] {
        self.0
            .get("sets")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default)]
    pub scope: Option<RecommendationScope>,
    #[serde(default)]
    pub grouped_training: Option<Vec<TrainingBucket>>,
    #[serde(default)]
    pub equipment: Option<Map<String, Value>>,
    #[serde(default)]
    pub soreness_data: Vec<Map<String, Value>>,
    #[serde(default)]
    pub scope_id: Option<String>,

    // Older clients send raw sessions instead of grouped buckets.
    #[serde(default)]
    pub current_session: Option<Map<String, Value>>,
    #[serde(default)]
    pub past_sessions: Option<Vec<Map<String, Value>>>,
    #[serde(default)]
    pub machines: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IdentifyImage {
    pub data: String,
    #[serde(default = "default_media_type")]
    pub media_type: String,
}

fn default_media_type() -> String {
    "image/jpeg".to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdentifyRequest {
    #[serde(default)]
    pub images: Vec<IdentifyImage>,
    #[serde(default)]
    pub enrich_with_web_search: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WeeklyTrendJobRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

impl WeeklyTrendJobRequest {
    /// Requested user. Absent or `""` means every user; a whitespace-only id
    /// is rejected rather than widened into a full run.
    pub fn target_user(&self) -> Result<Option<&str>, &'static str> {
        match self.user_id.as_deref() {
            None | Some("") => Ok(None),
            Some(id) => match id.trim() {
                "" => Err("user_id must not be blank"),
                trimmed => Ok(Some(trimmed)),
            },
        }
    }
}

// ============================================================================
// Weekly trends and evidence
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WeeklyAggregate {
    pub week_start: chrono::NaiveDate,
    pub total_sets: u64,
    pub total_reps: i64,
    pub total_volume: f64,
}

/// Integer deltas for counts, one-decimal reals for volume.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetricDelta {
    Count(i64),
    Amount(f64),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SampleSizeDetail {
    pub latest_week_sets: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_week_sets: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EvidenceSource {
    pub grouping: String,
    pub included_set_types: Vec<String>,
    pub sample_size: u64,
    pub sample_size_detail: SampleSizeDetail,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EvidenceItem {
    pub claim: String,
    pub metric: String,
    pub period: String,
    pub delta: MetricDelta,
    pub source: EvidenceSource,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct WeeklyTrendReport {
    pub user_id: String,
    pub report_id: Option<String>,
    pub weeks: Vec<WeeklyAggregate>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct WeeklyTrendJobResponse {
    pub ok: bool,
    pub processed_users: usize,
    pub reports: Vec<WeeklyTrendReport>,
}
