//! Resolve the two accepted recommendation payload shapes into one.

use serde_json::{Map, Value};

use crate::types::{RecommendationRequest, RecommendationScope, TrainingBucket};

pub const CURRENT_SESSION_BUCKET_ID: &str = "session:current";
const UNKNOWN_DATE: &str = "unknown";

/// The request as sent, resolved once at the boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum RecommendationPayload {
    /// Explicit scope plus grouped buckets.
    Canonical {
        scope: RecommendationScope,
        grouped_training: Vec<TrainingBucket>,
        equipment: Option<Map<String, Value>>,
    },
    /// Raw sessions from older clients.
    Legacy {
        current_session: Option<Map<String, Value>>,
        past_sessions: Vec<Map<String, Value>>,
        machines: Option<Map<String, Value>>,
        equipment: Option<Map<String, Value>>,
    },
}

impl RecommendationPayload {
    /// Canonical wins whenever both `scope` and `grouped_training` are present.
    pub fn from_request(req: &RecommendationRequest) -> Self {
        match (&req.scope, &req.grouped_training) {
            (Some(scope), Some(grouped)) => RecommendationPayload::Canonical {
                scope: scope.clone(),
                grouped_training: grouped.clone(),
                equipment: req.equipment.clone(),
            },
            _ => RecommendationPayload::Legacy {
                current_session: req.current_session.clone(),
                past_sessions: req.past_sessions.clone().unwrap_or_default(),
                machines: req.machines.clone(),
                equipment: req.equipment.clone(),
            },
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, RecommendationPayload::Legacy { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedRecommendation {
    pub scope: RecommendationScope,
    pub buckets: Vec<TrainingBucket>,
    pub equipment: Map<String, Value>,
}

pub fn normalize(payload: RecommendationPayload) -> NormalizedRecommendation {
    match payload {
        RecommendationPayload::Canonical {
            scope,
            grouped_training,
            equipment,
        } => NormalizedRecommendation {
            scope,
            buckets: grouped_training,
            equipment: equipment.unwrap_or_default(),
        },
        RecommendationPayload::Legacy {
            current_session,
            past_sessions,
            machines,
            equipment,
        } => {
            let current = current_session.unwrap_or_default();
            let mut buckets = Vec::with_capacity(past_sessions.len() + 1);
            buckets.push(TrainingBucket::new(
                CURRENT_SESSION_BUCKET_ID,
                session_date(&current),
                session_sets(&current),
            ));
            buckets.extend(past_sessions.iter().map(|session| {
                let started_at = session
                    .get("started_at")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                TrainingBucket::new(
                    format!("session:{started_at}"),
                    session_date(session),
                    session_sets(session),
                )
            }));

            let equipment = machines
                .filter(|m| !m.is_empty())
                .or_else(|| equipment.filter(|e| !e.is_empty()))
                .unwrap_or_default();

            NormalizedRecommendation {
                scope: RecommendationScope::legacy(),
                buckets,
                equipment,
            }
        }
    }
}

/// First ten characters of `started_at`, the calendar-date part of a timestamp.
fn session_date(session: &Map<String, Value>) -> String {
    session
        .get("started_at")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_DATE)
        .chars()
        .take(10)
        .collect()
}

fn session_sets(session: &Map<String, Value>) -> Value {
    session
        .get("sets")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()))
}
