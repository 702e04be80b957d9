//! Store-backed operations: report persistence, scope ownership and the
//! weekly trend job.

use std::collections::BTreeSet;
use std::sync::Arc;

use gym_tracker_client::{Filters, Method, RestStore, UpstreamError};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::domains::weekly_trends;
use crate::error::ApiError;
use crate::types::{WeeklyTrendJobResponse, WeeklyTrendReport};

pub const REPORTS_TABLE: &str = "analysis_reports";
pub const SCOPES_TABLE: &str = "recommendation_scopes";
pub const SETS_TABLE: &str = "sets";
/// Most recent sets read per user for the weekly job.
pub const SET_HISTORY_LIMIT: usize = 800;
pub const USER_SCAN_PAGE_SIZE: usize = 1000;
pub const WEEKLY_JOB_SOURCE: &str = "api/jobs/generate-weekly-trends";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportType {
    Recommendation,
    WeeklyTrend,
}

impl ReportType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::Recommendation => "recommendation",
            ReportType::WeeklyTrend => "weekly_trend",
        }
    }
}

/// A report about to be written to `analysis_reports`.
#[derive(Clone, Debug, PartialEq)]
pub struct NewReport {
    pub user_id: String,
    pub report_type: ReportType,
    pub scope_id: Option<String>,
    pub title: String,
    pub summary: Option<String>,
    pub payload: Value,
    pub evidence: Value,
    pub metadata: Value,
}

impl NewReport {
    /// The row as stored: non-object payload/metadata become `{}` and
    /// non-array evidence becomes `[]`.
    pub fn to_row(&self) -> Value {
        let object_or_empty = |v: &Value| {
            if v.is_object() {
                v.clone()
            } else {
                json!({})
            }
        };
        let evidence = if self.evidence.is_array() {
            self.evidence.clone()
        } else {
            json!([])
        };
        json!({
            "user_id": self.user_id,
            "report_type": self.report_type.as_str(),
            "recommendation_scope_id": self.scope_id,
            "status": "ready",
            "title": self.title,
            "summary": self.summary,
            "payload": object_or_empty(&self.payload),
            "evidence": evidence,
            "metadata": object_or_empty(&self.metadata),
        })
    }
}

fn filters(pairs: &[(&str, &str)]) -> Filters {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn RestStore>,
}

impl ReportService {
    pub fn new(store: Arc<dyn RestStore>) -> Self {
        Self { store }
    }

    /// Insert one report row and return the id the store assigned, if any.
    pub async fn persist(&self, report: &NewReport) -> Result<Option<String>, UpstreamError> {
        let result = self
            .store
            .request(
                Method::POST,
                REPORTS_TABLE,
                Some(Value::Array(vec![report.to_row()])),
                filters(&[("select", "id")]),
            )
            .await;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(
            "gym_tracker_reports_total",
            "report_type" => report.report_type.as_str(),
            "outcome" => outcome
        )
        .increment(1);

        let rows = result?;
        Ok(rows
            .as_ref()
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("id"))
            .and_then(id_text))
    }

    /// Whether `scope_id` exists and belongs to `user_id`.
    pub async fn scope_belongs_to(
        &self,
        scope_id: &str,
        user_id: &str,
    ) -> Result<bool, UpstreamError> {
        let id_filter = format!("eq.{scope_id}");
        let user_filter = format!("eq.{user_id}");
        let rows = self
            .store
            .request(
                Method::GET,
                SCOPES_TABLE,
                None,
                filters(&[
                    ("id", id_filter.as_str()),
                    ("user_id", user_filter.as_str()),
                    ("select", "id"),
                    ("limit", "1"),
                ]),
            )
            .await?;
        Ok(rows
            .as_ref()
            .and_then(Value::as_array)
            .is_some_and(|rows| !rows.is_empty()))
    }

    /// Most recent set rows for a user, newest first.
    pub async fn set_history(&self, user_id: &str) -> Result<Vec<Value>, UpstreamError> {
        let user_filter = format!("eq.{user_id}");
        let limit = SET_HISTORY_LIMIT.to_string();
        let rows = self
            .store
            .request(
                Method::GET,
                SETS_TABLE,
                None,
                filters(&[
                    ("user_id", user_filter.as_str()),
                    ("select", "training_date,reps,weight,set_type"),
                    ("order", "training_date.desc"),
                    ("limit", limit.as_str()),
                ]),
            )
            .await?;
        Ok(match rows {
            Some(Value::Array(rows)) => rows,
            _ => Vec::new(),
        })
    }

    /// Every user with at least one set, sorted, via an offset-paginated scan.
    pub async fn list_user_ids_with_sets(
        &self,
        page_size: usize,
    ) -> Result<Vec<String>, UpstreamError> {
        let page_size = page_size.max(1);
        let limit = page_size.to_string();
        let mut user_ids = BTreeSet::new();
        let mut offset = 0usize;

        loop {
            let offset_text = offset.to_string();
            let rows = self
                .store
                .request(
                    Method::GET,
                    SETS_TABLE,
                    None,
                    filters(&[
                        ("select", "user_id"),
                        ("user_id", "not.is.null"),
                        ("order", "user_id.asc"),
                        ("limit", limit.as_str()),
                        ("offset", offset_text.as_str()),
                    ]),
                )
                .await?;
            let rows = match rows {
                Some(Value::Array(rows)) if !rows.is_empty() => rows,
                _ => break,
            };

            user_ids.extend(
                rows.iter()
                    .filter_map(|row| row.get("user_id"))
                    .filter_map(id_text)
                    .filter(|id| !id.is_empty()),
            );

            if rows.len() < page_size {
                break;
            }
            offset += page_size;
        }

        Ok(user_ids.into_iter().collect())
    }

    /// Aggregate one user's recent sets and store the result as a report.
    pub async fn build_weekly_trend_report(
        &self,
        user_id: &str,
    ) -> Result<WeeklyTrendReport, ApiError> {
        let rows = self.set_history(user_id).await.map_err(ApiError::Store)?;
        let trend = weekly_trends::aggregate(&rows);

        let week_start_min = trend.weeks.first().map(|w| w.week_start.to_string());
        let week_start_max = trend.weeks.last().map(|w| w.week_start.to_string());
        let report = NewReport {
            user_id: user_id.to_string(),
            report_type: ReportType::WeeklyTrend,
            scope_id: None,
            title: "Weekly trends".to_string(),
            summary: Some(trend.summary.clone()),
            payload: json!({ "weeks": trend.weeks }),
            evidence: serde_json::to_value(&trend.evidence).unwrap_or_else(|_| json!([])),
            metadata: json!({
                "source": WEEKLY_JOB_SOURCE,
                "week_count": trend.weeks.len(),
                "week_start_min": week_start_min,
                "week_start_max": week_start_max,
                "included_set_types": ["all"],
            }),
        };

        let report_id = self.persist(&report).await.map_err(|e| {
            warn!(%user_id, error = %e, "failed to persist weekly trend report");
            ApiError::Persistence(e)
        })?;

        Ok(WeeklyTrendReport {
            user_id: user_id.to_string(),
            report_id,
            weeks: trend.weeks,
        })
    }

    /// Build reports for one user or for everyone with sets, sequentially.
    /// The first failure aborts the remaining users.
    pub async fn run_weekly_trend_job(
        &self,
        target_user: Option<&str>,
    ) -> Result<WeeklyTrendJobResponse, ApiError> {
        let user_ids = match target_user {
            Some(user) => vec![user.to_string()],
            None => self
                .list_user_ids_with_sets(USER_SCAN_PAGE_SIZE)
                .await
                .map_err(ApiError::Store)?,
        };
        info!(users = user_ids.len(), "running weekly trend job");

        let mut reports = Vec::with_capacity(user_ids.len());
        for user_id in &user_ids {
            reports.push(self.build_weekly_trend_report(user_id).await?);
        }

        Ok(WeeklyTrendJobResponse {
            ok: true,
            processed_users: reports.len(),
            reports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockStore;

    #[test]
    fn report_row_defaults_invalid_shapes() {
        let report = NewReport {
            user_id: "u1".into(),
            report_type: ReportType::Recommendation,
            scope_id: None,
            title: "On-demand recommendation".into(),
            summary: None,
            payload: Value::Null,
            evidence: json!({"not": "a list"}),
            metadata: Value::Null,
        };
        assert_eq!(
            report.to_row(),
            json!({
                "user_id": "u1",
                "report_type": "recommendation",
                "recommendation_scope_id": null,
                "status": "ready",
                "title": "On-demand recommendation",
                "summary": null,
                "payload": {},
                "evidence": [],
                "metadata": {}
            })
        );
    }

    #[tokio::test]
    async fn persist_returns_first_row_id() {
        let store = Arc::new(MockStore::new());
        store.push_response(Ok(Some(json!([{"id": "r-1"}, {"id": "r-2"}]))));
        let service = ReportService::new(store.clone());
        let report = NewReport {
            user_id: "u1".into(),
            report_type: ReportType::WeeklyTrend,
            scope_id: None,
            title: "Weekly trends".into(),
            summary: Some("s".into()),
            payload: json!({"weeks": []}),
            evidence: json!([]),
            metadata: json!({}),
        };
        assert_eq!(service.persist(&report).await.expect("id"), Some("r-1".into()));

        let calls = store.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, Method::POST);
        assert_eq!(calls[0].resource, "analysis_reports");
        assert_eq!(calls[0].filters, vec![("select".to_string(), "id".to_string())]);
        assert_eq!(calls[0].payload.as_ref().and_then(|p| p.as_array()).map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn persist_without_rows_has_no_id() {
        let store = Arc::new(MockStore::new());
        store.push_response(Ok(None));
        let service = ReportService::new(store);
        let report = NewReport {
            user_id: "u1".into(),
            report_type: ReportType::Recommendation,
            scope_id: Some("s1".into()),
            title: "t".into(),
            summary: None,
            payload: json!({}),
            evidence: json!([]),
            metadata: json!({}),
        };
        assert_eq!(service.persist(&report).await.expect("ok"), None);
    }

    #[tokio::test]
    async fn scope_ownership_uses_id_and_user_filters() {
        let store = Arc::new(MockStore::new());
        store.push_response(Ok(Some(json!([]))));
        store.push_response(Ok(Some(json!([{"id": "s1"}]))));
        let service = ReportService::new(store.clone());

        assert!(!service.scope_belongs_to("s1", "intruder").await.expect("query"));
        assert!(service.scope_belongs_to("s1", "owner").await.expect("query"));

        let calls = store.calls();
        assert_eq!(calls[0].resource, "recommendation_scopes");
        assert!(calls[0].filters.contains(&("id".into(), "eq.s1".into())));
        assert!(calls[0].filters.contains(&("user_id".into(), "eq.intruder".into())));
        assert!(calls[0].filters.contains(&("limit".into(), "1".into())));
    }

    #[tokio::test]
    async fn user_scan_pages_until_short_page() {
        let store = Arc::new(MockStore::new());
        store.push_response(Ok(Some(json!([{"user_id": "b"}, {"user_id": "a"}]))));
        store.push_response(Ok(Some(json!([{"user_id": "a"}, {"user_id": "c"}]))));
        store.push_response(Ok(Some(json!([{"user_id": "d"}, {"user_id": null}, {}]))));
        let service = ReportService::new(store.clone());

        let users = service.list_user_ids_with_sets(2).await.expect("users");
        assert_eq!(users, vec!["a", "b", "c", "d"]);

        let offsets: Vec<String> = store
            .calls()
            .iter()
            .filter_map(|c| c.filters.iter().find(|(k, _)| k == "offset").map(|(_, v)| v.clone()))
            .collect();
        assert_eq!(offsets, vec!["0", "2", "4"]);
    }

    #[tokio::test]
    async fn user_scan_stops_on_empty_page() {
        let store = Arc::new(MockStore::new());
        store.push_response(Ok(Some(json!([{"user_id": "a"}, {"user_id": "b"}]))));
        store.push_response(Ok(Some(json!([]))));
        let service = ReportService::new(store.clone());
        let users = service.list_user_ids_with_sets(2).await.expect("users");
        assert_eq!(users, vec!["a", "b"]);
        assert_eq!(store.calls().len(), 2);
    }

    #[tokio::test]
    async fn weekly_report_is_persisted_with_metadata() {
        let store = Arc::new(MockStore::new());
        store.push_response(Ok(Some(json!([
            {"training_date": "2026-01-13", "reps": 10, "weight": 50, "set_type": "working"},
            {"training_date": "2026-01-06", "reps": 8, "weight": 50, "set_type": "working"},
            {"training_date": "garbage", "reps": 8, "weight": 50}
        ]))));
        store.push_response(Ok(Some(json!([{"id": "rep-9"}]))));
        let service = ReportService::new(store.clone());

        let report = service.build_weekly_trend_report("u1").await.expect("report");
        assert_eq!(report.report_id.as_deref(), Some("rep-9"));
        assert_eq!(report.weeks.len(), 2);

        let calls = store.calls();
        assert_eq!(calls[0].resource, "sets");
        assert!(calls[0].filters.contains(&("limit".into(), "800".into())));
        assert!(calls[0].filters.contains(&("order".into(), "training_date.desc".into())));

        let row = &calls[1].payload.as_ref().expect("payload")[0];
        assert_eq!(row["report_type"], "weekly_trend");
        assert_eq!(row["title"], "Weekly trends");
        assert_eq!(row["summary"], "Week of 2026-01-12: 1 sets, 10 reps, 500.0 volume.");
        assert_eq!(row["payload"]["weeks"][0]["week_start"], "2026-01-05");
        assert_eq!(row["evidence"].as_array().map(Vec::len), Some(3));
        assert_eq!(
            row["metadata"],
            json!({
                "source": "api/jobs/generate-weekly-trends",
                "week_count": 2,
                "week_start_min": "2026-01-05",
                "week_start_max": "2026-01-12",
                "included_set_types": ["all"]
            })
        );
    }

    #[tokio::test]
    async fn job_aborts_on_first_failure() {
        let store = Arc::new(MockStore::new());
        // user scan
        store.push_response(Ok(Some(json!([{"user_id": "u1"}, {"user_id": "u2"}]))));
        // u1 history, then a failing insert
        store.push_response(Ok(Some(json!([]))));
        store.push_response(Err(UpstreamError::Status {
            status: 500,
            body: "boom".into(),
        }));
        let service = ReportService::new(store.clone());

        let err = service.run_weekly_trend_job(None).await.unwrap_err();
        assert!(matches!(err, ApiError::Persistence(_)));
        // u2 was never touched
        assert_eq!(store.calls().len(), 3);
    }

    #[tokio::test]
    async fn job_for_single_user_skips_scan() {
        let store = Arc::new(MockStore::new());
        store.push_response(Ok(Some(json!([]))));
        store.push_response(Ok(Some(json!([{"id": 42}]))));
        let service = ReportService::new(store.clone());

        let response = service.run_weekly_trend_job(Some("u7")).await.expect("job");
        assert!(response.ok);
        assert_eq!(response.processed_users, 1);
        assert_eq!(response.reports[0].user_id, "u7");
        assert_eq!(response.reports[0].report_id.as_deref(), Some("42"));
        assert!(response.reports[0].weeks.is_empty());
        assert_eq!(store.calls()[0].resource, "sets");
    }

    #[tokio::test]
    async fn job_with_no_users_reports_nothing() {
        let store = Arc::new(MockStore::new());
        store.push_response(Ok(None));
        let service = ReportService::new(store);
        let response = service.run_weekly_trend_job(None).await.expect("job");
        assert!(response.ok);
        assert_eq!(response.processed_users, 0);
        assert!(response.reports.is_empty());
    }
}
