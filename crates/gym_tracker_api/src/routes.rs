//! HTTP surface: handlers, router and middleware stack.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, debug_handler};
use gym_tracker_client::{ContentBlock, Message};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sha2::Sha256;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::domains::{RecommendationPayload, normalize, trim_to_token_budget};
use crate::error::{ApiError, ApiResult};
use crate::prompts::{identify_prompt, recommendation_prompt};
use crate::services::{NewReport, ReportType};
use crate::settings::AllowedOrigins;
use crate::state::AppState;
use crate::transforms::parse_json_response;
use crate::types::{
    IdentifyRequest, RecommendationRequest, WeeklyTrendJobRequest, WeeklyTrendJobResponse,
};

pub const CRON_SECRET_HEADER: &str = "x-cron-secret";
pub const MAX_IDENTIFY_IMAGES: usize = 3;
/// Reply budget for both LLM calls.
pub const LLM_MAX_TOKENS: u32 = 1000;
/// Whole-request ceiling; one LLM call plus a few store round trips.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const RECOMMENDATION_SOURCE: &str = "api/recommendations";

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Helpers
// ============================================================================

/// Deserialize a JSON body; malformed input is a 400, an empty body is `T::default()`.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::Validation(e.to_string()))
}

/// Constant-time comparison through HMAC tags of both values.
fn secrets_match(expected: &str, provided: &str) -> bool {
    let tag = |value: &str| -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(b"gym-tracker-cron-secret").ok()?;
        mac.update(value.as_bytes());
        Some(mac)
    };
    match (tag(expected), tag(provided)) {
        (Some(expected), Some(provided)) => provided
            .verify_slice(&expected.finalize().into_bytes())
            .is_ok(),
        _ => false,
    }
}

fn llm_failure(err: gym_tracker_client::UpstreamError, user_id: &str) -> ApiError {
    error!(%user_id, error = %err, "LLM request failed");
    ApiError::from_llm(err)
}

// ============================================================================
// Handlers
// ============================================================================

#[debug_handler]
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "model": state.llm.model(),
        "rollout_flags": state.settings.feature_flags,
    }))
}

#[debug_handler]
async fn feature_flags(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.settings.feature_flags)
}

#[debug_handler]
async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state.metrics.render();
    ([("content-type", "text/plain; version=0.0.4")], body)
}

#[debug_handler]
async fn identify_machine(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let req: IdentifyRequest = parse_body(&body)?;
    if req.images.is_empty() {
        return Err(ApiError::Validation("At least one image required".into()));
    }
    if req.images.len() > MAX_IDENTIFY_IMAGES {
        return Err(ApiError::Validation("Maximum 3 images".into()));
    }
    if req.images.iter().any(|img| img.data.is_empty()) {
        return Err(ApiError::Validation("Image data must not be empty".into()));
    }
    tracing::debug!(%user_id, images = req.images.len(), "identify-machine request authorized");

    let mut blocks: Vec<ContentBlock> = req
        .images
        .into_iter()
        .map(|img| ContentBlock::base64_image(img.media_type, img.data))
        .collect();
    blocks.push(ContentBlock::text(identify_prompt(
        req.enrich_with_web_search,
    )));

    let text = state
        .llm
        .complete(vec![Message::user_blocks(blocks)], LLM_MAX_TOKENS)
        .await
        .map_err(|e| llm_failure(e, &user_id))?;
    let parsed = parse_json_response(&text)
        .map_err(|_| ApiError::Parse("Failed to parse LLM response".into()))?;
    Ok(Json(parsed))
}

#[debug_handler]
async fn recommendations(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let req: RecommendationRequest = parse_body(&body)?;
    tracing::debug!(%user_id, "recommendations request authorized");

    let requested_scope = req.scope_id.as_deref().filter(|s| !s.is_empty());
    let mut validated_scope_id: Option<String> = None;
    if let Some(scope_id) = requested_scope {
        match &state.reports {
            Some(reports) => {
                let owned = reports
                    .scope_belongs_to(scope_id, &user_id)
                    .await
                    .map_err(|e| {
                        error!(%user_id, %scope_id, error = %e, "scope ownership lookup failed");
                        ApiError::Store(e)
                    })?;
                if !owned {
                    warn!(%user_id, %scope_id, "rejected recommendation request with invalid scope ownership");
                    return Err(ApiError::Validation("Invalid scope_id".into()));
                }
                validated_scope_id = Some(scope_id.to_string());
            }
            None => {
                warn!(%user_id, %scope_id, "skipping scope validation because store credentials are not configured");
            }
        }
    }

    let payload = RecommendationPayload::from_request(&req);
    if payload.is_legacy() {
        tracing::debug!(%user_id, "normalizing legacy session payload");
    }
    let normalized = normalize(payload);
    let buckets = trim_to_token_budget(&normalized.buckets, state.settings.max_history_tokens);
    let prompt = recommendation_prompt(
        &normalized.scope,
        &buckets,
        &normalized.equipment,
        &req.soreness_data,
    );

    let text = state
        .llm
        .complete(vec![Message::user_text(prompt)], LLM_MAX_TOKENS)
        .await
        .map_err(|e| {
            error!(%user_id, scope_id = ?validated_scope_id, error = %e, "LLM request failed");
            ApiError::from_llm(e)
        })?;
    let parsed = parse_json_response(&text)
        .map_err(|_| ApiError::Parse("Failed to parse LLM response".into()))?;
    let Value::Object(mut response) = parsed else {
        return Err(ApiError::Parse("LLM response must be a JSON object".into()));
    };

    let report = NewReport {
        user_id: user_id.clone(),
        report_type: ReportType::Recommendation,
        scope_id: validated_scope_id.clone(),
        title: "On-demand recommendation".to_string(),
        summary: response
            .get("summary")
            .and_then(Value::as_str)
            .map(str::to_string),
        payload: Value::Object(response.clone()),
        evidence: response.get("evidence").cloned().unwrap_or_else(|| json!([])),
        metadata: json!({
            "grouping": normalized.scope.grouping,
            "included_set_types": normalized.scope.included_set_types,
            "source": RECOMMENDATION_SOURCE,
        }),
    };

    let persisted = match &state.reports {
        Some(reports) => reports.persist(&report).await.map_err(ApiError::Persistence),
        None => Err(ApiError::Config(
            "SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY must be configured".into(),
        )),
    };
    let report_persisted = match persisted {
        Ok(report_id) => {
            if let Some(id) = report_id {
                response.insert("report_id".into(), Value::String(id));
            }
            true
        }
        Err(e) => {
            error!(%user_id, scope_id = ?validated_scope_id, error = %e, "failed to persist recommendation report");
            response.remove("report_id");
            false
        }
    };

    if let Some(scope_id) = validated_scope_id {
        response.insert("scope_id".into(), Value::String(scope_id));
    }
    response.insert("report_persisted".into(), Value::Bool(report_persisted));
    Ok(Json(Value::Object(response)))
}

#[debug_handler]
async fn weekly_trends_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WeeklyTrendJobResponse>> {
    let provided = headers
        .get(CRON_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    let authorized = match (&state.settings.cron_shared_secret, provided) {
        (Some(expected), Some(provided)) => secrets_match(expected.expose_secret(), provided),
        _ => false,
    };
    if !authorized {
        warn!("weekly trends job rejected: missing or invalid cron secret");
        return Err(ApiError::Unauthorized);
    }

    let req: WeeklyTrendJobRequest = parse_body(&body)?;
    let target_user = req
        .target_user()
        .map_err(|msg| ApiError::Validation(msg.to_string()))?;
    let reports = state.reports.as_ref().ok_or_else(|| {
        ApiError::Config("SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY must be configured".into())
    })?;
    let response = reports.run_weekly_trend_job(target_user).await?;
    info!(processed_users = response.processed_users, "weekly trends job finished");
    Ok(Json(response))
}

// ============================================================================
// Router
// ============================================================================

/// Tag every request with a fresh id and run it inside a span carrying it.
async fn request_span(mut req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
        user_id = tracing::field::Empty,
    );
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        req.headers_mut().insert("x-request-id", value.clone());
        let mut response = next.run(req).instrument(span).await;
        response.headers_mut().insert("x-request-id", value);
        return response;
    }
    next.run(req).instrument(span).await
}

pub fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    match origins {
        AllowedOrigins::Any => CorsLayer::new()
            .allow_origin(AllowOrigin::any())
            .allow_methods(methods)
            .allow_headers(Any),
        AllowedOrigins::List(list) => {
            let values: Vec<HeaderValue> = list
                .iter()
                .filter(|o| o.as_str() != "*")
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect();
            // credentials forbid wildcard headers, so list the ones clients send
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(values))
                .allow_methods(methods)
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                    axum::http::HeaderName::from_static(CRON_SECRET_HEADER),
                ])
                .allow_credentials(true)
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let max_body_size = state.settings.max_body_size;
    let cors = cors_layer(&state.settings.allowed_origins);

    Router::new()
        .route("/identify", post(identify_machine))
        .route("/recommendations", post(recommendations))
        .route("/jobs/weekly-trends", post(weekly_trends_job))
        .route("/health", get(health))
        .route("/feature-flags", get(feature_flags))
        .route("/metrics", get(metrics_endpoint))
        // paths used by existing clients
        .route("/api/identify-machine", post(identify_machine))
        .route("/api/recommendations", post(recommendations))
        .route("/api/jobs/generate-weekly-trends", post(weekly_trends_job))
        .route("/api/health", get(health))
        .route("/api/rollout-flags", get(feature_flags))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(cors)
        .layer(middleware::from_fn(request_span))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::AppSettings;
    use crate::test_utils::{MockLlm, MockStore, bearer_for, test_state};
    use axum::body::{Body, to_bytes};
    use axum::http::Request as HttpRequest;
    use gym_tracker_client::{MessageContent, UpstreamError};
    use tower::ServiceExt;

    async fn call(
        router: Router,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: Value,
    ) -> (StatusCode, Value) {
        let mut builder = HttpRequest::builder().method(method).uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let req = builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn settings_with(pairs: &[(&'static str, &'static str)]) -> AppSettings {
        let pairs = pairs.to_vec();
        AppSettings::from_env_with(move |k| {
            pairs
                .iter()
                .find(|(key, _)| *key == k)
                .map(|(_, v)| v.to_string())
        })
    }

    fn canonical_body() -> Value {
        json!({
            "scope": {"grouping": "training_day", "goals": ["strength"]},
            "grouped_training": [
                {"training_bucket_id": "d1", "training_date": "2026-01-05", "sets": [{"reps": 8, "weight": 60}]}
            ],
            "scope_id": "scope-1"
        })
    }

    #[test]
    fn secrets_compare_exactly() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cret", "s3cre"));
        assert!(!secrets_match("s3cret", "S3CRET"));
        assert!(!secrets_match("s3cret", ""));
    }

    #[test]
    fn empty_body_parses_to_default() {
        let req: WeeklyTrendJobRequest = parse_body(&Bytes::from_static(b"  ")).unwrap();
        assert!(req.user_id.is_none());
        let err = parse_body::<WeeklyTrendJobRequest>(&Bytes::from_static(b"{bad")).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn health_reports_model_and_flags() {
        let state = test_state(settings_with(&[("PLANS_ENABLED", "false")]), Arc::new(MockLlm::new()), None);
        for path in ["/health", "/api/health"] {
            let (status, body) = call(build_router(state.clone()), "GET", path, &[], Value::Null).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "ok");
            assert_eq!(body["model"], "mock-model");
            assert_eq!(body["rollout_flags"]["plansEnabled"], false);
        }
        let (_, flags) = call(build_router(state), "GET", "/api/rollout-flags", &[], Value::Null).await;
        assert_eq!(flags["setCentricLogging"], true);
    }

    #[tokio::test]
    async fn wildcard_in_origin_list_allows_any_origin() {
        let state = test_state(
            settings_with(&[("ALLOWED_ORIGINS", "*,https://a.app")]),
            Arc::new(MockLlm::new()),
            None,
        );
        let req = HttpRequest::builder()
            .uri("/health")
            .header("origin", "https://elsewhere.app")
            .body(Body::empty())
            .unwrap();
        let resp = build_router(state).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn explicit_origin_list_skips_wildcard_entries() {
        let layer = cors_layer(&AllowedOrigins::List(vec![
            "*".into(),
            "https://a.app".into(),
        ]));
        let router = Router::new().route("/", get(|| async { "ok" })).layer(layer);
        let req = HttpRequest::builder()
            .uri("/")
            .header("origin", "https://a.app")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.headers()["access-control-allow-origin"], "https://a.app");
        assert_eq!(resp.headers()["access-control-allow-credentials"], "true");
    }

    #[tokio::test]
    async fn recommendation_requires_bearer_token() {
        let llm = Arc::new(MockLlm::new());
        let state = test_state(AppSettings::default(), llm.clone(), None);
        let (status, body) = call(build_router(state), "POST", "/recommendations", &[], canonical_body()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn recommendation_happy_path_persists_report() {
        let llm = Arc::new(MockLlm::replying(
            "```json\n{\"summary\": \"Solid week\", \"evidence\": [{\"claim\": \"c\"}]}\n```",
        ));
        let store = Arc::new(MockStore::new());
        store.push_response(Ok(Some(json!([{"id": "scope-1"}]))));
        store.push_response(Ok(Some(json!([{"id": "report-1"}]))));
        let state = test_state(AppSettings::default(), llm.clone(), Some(store.clone()));
        let token = bearer_for("user-1");

        let (status, body) = call(
            build_router(state),
            "POST",
            "/api/recommendations",
            &[("authorization", &token)],
            canonical_body(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"], "Solid week");
        assert_eq!(body["scope_id"], "scope-1");
        assert_eq!(body["report_id"], "report-1");
        assert_eq!(body["report_persisted"], true);

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1, LLM_MAX_TOKENS);
        let MessageContent::Text(prompt) = &requests[0].0[0].content else {
            panic!("expected a text prompt");
        };
        assert!(prompt.contains("GROUPED TRAINING DATA (1 buckets)"));

        let calls = store.calls();
        assert_eq!(calls[1].resource, "analysis_reports");
        let row = &calls[1].payload.as_ref().unwrap()[0];
        assert_eq!(row["user_id"], "user-1");
        assert_eq!(row["recommendation_scope_id"], "scope-1");
        assert_eq!(row["title"], "On-demand recommendation");
        assert_eq!(row["summary"], "Solid week");
        assert_eq!(row["evidence"], json!([{"claim": "c"}]));
        assert_eq!(
            row["metadata"],
            json!({"grouping": "training_day", "included_set_types": ["working"], "source": "api/recommendations"})
        );
    }

    #[tokio::test]
    async fn foreign_scope_is_rejected_before_llm() {
        let llm = Arc::new(MockLlm::replying("{}"));
        let store = Arc::new(MockStore::new());
        store.push_response(Ok(Some(json!([]))));
        let state = test_state(AppSettings::default(), llm.clone(), Some(store.clone()));
        let token = bearer_for("intruder");

        let (status, body) = call(
            build_router(state),
            "POST",
            "/recommendations",
            &[("authorization", &token)],
            canonical_body(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Invalid scope_id");
        assert!(llm.requests().is_empty());
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn persistence_failure_degrades_gracefully() {
        let llm = Arc::new(MockLlm::replying(r#"{"summary": "ok", "report_id": "from-model"}"#));
        let store = Arc::new(MockStore::new());
        store.push_response(Err(UpstreamError::Status {
            status: 500,
            body: "db down".into(),
        }));
        let state = test_state(AppSettings::default(), llm, Some(store));
        let token = bearer_for("user-1");
        let mut body = canonical_body();
        body.as_object_mut().unwrap().remove("scope_id");

        let (status, body) = call(
            build_router(state),
            "POST",
            "/recommendations",
            &[("authorization", &token)],
            body,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["report_persisted"], false);
        assert!(body.get("report_id").is_none());
        assert!(body.get("scope_id").is_none());
    }

    #[tokio::test]
    async fn scope_check_is_skipped_without_store() {
        let llm = Arc::new(MockLlm::replying(r#"{"summary": "ok"}"#));
        let state = test_state(AppSettings::default(), llm.clone(), None);
        let token = bearer_for("user-1");

        let (status, body) = call(
            build_router(state),
            "POST",
            "/recommendations",
            &[("authorization", &token)],
            canonical_body(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("scope_id").is_none());
        assert_eq!(body["report_persisted"], false);
        assert_eq!(llm.requests().len(), 1);
    }

    #[tokio::test]
    async fn non_object_llm_reply_is_bad_gateway() {
        let llm = Arc::new(MockLlm::replying("[1, 2, 3]"));
        let state = test_state(AppSettings::default(), llm, None);
        let token = bearer_for("user-1");
        let (status, body) = call(
            build_router(state),
            "POST",
            "/recommendations",
            &[("authorization", &token)],
            json!({"current_session": {"started_at": "2026-01-05T10:00:00Z", "sets": []}}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "parse");
    }

    #[tokio::test]
    async fn identify_validates_image_count() {
        let llm = Arc::new(MockLlm::new());
        let state = test_state(AppSettings::default(), llm.clone(), None);
        let token = bearer_for("user-1");
        let image = json!({"data": "AAAA"});

        for (images, detail) in [
            (json!([]), "At least one image required"),
            (json!([image, image, image, image]), "Maximum 3 images"),
            (json!([{"data": ""}]), "Image data must not be empty"),
        ] {
            let (status, body) = call(
                build_router(state.clone()),
                "POST",
                "/identify",
                &[("authorization", &token)],
                json!({"images": images}),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["detail"], detail);
        }
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn identify_sends_images_then_prompt() {
        let llm = Arc::new(MockLlm::replying(r#"{"name": "Seated Row"}"#));
        let state = test_state(AppSettings::default(), llm.clone(), None);
        let token = bearer_for("user-1");

        let (status, body) = call(
            build_router(state),
            "POST",
            "/api/identify-machine",
            &[("authorization", &token)],
            json!({"images": [{"data": "AAAA"}, {"data": "BBBB", "media_type": "image/png"}], "enrich_with_web_search": true}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"name": "Seated Row"}));

        let requests = llm.requests();
        let MessageContent::Blocks(blocks) = &requests[0].0[0].content else {
            panic!("expected content blocks");
        };
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], ContentBlock::base64_image("image/jpeg", "AAAA"));
        assert_eq!(blocks[1], ContentBlock::base64_image("image/png", "BBBB"));
        assert_eq!(blocks[2], ContentBlock::text(identify_prompt(true)));
    }

    #[tokio::test]
    async fn job_without_secret_never_touches_store() {
        let store = Arc::new(MockStore::new());
        // no secret configured at all
        let state = test_state(AppSettings::default(), Arc::new(MockLlm::new()), Some(store.clone()));
        let (status, _) = call(
            build_router(state),
            "POST",
            "/jobs/weekly-trends",
            &[(CRON_SECRET_HEADER, "anything")],
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // secret configured, wrong header
        let state = test_state(
            settings_with(&[("CRON_SHARED_SECRET", "cron-s3cret")]),
            Arc::new(MockLlm::new()),
            Some(store.clone()),
        );
        let (status, _) = call(
            build_router(state.clone()),
            "POST",
            "/api/jobs/generate-weekly-trends",
            &[(CRON_SECRET_HEADER, "guess")],
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(build_router(state), "POST", "/jobs/weekly-trends", &[], json!({})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn job_rejects_blank_user_instead_of_running_everyone() {
        let store = Arc::new(MockStore::new());
        let state = test_state(
            settings_with(&[("CRON_SHARED_SECRET", "cron-s3cret")]),
            Arc::new(MockLlm::new()),
            Some(store.clone()),
        );
        let (status, body) = call(
            build_router(state),
            "POST",
            "/jobs/weekly-trends",
            &[(CRON_SECRET_HEADER, "cron-s3cret")],
            json!({"user_id": "   "}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "user_id must not be blank");
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn job_runs_for_requested_user() {
        let store = Arc::new(MockStore::new());
        store.push_response(Ok(Some(json!([
            {"training_date": "2026-01-05", "reps": 10, "weight": 50},
            {"training_date": "2026-01-06", "reps": 8, "weight": 50}
        ]))));
        store.push_response(Ok(Some(json!([{"id": "rep-1"}]))));
        let state = test_state(
            settings_with(&[("CRON_SHARED_SECRET", "cron-s3cret")]),
            Arc::new(MockLlm::new()),
            Some(store),
        );

        let (status, body) = call(
            build_router(state),
            "POST",
            "/jobs/weekly-trends",
            &[(CRON_SECRET_HEADER, "cron-s3cret")],
            json!({"user_id": "u1"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "ok": true,
                "processed_users": 1,
                "reports": [{
                    "user_id": "u1",
                    "report_id": "rep-1",
                    "weeks": [{"week_start": "2026-01-05", "total_sets": 2, "total_reps": 18, "total_volume": 900.0}]
                }]
            })
        );
    }
}
