use std::sync::Arc;

use gym_tracker_client::{LlmProvider, RestStore};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::auth::Authenticator;
use crate::services::ReportService;
use crate::settings::AppSettings;

/// Shared state handed to every handler.
pub struct AppState {
    pub settings: AppSettings,
    pub llm: Arc<dyn LlmProvider>,
    /// `None` when the store credentials are not configured.
    pub reports: Option<ReportService>,
    pub auth: Authenticator,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(
        settings: AppSettings,
        llm: Arc<dyn LlmProvider>,
        store: Option<Arc<dyn RestStore>>,
        auth: Authenticator,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            settings,
            llm,
            reports: store.map(ReportService::new),
            auth,
            metrics,
        }
    }
}
