use std::sync::Arc;

use gym_tracker_api::{AppSettings, AppState, Authenticator, LoggingMiddleware, build_router};
use gym_tracker_client::anthropic::ReqwestAnthropicClient;
use gym_tracker_client::supabase::ReqwestSupabaseClient;
use gym_tracker_client::{LlmProvider, RestStore};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing::{error, info, warn};

/// Log filter from `GYM_TRACKER_LOG_LEVEL`, then `RUST_LOG`, then `info`.
fn log_filter_from<F>(mut get: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    get("GYM_TRACKER_LOG_LEVEL")
        .or_else(|| get("RUST_LOG"))
        .unwrap_or_else(|| "info".to_string())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("failed to install ctrl+c handler: {e}");
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let log_env = log_filter_from(|k| std::env::var(k).ok());
    let env_filter = tracing_subscriber::EnvFilter::try_new(log_env.clone())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .compact()
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
    info!(%log_env, "gym_tracker_api: log filter");

    let handle = PrometheusBuilder::new().install_recorder()?;

    let settings = AppSettings::from_env();
    if let Err(missing) = settings.validate_startup_requirements() {
        warn!(
            missing = %missing.join(", "),
            "required settings are missing; affected endpoints will fail until configured"
        );
    }

    let llm: Arc<dyn LlmProvider> = Arc::new(LoggingMiddleware::new(
        ReqwestAnthropicClient::new(settings.anthropic.clone())?,
    ));
    let store: Option<Arc<dyn RestStore>> = ReqwestSupabaseClient::from_config(&settings.supabase)?
        .map(|client| Arc::new(LoggingMiddleware::new(client)) as Arc<dyn RestStore>);
    let auth = Authenticator::from_config(&settings.supabase);
    info!(
        auth_mode = auth.mode_name(),
        store_configured = store.is_some(),
        model = llm.model(),
        "upstreams configured"
    );

    let addr = settings.address;
    let max_body_size = settings.max_body_size;
    let state = Arc::new(AppState::new(settings, llm, store, auth, handle));
    let app = build_router(state);

    info!(%addr, max_body_bytes = max_body_size, "starting HTTP server");
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to address {addr}: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {e}");
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_filter_prefers_service_variable() {
        let filter = log_filter_from(|k| match k {
            "GYM_TRACKER_LOG_LEVEL" => Some("debug".into()),
            "RUST_LOG" => Some("warn".into()),
            _ => None,
        });
        assert_eq!(filter, "debug");
    }

    #[test]
    fn log_filter_falls_back_to_rust_log_then_info() {
        let filter = log_filter_from(|k| (k == "RUST_LOG").then(|| "warn".to_string()));
        assert_eq!(filter, "warn");
        assert_eq!(log_filter_from(|_| None), "info");
    }
}
