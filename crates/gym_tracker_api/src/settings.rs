//! Process configuration read from the environment.

use std::net::SocketAddr;

use gym_tracker_client::config::{AnthropicConfig, SupabaseConfig};
use secrecy::SecretString;
use serde::Serialize;

pub const DEFAULT_MAX_HISTORY_TOKENS: i64 = 4000;
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_MAX_BODY_SIZE: usize = 20 * 1024 * 1024;

/// Client rollout switches, served as-is to the frontend.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    pub set_centric_logging: bool,
    pub library_screen_enabled: bool,
    pub analysis_on_demand_only: bool,
    pub plans_enabled: bool,
    pub favorites_ordering_enabled: bool,
    pub home_dashboard_enabled: bool,
    pub machine_rating_enabled: bool,
    pub pinned_favorites_enabled: bool,
    pub machine_autofill_enabled: bool,
    pub weighted_muscle_profile_workload_enabled: bool,
    pub fixed_option_machine_taxonomy_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            set_centric_logging: true,
            library_screen_enabled: true,
            analysis_on_demand_only: true,
            plans_enabled: true,
            favorites_ordering_enabled: true,
            home_dashboard_enabled: true,
            machine_rating_enabled: true,
            pinned_favorites_enabled: true,
            machine_autofill_enabled: true,
            weighted_muscle_profile_workload_enabled: true,
            fixed_option_machine_taxonomy_enabled: true,
        }
    }
}

impl FeatureFlags {
    pub fn from_env_with<F>(mut get: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let d = Self::default();
        let mut flag = |name: &str, default: bool| parse_flag(name, get(name), default);
        Self {
            set_centric_logging: flag("SET_CENTRIC_LOGGING", d.set_centric_logging),
            library_screen_enabled: flag("LIBRARY_SCREEN_ENABLED", d.library_screen_enabled),
            analysis_on_demand_only: flag("ANALYSIS_ON_DEMAND_ONLY", d.analysis_on_demand_only),
            plans_enabled: flag("PLANS_ENABLED", d.plans_enabled),
            favorites_ordering_enabled: flag(
                "FAVORITES_ORDERING_ENABLED",
                d.favorites_ordering_enabled,
            ),
            home_dashboard_enabled: flag("HOME_DASHBOARD_ENABLED", d.home_dashboard_enabled),
            machine_rating_enabled: flag("MACHINE_RATING_ENABLED", d.machine_rating_enabled),
            pinned_favorites_enabled: flag("PINNED_FAVORITES_ENABLED", d.pinned_favorites_enabled),
            machine_autofill_enabled: flag("MACHINE_AUTOFILL_ENABLED", d.machine_autofill_enabled),
            weighted_muscle_profile_workload_enabled: flag(
                "WEIGHTED_MUSCLE_PROFILE_WORKLOAD_ENABLED",
                d.weighted_muscle_profile_workload_enabled,
            ),
            fixed_option_machine_taxonomy_enabled: flag(
                "FIXED_OPTION_MACHINE_TAXONOMY_ENABLED",
                d.fixed_option_machine_taxonomy_enabled,
            ),
        }
    }
}

/// Lenient boolean parsing; unrecognised values keep the default.
fn parse_flag(name: &str, raw: Option<String>, default: bool) -> bool {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            tracing::warn!(flag = name, value = %raw, default, "invalid rollout flag value; using default");
            default
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return AllowedOrigins::List(vec![DEFAULT_ALLOWED_ORIGIN.to_string()]);
        };
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if origins.iter().any(|o| o == "*") {
            if origins.len() > 1 {
                tracing::warn!(
                    origins = %raw,
                    "ALLOWED_ORIGINS contains '*'; allowing any origin"
                );
            }
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins)
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppSettings {
    pub anthropic: AnthropicConfig,
    pub supabase: SupabaseConfig,
    pub max_history_tokens: i64,
    pub cron_shared_secret: Option<SecretString>,
    pub allowed_origins: AllowedOrigins,
    pub feature_flags: FeatureFlags,
    pub address: SocketAddr,
    pub max_body_size: usize,
}

impl AppSettings {
    pub fn from_env() -> Self {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads values through `get` instead of the
    /// process environment.
    pub fn from_env_with<F>(mut get: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let anthropic = AnthropicConfig::from_env_with(&mut get);
        let supabase = SupabaseConfig::from_env_with(&mut get);
        let feature_flags = FeatureFlags::from_env_with(&mut get);

        let max_history_tokens = get("MAX_HISTORY_TOKENS")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_MAX_HISTORY_TOKENS);
        let cron_shared_secret = get("CRON_SHARED_SECRET")
            .filter(|s| !s.is_empty())
            .map(|s| SecretString::new(s.into()));
        let allowed_origins = AllowedOrigins::parse(get("ALLOWED_ORIGINS").as_deref());
        let address = get("ADDRESS")
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)));
        let max_body_size = get("MAX_HTTP_BODY_SIZE")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_BODY_SIZE);

        Self {
            anthropic,
            supabase,
            max_history_tokens,
            cron_shared_secret,
            allowed_origins,
            feature_flags,
            address,
            max_body_size,
        }
    }

    /// Names of required settings that are missing.
    pub fn validate_startup_requirements(&self) -> Result<(), Vec<&'static str>> {
        let mut missing = Vec::new();
        if self.anthropic.api_key.is_none() {
            missing.push("ANTHROPIC_API_KEY");
        }
        if self.supabase.url.is_empty() {
            missing.push("SUPABASE_URL");
        }
        if self.supabase.service_role_key.is_none() {
            missing.push("SUPABASE_SERVICE_ROLE_KEY");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self::from_env_with(|_| None)
    }
}
