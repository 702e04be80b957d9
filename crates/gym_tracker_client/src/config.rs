use crate::UpstreamError;
use secrecy::SecretString;

pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Clone, Debug)]
pub struct AnthropicConfig {
    pub api_key: Option<SecretString>,
    pub model: String,
    pub base_url: String,
}

impl AnthropicConfig {
    /// Testable helper that reads configuration values using the provided
    /// function instead of the process environment.
    pub fn from_env_with<F>(mut get: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let api_key = non_empty(get("ANTHROPIC_API_KEY")).map(|k| SecretString::new(k.into()));
        let model =
            non_empty(get("ANTHROPIC_MODEL")).unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.into());
        let base_url = non_empty(get("ANTHROPIC_BASE_URL"))
            .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.into());
        Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn require_api_key(&self) -> Result<&SecretString, UpstreamError> {
        self.api_key
            .as_ref()
            .ok_or_else(|| UpstreamError::Config("ANTHROPIC_API_KEY missing".into()))
    }
}

#[derive(Clone, Debug, Default)]
pub struct SupabaseConfig {
    pub url: String,
    pub jwt_secret: Option<SecretString>,
    pub jwt_audience: Option<String>,
    pub jwt_issuer: Option<String>,
    pub jwks_url: Option<String>,
    pub service_role_key: Option<SecretString>,
}

impl SupabaseConfig {
    pub fn from_env_with<F>(mut get: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        Self {
            url: get("SUPABASE_URL")
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
            jwt_secret: non_empty(get("SUPABASE_JWT_SECRET")).map(|s| SecretString::new(s.into())),
            jwt_audience: non_empty(get("SUPABASE_JWT_AUDIENCE")),
            jwt_issuer: non_empty(get("SUPABASE_JWT_ISSUER")),
            jwks_url: non_empty(get("SUPABASE_JWKS_URL")),
            service_role_key: non_empty(get("SUPABASE_SERVICE_ROLE_KEY"))
                .map(|s| SecretString::new(s.into())),
        }
    }

    /// Explicit issuer, else the project's auth endpoint.
    pub fn resolved_jwt_issuer(&self) -> Option<String> {
        if let Some(iss) = &self.jwt_issuer {
            return Some(iss.clone());
        }
        (!self.url.is_empty()).then(|| format!("{}/auth/v1", self.url))
    }

    /// Explicit key-set URL, else the project's well-known JWKS document.
    pub fn resolved_jwks_url(&self) -> Option<String> {
        if let Some(url) = &self.jwks_url {
            return Some(url.clone());
        }
        (!self.url.is_empty()).then(|| format!("{}/auth/v1/.well-known/jwks.json", self.url))
    }

    /// Both the project URL and the service role key are present.
    pub fn is_admin_configured(&self) -> bool {
        !self.url.is_empty() && self.service_role_key.is_some()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
