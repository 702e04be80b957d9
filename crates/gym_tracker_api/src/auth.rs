//! Bearer-token authentication for Supabase access tokens.
//!
//! Three modes, picked once at startup from the configuration:
//!
//! - a shared HS256 secret,
//! - RS256/ES256 keys published as a JWKS document,
//! - unverified decoding when neither is configured. Expiry is still enforced
//!   and a warning is logged for every token.
//!
//! The JWKS keys live in a [`JwksCache`] owned by the [`Authenticator`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use gym_tracker_client::config::SupabaseConfig;
use jwt_simple::prelude::{
    Duration as JwtDuration, ES256PublicKey, ECDSAP256PublicKeyLike, HS256Key, JWTClaims,
    MACLike, RS256PublicKey, RSAPublicKeyLike, Token, VerificationOptions,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Signing keys are re-fetched after this long.
pub const JWKS_REFRESH_INTERVAL: Duration = Duration::from_secs(300);
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing or malformed bearer token")]
    MissingBearer,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token has no expiry")]
    MissingExpiry,
    #[error("token expired")]
    Expired,
    #[error("token carries no user id")]
    MissingUserId,
    #[error("unknown signing key")]
    UnknownKey,
    #[error("key set unavailable: {0}")]
    KeySet(String),
}

impl From<jwt_simple::Error> for AuthError {
    fn from(err: jwt_simple::Error) -> Self {
        AuthError::InvalidToken(err.to_string())
    }
}

/// Claims beyond the registered set that identify the caller.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SupabaseClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Value>,
}

// ============================================================================
// JWKS
// ============================================================================

#[derive(Debug, Deserialize)]
struct JwkSet {
    #[serde(default)]
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    kty: String,
    #[serde(default)]
    crv: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
}

pub enum SigningKey {
    Rsa(RS256PublicKey),
    Ec(ES256PublicKey),
}

impl SigningKey {
    fn from_jwk(jwk: &Jwk) -> Result<Self, AuthError> {
        let field = |v: &Option<String>, name: &str| -> Result<Vec<u8>, AuthError> {
            let raw = v
                .as_deref()
                .ok_or_else(|| AuthError::KeySet(format!("JWK missing '{name}'")))?;
            URL_SAFE_NO_PAD
                .decode(raw.trim_end_matches('='))
                .map_err(|e| AuthError::KeySet(format!("JWK '{name}' is not base64url: {e}")))
        };
        match jwk.kty.as_str() {
            "RSA" => {
                let key = RS256PublicKey::from_components(&field(&jwk.n, "n")?, &field(&jwk.e, "e")?)
                    .map_err(|e| AuthError::KeySet(e.to_string()))?;
                Ok(SigningKey::Rsa(key))
            }
            "EC" if jwk.crv.as_deref().unwrap_or("P-256") == "P-256" => {
                let mut point = vec![0x04];
                point.extend(field(&jwk.x, "x")?);
                point.extend(field(&jwk.y, "y")?);
                let key =
                    ES256PublicKey::from_bytes(&point).map_err(|e| AuthError::KeySet(e.to_string()))?;
                Ok(SigningKey::Ec(key))
            }
            other => Err(AuthError::KeySet(format!("unsupported key type {other}"))),
        }
    }

    fn verify(
        &self,
        token: &str,
        options: VerificationOptions,
    ) -> Result<JWTClaims<SupabaseClaims>, AuthError> {
        let claims = match self {
            SigningKey::Rsa(key) => key.verify_token::<SupabaseClaims>(token, Some(options))?,
            SigningKey::Ec(key) => key.verify_token::<SupabaseClaims>(token, Some(options))?,
        };
        Ok(claims)
    }
}

struct CachedKeys {
    url: String,
    fetched_at: Instant,
    keys: HashMap<String, Arc<SigningKey>>,
}

/// Signing keys fetched from a JWKS endpoint.
///
/// Refreshed when empty, when the requested URL differs from the cached one,
/// or after [`JWKS_REFRESH_INTERVAL`]. An unknown `kid` triggers one extra
/// refresh. Concurrent callers may both refresh; the last write wins.
pub struct JwksCache {
    http: reqwest::Client,
    refresh_interval: Duration,
    cached: RwLock<Option<CachedKeys>>,
}

impl JwksCache {
    pub fn new() -> Self {
        Self::with_refresh_interval(JWKS_REFRESH_INTERVAL)
    }

    pub fn with_refresh_interval(refresh_interval: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            refresh_interval,
            cached: RwLock::new(None),
        }
    }

    pub async fn key(&self, url: &str, kid: &str) -> Result<Arc<SigningKey>, AuthError> {
        let lookup = {
            let cache = self.cached.read().await;
            cache
                .as_ref()
                .filter(|c| c.url == url && c.fetched_at.elapsed() <= self.refresh_interval)
                .map(|c| c.keys.get(kid).cloned())
        };
        match lookup {
            Some(Some(key)) => return Ok(key),
            Some(None) => debug!(kid, "signing key not cached; refreshing key set"),
            None => {}
        }

        self.refresh(url).await?;
        let cache = self.cached.read().await;
        cache
            .as_ref()
            .and_then(|c| c.keys.get(kid).cloned())
            .ok_or(AuthError::UnknownKey)
    }

    async fn refresh(&self, url: &str) -> Result<(), AuthError> {
        info!(%url, "fetching JWKS");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::KeySet(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::KeySet(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }
        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::KeySet(e.to_string()))?;

        let mut keys = HashMap::new();
        for jwk in &set.keys {
            let Some(kid) = jwk.kid.clone() else {
                continue;
            };
            match SigningKey::from_jwk(jwk) {
                Ok(key) => {
                    keys.insert(kid, Arc::new(key));
                }
                Err(e) => warn!(%kid, error = %e, "skipping unusable JWK"),
            }
        }

        *self.cached.write().await = Some(CachedKeys {
            url: url.to_string(),
            fetched_at: Instant::now(),
            keys,
        });
        Ok(())
    }
}

impl Default for JwksCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Authenticator
// ============================================================================

enum Mode {
    SharedSecret(HS256Key),
    KeySet { url: String, cache: JwksCache },
    Unverified,
}

pub struct Authenticator {
    mode: Mode,
    audience: Option<String>,
    issuer: Option<String>,
}

impl Authenticator {
    pub fn from_config(config: &SupabaseConfig) -> Self {
        let mode = if let Some(secret) = &config.jwt_secret {
            Mode::SharedSecret(HS256Key::from_bytes(secret.expose_secret().as_bytes()))
        } else if let Some(url) = config.resolved_jwks_url() {
            Mode::KeySet {
                url,
                cache: JwksCache::new(),
            }
        } else {
            Mode::Unverified
        };
        Self {
            mode,
            audience: config.jwt_audience.clone(),
            issuer: config.resolved_jwt_issuer(),
        }
    }

    /// Use a prepared key cache, e.g. one with a shorter refresh interval.
    pub fn with_jwks_cache(mut self, cache: JwksCache) -> Self {
        if let Mode::KeySet { cache: current, .. } = &mut self.mode {
            *current = cache;
        }
        self
    }

    pub fn mode_name(&self) -> &'static str {
        match self.mode {
            Mode::SharedSecret(_) => "hs256",
            Mode::KeySet { .. } => "jwks",
            Mode::Unverified => "unverified",
        }
    }

    fn options(&self) -> VerificationOptions {
        VerificationOptions {
            allowed_issuers: self.issuer.clone().map(|i| HashSet::from([i])),
            allowed_audiences: self.audience.clone().map(|a| HashSet::from([a])),
            time_tolerance: Some(JwtDuration::from_secs(0)),
            ..Default::default()
        }
    }

    /// Resolve the user id carried by an `Authorization` header value.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<String, AuthError> {
        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingBearer)?;

        let (user_id, subject) = match &self.mode {
            Mode::SharedSecret(key) => {
                let claims = key.verify_token::<SupabaseClaims>(token, Some(self.options()))?;
                verified_identity(claims)?
            }
            Mode::KeySet { url, cache } => {
                let metadata = Token::decode_metadata(token)?;
                if !matches!(metadata.algorithm(), "RS256" | "ES256") {
                    return Err(AuthError::InvalidToken(format!(
                        "algorithm {} not allowed",
                        metadata.algorithm()
                    )));
                }
                let kid = metadata.key_id().ok_or(AuthError::UnknownKey)?;
                let key = cache.key(url, kid).await?;
                verified_identity(key.verify(token, self.options())?)?
            }
            Mode::Unverified => {
                warn!(
                    "JWT signature verification is disabled because neither SUPABASE_JWT_SECRET nor SUPABASE_JWKS_URL is configured"
                );
                decode_unverified(token, chrono::Utc::now().timestamp())?
            }
        };

        user_id
            .as_ref()
            .and_then(claim_text)
            .or_else(|| subject.filter(|s| !s.is_empty()))
            .ok_or(AuthError::MissingUserId)
    }
}

fn verified_identity(
    claims: JWTClaims<SupabaseClaims>,
) -> Result<(Option<Value>, Option<String>), AuthError> {
    if claims.expires_at.is_none() {
        return Err(AuthError::MissingExpiry);
    }
    Ok((claims.custom.user_id, claims.subject))
}

/// Read the payload without checking the signature. `exp` is still required.
fn decode_unverified(token: &str, now: i64) -> Result<(Option<Value>, Option<String>), AuthError> {
    let mut parts = token.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::InvalidToken("expected three segments".into()));
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    let claims: serde_json::Map<String, Value> =
        serde_json::from_slice(&bytes).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

    let exp = claims
        .get("exp")
        .ok_or(AuthError::MissingExpiry)?
        .as_f64()
        .ok_or_else(|| AuthError::InvalidToken("exp is not numeric".into()))?;
    if exp <= now as f64 {
        return Err(AuthError::Expired);
    }

    let subject = claims.get("sub").and_then(claim_text);
    Ok((claims.get("user_id").cloned(), subject))
}

/// Non-empty string or non-zero number claims, as text.
fn claim_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

// ============================================================================
// Extractor
// ============================================================================

/// The caller's user id, taken from a verified bearer token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        match state.auth.authenticate(header).await {
            Ok(user_id) => {
                tracing::Span::current().record("user_id", user_id.as_str());
                Ok(AuthenticatedUser(user_id))
            }
            Err(e) => {
                debug!(error = %e, "rejecting request");
                Err(ApiError::Unauthorized)
            }
        }
    }
}
