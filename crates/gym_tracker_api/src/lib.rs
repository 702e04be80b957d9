//! HTTP gateway between the gym tracker frontend, the LLM provider and the
//! hosted database.
//!
//! Handlers live in [`routes`]; [`services`] owns the store-backed report
//! workflows and [`domains`] the pure transformations they build on.

pub mod auth;
pub mod domains;
pub mod error;
pub mod middleware;
pub mod prompts;
pub mod routes;
pub mod services;
pub mod settings;
pub mod state;
pub mod transforms;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use auth::{AuthenticatedUser, Authenticator, JwksCache};
pub use error::{ApiError, ApiResult};
pub use middleware::LoggingMiddleware;
pub use routes::build_router;
pub use services::ReportService;
pub use settings::{AllowedOrigins, AppSettings, FeatureFlags};
pub use state::AppState;
