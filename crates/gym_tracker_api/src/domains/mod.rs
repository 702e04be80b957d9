//! Domain modules for business logic encapsulation.
//!
//! Everything here is pure and does no I/O. Handlers and
//! services feed these modules data they fetched elsewhere.
//!
//! # Modules
//!
//! - [`normalize`]: canonical and legacy recommendation payloads to one shape
//! - [`trimming`]: token-budget trimming of training history
//! - [`weekly_trends`]: weekly set aggregates, evidence and summary

pub mod normalize;
pub mod trimming;
pub mod weekly_trends;

pub use normalize::{NormalizedRecommendation, RecommendationPayload, normalize};
pub use trimming::trim_to_token_budget;
pub use weekly_trends::{WeeklyTrend, aggregate};
