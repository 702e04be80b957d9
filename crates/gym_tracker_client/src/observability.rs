//! Metrics recorded around every upstream call.

use std::time::Duration;

pub const UPSTREAM_REQUESTS_TOTAL: &str = "gym_tracker_upstream_requests_total";
pub const UPSTREAM_REQUEST_DURATION: &str = "gym_tracker_upstream_request_duration_seconds";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upstream {
    Llm,
    Store,
}

impl Upstream {
    pub fn as_str(self) -> &'static str {
        match self {
            Upstream::Llm => "llm",
            Upstream::Store => "store",
        }
    }
}

/// Record one finished upstream call. No-op until a recorder is installed.
pub fn record_upstream_call(target: Upstream, success: bool, elapsed: Duration) {
    let outcome = if success { "ok" } else { "error" };
    metrics::counter!(UPSTREAM_REQUESTS_TOTAL, "target" => target.as_str(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!(UPSTREAM_REQUEST_DURATION, "target" => target.as_str())
        .record(elapsed.as_secs_f64());
}
