//! Weekly training aggregates and week-over-week evidence.
//!
//! Set rows come straight from the store and may be dirty. Rows without a
//! parseable `YYYY-MM-DD` training date are skipped, and missing or
//! non-numeric `reps`/`weight` count as zero.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde_json::Value;

use crate::types::{
    EvidenceItem, EvidenceSource, Grouping, MetricDelta, SampleSizeDetail, WeeklyAggregate,
};

/// Number of most recent weeks kept in a trend.
pub const MAX_WEEKS: usize = 8;
pub const NO_TRENDS_SUMMARY: &str = "No weekly trends available yet.";
const ALL_SET_TYPES: &str = "all";

#[derive(Clone, Debug, PartialEq)]
pub struct WeeklyTrend {
    pub weeks: Vec<WeeklyAggregate>,
    pub evidence: Vec<EvidenceItem>,
    pub summary: String,
}

/// Monday of the week containing `training_date`, or `None` for anything
/// that is not a plain ISO calendar date.
pub fn week_start(training_date: &str) -> Option<NaiveDate> {
    let date = NaiveDate::parse_from_str(training_date, "%Y-%m-%d").ok()?;
    Some(date - Duration::days(i64::from(date.weekday().num_days_from_monday())))
}

pub fn aggregate(rows: &[Value]) -> WeeklyTrend {
    let weeks = weekly_totals(rows);
    let evidence = build_evidence(&weeks);
    let summary = summarize(&weeks);
    WeeklyTrend {
        weeks,
        evidence,
        summary,
    }
}

fn weekly_totals(rows: &[Value]) -> Vec<WeeklyAggregate> {
    let mut by_week: BTreeMap<NaiveDate, WeeklyAggregate> = BTreeMap::new();

    for row in rows {
        let Some(start) = row
            .get("training_date")
            .and_then(Value::as_str)
            .and_then(week_start)
        else {
            continue;
        };
        let reps = numeric_field(row, "reps");
        let weight = numeric_field(row, "weight");

        let entry = by_week.entry(start).or_insert_with(|| WeeklyAggregate {
            week_start: start,
            total_sets: 0,
            total_reps: 0,
            total_volume: 0.0,
        });
        entry.total_sets += 1;
        entry.total_reps += reps.trunc() as i64;
        entry.total_volume += weight * reps;
    }

    let weeks: Vec<WeeklyAggregate> = by_week.into_values().collect();
    let skip = weeks.len().saturating_sub(MAX_WEEKS);
    weeks.into_iter().skip(skip).collect()
}

/// Numbers and numeric strings; everything else is zero.
fn numeric_field(row: &Value, key: &str) -> f64 {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// One decimal, rounding the exact binary value with ties to even.
/// Float formatting already rounds that way, so `101.25` becomes `101.2`.
fn round1(value: f64) -> f64 {
    format!("{value:.1}").parse().unwrap_or(value)
}

fn source(latest_week_sets: u64, prior_week_sets: Option<u64>) -> EvidenceSource {
    EvidenceSource {
        grouping: Grouping::TrainingWeek.as_str().to_string(),
        included_set_types: vec![ALL_SET_TYPES.to_string()],
        sample_size: latest_week_sets,
        sample_size_detail: SampleSizeDetail {
            latest_week_sets,
            prior_week_sets,
        },
    }
}

fn build_evidence(weeks: &[WeeklyAggregate]) -> Vec<EvidenceItem> {
    match weeks {
        [] => Vec::new(),
        [latest] => vec![EvidenceItem {
            claim: "Only one week is currently available for trend comparison.".to_string(),
            metric: "weekly_sample_size".to_string(),
            period: latest.week_start.to_string(),
            delta: MetricDelta::Count(0),
            source: source(latest.total_sets, None),
        }],
        [.., previous, latest] => {
            let period = format!("{} vs {}", latest.week_start, previous.week_start);
            let deltas = [
                (
                    "sets",
                    "total_sets",
                    MetricDelta::Count(latest.total_sets as i64 - previous.total_sets as i64),
                ),
                (
                    "reps",
                    "total_reps",
                    MetricDelta::Count(latest.total_reps - previous.total_reps),
                ),
                (
                    "volume",
                    "total_volume",
                    MetricDelta::Amount(round1(latest.total_volume - previous.total_volume)),
                ),
            ];
            deltas
                .into_iter()
                .map(|(label, metric, delta)| EvidenceItem {
                    claim: format!("Latest week total {label} changed versus prior week."),
                    metric: metric.to_string(),
                    period: period.clone(),
                    delta,
                    source: source(latest.total_sets, Some(previous.total_sets)),
                })
                .collect()
        }
    }
}

fn summarize(weeks: &[WeeklyAggregate]) -> String {
    match weeks.last() {
        Some(latest) => format!(
            "Week of {}: {} sets, {} reps, {:.1} volume.",
            latest.week_start,
            latest.total_sets,
            latest.total_reps,
            round1(latest.total_volume)
        ),
        None => NO_TRENDS_SUMMARY.to_string(),
    }
}
