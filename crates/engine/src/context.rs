//! Per-run execution context.
//!
//! A [`RunContext`] is created by the `init` step and dropped when the run
//! reaches a sink. It holds the scalar variables assigned along the way and
//! the decoded result of every stage that has run, keyed by the stage's
//! result variable (`extract_result`, `transform_result`, ...).

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use salesflow_types::{Stage, StageFailure, StageReport};
use serde_json::{Value, json};

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct RunContext {
    pub execution_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    /// Variables in assignment order, including each stage's decoded result.
    pub variables: IndexMap<String, Value>,
    reports: IndexMap<Stage, StageReport>,
    failure: Option<(Stage, StageFailure)>,
}

impl RunContext {
    pub fn new(execution_date: NaiveDate, started_at: DateTime<Utc>) -> Self {
        let mut variables = IndexMap::new();
        variables.insert("execution_date".to_string(), json!(execution_date.to_string()));
        variables.insert("start_time".to_string(), json!(started_at.to_rfc3339()));
        Self {
            execution_date,
            started_at,
            variables,
            reports: IndexMap::new(),
            failure: None,
        }
    }

    pub fn assign(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Record a stage result. A failed report also marks the run as failed.
    pub fn record(&mut self, stage: Stage, report: StageReport) {
        self.assign(stage.result_variable(), report.to_value());
        if let StageReport::Failed(failure) = &report
            && self.failure.is_none()
        {
            self.failure = Some((stage, failure.clone()));
        }
        self.reports.insert(stage, report);
    }

    pub fn failure(&self) -> Option<(Stage, &StageFailure)> {
        self.failure.as_ref().map(|(stage, failure)| (*stage, failure))
    }

    /// `records_processed` as reported by the extract stage, 0 when absent.
    pub fn records_processed(&self) -> u64 {
        self.payload_field(Stage::Extract, |payload| payload.records_processed)
            .unwrap_or_default()
    }

    /// `total_revenue` as reported by the transform stage, 0 when absent.
    pub fn total_revenue(&self) -> f64 {
        self.payload_field(Stage::Transform, |payload| payload.total_revenue)
            .unwrap_or_default()
    }

    /// JSON body sent to a stage.
    pub fn request_body(&self, stage: Stage) -> Value {
        match stage {
            Stage::GenerateReports => json!({
                "execution_date": self.execution_date.to_string(),
                "total_revenue": self.total_revenue(),
            }),
            _ => json!({ "execution_date": self.execution_date.to_string() }),
        }
    }

    fn payload_field<T>(&self, stage: Stage, read: impl Fn(&salesflow_types::StagePayload) -> Option<T>) -> Option<T> {
        self.reports.get(&stage).and_then(StageReport::payload).and_then(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context() -> RunContext {
        RunContext::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap(),
        )
    }

    #[test]
    fn init_assigns_date_and_start_time() {
        let context = context();
        assert_eq!(context.variable("execution_date"), Some(&json!("2024-01-15")));
        assert_eq!(context.variable("start_time"), Some(&json!("2024-01-15T06:00:00+00:00")));
    }

    #[test]
    fn report_body_carries_transform_revenue() {
        let mut context = context();
        context.record(
            Stage::Transform,
            StageReport::decode(json!({"status": "success", "total_revenue": 812.4})),
        );
        assert_eq!(
            context.request_body(Stage::GenerateReports),
            json!({"execution_date": "2024-01-15", "total_revenue": 812.4})
        );
        assert_eq!(context.request_body(Stage::Extract), json!({"execution_date": "2024-01-15"}));
    }

    #[test]
    fn first_failure_is_kept() {
        let mut context = context();
        context.record(Stage::Extract, StageReport::Failed(StageFailure::new("timeout")));
        context.record(Stage::Transform, StageReport::Failed(StageFailure::new("later")));
        let (stage, failure) = context.failure().unwrap();
        assert_eq!(stage, Stage::Extract);
        assert_eq!(failure.error, "timeout");
        assert_eq!(context.variable("extract_result"), Some(&json!({"status": "error", "error": "timeout"})));
    }

    #[test]
    fn totals_default_to_zero() {
        let context = context();
        assert_eq!(context.records_processed(), 0);
        assert_eq!(context.total_revenue(), 0.0);
    }
}
