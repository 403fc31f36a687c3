//! Strongly typed pipeline model shared across the engine, HTTP layer, and CLI.
//!
//! The sales pipeline is a fixed sequence of four stages. Each stage is served by
//! an external HTTP function; this module names those stages, pins their
//! timeouts, and describes the JSON documents exchanged with them and returned
//! to callers once a run reaches one of its two sinks.

use std::{fmt, str::FromStr, time::Duration};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

mod report;

pub use report::{StageFailure, StagePayload, StageReport};

/// One of the four processing stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Transform,
    GenerateReports,
    ValidateDataQuality,
}

impl Stage {
    /// All stages in the order the pipeline visits them.
    pub const ALL: [Stage; 4] = [Stage::Extract, Stage::Transform, Stage::GenerateReports, Stage::ValidateDataQuality];

    /// Step name used in logs, events, and failure notifications.
    pub const fn step_name(self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Transform => "transform",
            Stage::GenerateReports => "generate_reports",
            Stage::ValidateDataQuality => "validate_data_quality",
        }
    }

    /// Name of the deployed function that serves this stage.
    pub const fn default_function_name(self) -> &'static str {
        match self {
            Stage::Extract => "extract-sales-data",
            Stage::Transform => "transform-sales-data",
            Stage::GenerateReports => "generate-reports",
            Stage::ValidateDataQuality => "validate-data-quality",
        }
    }

    /// Fixed per-call timeout. Not configurable per invocation.
    pub const fn timeout(self) -> Duration {
        match self {
            Stage::Extract => Duration::from_secs(300),
            Stage::Transform => Duration::from_secs(600),
            Stage::GenerateReports => Duration::from_secs(300),
            Stage::ValidateDataQuality => Duration::from_secs(180),
        }
    }

    /// Context variable that holds the decoded response of this stage.
    pub const fn result_variable(self) -> &'static str {
        match self {
            Stage::Extract => "extract_result",
            Stage::Transform => "transform_result",
            Stage::GenerateReports => "report_result",
            Stage::ValidateDataQuality => "validation_result",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.step_name())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.step_name() == value || stage.default_function_name() == value)
            .ok_or_else(|| format!("unknown pipeline stage '{value}'"))
    }
}

/// Caller-supplied input for a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineInput {
    /// Date to process, either `YYYY-MM-DD` or an RFC 3339 timestamp. Defaults to today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_date: Option<String>,
}

/// Overall outcome of a run, also used as the notification `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => f.write_str("success"),
            RunStatus::Failure => f.write_str("failure"),
        }
    }
}

/// Structured result returned by the success sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessSummary {
    pub execution_date: NaiveDate,
    pub records_processed: u64,
    pub total_revenue: f64,
    pub duration_seconds: f64,
    pub message: String,
}

/// Structured result returned by the failure sink.
///
/// The serialized form carries only the date and a generic
/// message; the failing stage is kept in memory for callers and logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub execution_date: NaiveDate,
    pub message: String,
    #[serde(skip)]
    pub failed_stage: Option<Stage>,
}

/// One of the two terminal outcomes of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Success(SuccessSummary),
    Failure(FailureSummary),
}

impl PipelineOutcome {
    pub const SUCCESS_MESSAGE: &'static str = "Sales pipeline completed successfully";
    pub const FAILURE_MESSAGE: &'static str = "Sales pipeline failed - check logs for details";

    pub fn status(&self) -> RunStatus {
        match self {
            PipelineOutcome::Success(_) => RunStatus::Success,
            PipelineOutcome::Failure(_) => RunStatus::Failure,
        }
    }

    pub fn execution_date(&self) -> NaiveDate {
        match self {
            PipelineOutcome::Success(summary) => summary.execution_date,
            PipelineOutcome::Failure(summary) => summary.execution_date,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success(_))
    }
}

/// Body posted to the notification endpoint, exactly once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Notification {
    Success {
        execution_date: NaiveDate,
        records_processed: u64,
        total_revenue: f64,
        duration_seconds: f64,
    },
    Failure {
        execution_date: NaiveDate,
        /// Step name of the stage that routed the run to the failure sink.
        error_step: String,
        /// Identifier of the hosting execution, when one was configured.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        execution_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Notification {
    pub fn status(&self) -> RunStatus {
        match self {
            Notification::Success { .. } => RunStatus::Success,
            Notification::Failure { .. } => RunStatus::Failure,
        }
    }
}
