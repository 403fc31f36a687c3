//! Lifecycle events streamed while a pipeline run progresses.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{RunStatus, Stage};

/// Status reported when a stage call finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRunStatus {
    Succeeded,
    Failed,
}

/// Event emitted by the run driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        execution_date: NaiveDate,
        at: DateTime<Utc>,
    },
    StageStarted {
        stage: Stage,
        url: String,
        started_at: DateTime<Utc>,
    },
    StageFinished {
        stage: Stage,
        status: StageRunStatus,
        duration_ms: u64,
        /// Error text for failed stages.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    NotificationSent {
        status: RunStatus,
        delivered: bool,
    },
    RunCompleted {
        status: RunStatus,
        finished_at: DateTime<Utc>,
    },
}
