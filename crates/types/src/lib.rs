//! Shared type definitions for the sales pipeline runner.
//!
//! The engine, the HTTP layer, and the CLI all speak in terms of the types
//! defined here: the fixed set of pipeline [`Stage`]s, the typed
//! [`StageReport`] decoded from every stage response, the two terminal
//! [`PipelineOutcome`]s, and the [`PipelineEvent`] stream emitted while a run
//! progresses.

pub mod events;
pub mod pipeline;

pub use events::{PipelineEvent, StageRunStatus};
pub use pipeline::{
    FailureSummary, Notification, PipelineInput, PipelineOutcome, RunStatus, Stage, StageFailure, StagePayload, StageReport,
    SuccessSummary,
};
