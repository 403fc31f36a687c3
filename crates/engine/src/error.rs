use salesflow_util::DateParseError;
use thiserror::Error;

use crate::{config::ConfigError, graph::PipelineState};

/// Problems that keep a run from starting or leave it without a next step.
///
/// Stage failures are not errors at this level: they travel the failure
/// branch of the graph and end in a `PipelineOutcome::Failure`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidExecutionDate(#[from] DateParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("step '{0}' has no transition for its outcome")]
    MissingTransition(PipelineState),

    #[error("step '{0}' ran before init")]
    NotInitialized(PipelineState),
}
