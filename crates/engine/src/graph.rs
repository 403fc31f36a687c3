//! The pipeline step graph as an explicit finite-state machine.
//!
//! Every step is a [`PipelineState`]. Control moves along the static
//! [`TRANSITIONS`] table: for the current state, the first row whose
//! [`Guard`] admits the step's [`StepOutcome`] names the next state. Stage
//! states carry one conditional row (`StatusIsError`) and one fallback row
//! (`Otherwise`); every other non-sink state has a single unconditional row.
//!
//! ```text
//! init -> extract -> transform -> generate_reports -> validate_data_quality
//!            |          |               |                    |
//!            +----------+-------+-------+--------------------+      (status == "error")
//!                               v                            v
//!                        notify_failure              log_success -> notify_success
//!                               v                                          v
//!                        return_failure                             return_success
//! ```

use std::{collections::HashSet, fmt};

use salesflow_types::{RunStatus, Stage};
use serde::Serialize;
use thiserror::Error;

/// Named step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    Extract,
    Transform,
    GenerateReports,
    ValidateDataQuality,
    LogSuccess,
    NotifySuccess,
    ReturnSuccess,
    NotifyFailure,
    ReturnFailure,
}

impl PipelineState {
    pub const ALL: [PipelineState; 10] = [
        PipelineState::Init,
        PipelineState::Extract,
        PipelineState::Transform,
        PipelineState::GenerateReports,
        PipelineState::ValidateDataQuality,
        PipelineState::LogSuccess,
        PipelineState::NotifySuccess,
        PipelineState::ReturnSuccess,
        PipelineState::NotifyFailure,
        PipelineState::ReturnFailure,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            PipelineState::Init => "init",
            PipelineState::Extract => "extract",
            PipelineState::Transform => "transform",
            PipelineState::GenerateReports => "generate_reports",
            PipelineState::ValidateDataQuality => "validate_data_quality",
            PipelineState::LogSuccess => "log_success",
            PipelineState::NotifySuccess => "notify_success",
            PipelineState::ReturnSuccess => "return_success",
            PipelineState::NotifyFailure => "notify_failure",
            PipelineState::ReturnFailure => "return_failure",
        }
    }

    /// Stage called by this state, if it is a stage state.
    pub const fn stage(self) -> Option<Stage> {
        match self {
            PipelineState::Extract => Some(Stage::Extract),
            PipelineState::Transform => Some(Stage::Transform),
            PipelineState::GenerateReports => Some(Stage::GenerateReports),
            PipelineState::ValidateDataQuality => Some(Stage::ValidateDataQuality),
            _ => None,
        }
    }

    /// Terminal outcome for sink states.
    pub const fn sink(self) -> Option<RunStatus> {
        match self {
            PipelineState::ReturnSuccess => Some(RunStatus::Success),
            PipelineState::ReturnFailure => Some(RunStatus::Failure),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a step reports back to the machine once it has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    /// The stage response decoded to an error payload.
    StageError,
}

/// Condition attached to a transition row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Guard {
    /// Sole edge out of a non-branching state.
    Always,
    /// The branch condition of a stage state.
    StatusIsError,
    /// Fallback edge taken when the branch condition does not hold.
    Otherwise,
}

impl Guard {
    pub fn admits(self, outcome: StepOutcome) -> bool {
        match self {
            Guard::Always | Guard::Otherwise => true,
            Guard::StatusIsError => outcome == StepOutcome::StageError,
        }
    }
}

/// One `(state, guard) -> next` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: PipelineState,
    pub guard: Guard,
    pub to: PipelineState,
}

const fn row(from: PipelineState, guard: Guard, to: PipelineState) -> Transition {
    Transition { from, guard, to }
}

/// Rows are evaluated in order; conditional rows precede their fallback.
pub const TRANSITIONS: &[Transition] = &[
    row(PipelineState::Init, Guard::Always, PipelineState::Extract),
    row(PipelineState::Extract, Guard::StatusIsError, PipelineState::NotifyFailure),
    row(PipelineState::Extract, Guard::Otherwise, PipelineState::Transform),
    row(PipelineState::Transform, Guard::StatusIsError, PipelineState::NotifyFailure),
    row(PipelineState::Transform, Guard::Otherwise, PipelineState::GenerateReports),
    row(PipelineState::GenerateReports, Guard::StatusIsError, PipelineState::NotifyFailure),
    row(PipelineState::GenerateReports, Guard::Otherwise, PipelineState::ValidateDataQuality),
    row(PipelineState::ValidateDataQuality, Guard::StatusIsError, PipelineState::NotifyFailure),
    row(PipelineState::ValidateDataQuality, Guard::Otherwise, PipelineState::LogSuccess),
    row(PipelineState::LogSuccess, Guard::Always, PipelineState::NotifySuccess),
    row(PipelineState::NotifySuccess, Guard::Always, PipelineState::ReturnSuccess),
    row(PipelineState::NotifyFailure, Guard::Always, PipelineState::ReturnFailure),
];

pub const START: PipelineState = PipelineState::Init;

pub fn transition_table() -> &'static [Transition] {
    TRANSITIONS
}

/// Next state for `state` given the outcome of its step, or `None` for sinks.
pub fn next_state(state: PipelineState, outcome: StepOutcome) -> Option<PipelineState> {
    TRANSITIONS
        .iter()
        .filter(|transition| transition.from == state)
        .find(|transition| transition.guard.admits(outcome))
        .map(|transition| transition.to)
}

/// Structural defect found by [`validate_graph`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("state '{0}' has no outgoing transition and is not a sink")]
    DeadEnd(PipelineState),
    #[error("sink '{0}' has outgoing transitions")]
    SinkWithEdges(PipelineState),
    #[error("state '{state}' must have exactly one condition and one fallback, found {conditions} and {fallbacks}")]
    MalformedBranch {
        state: PipelineState,
        conditions: usize,
        fallbacks: usize,
    },
    #[error("state '{0}' must have exactly one unconditional edge")]
    AmbiguousEdge(PipelineState),
    #[error("state '{0}' is unreachable from init")]
    Unreachable(PipelineState),
    #[error("cycle detected through '{0}'")]
    Cycle(PipelineState),
    #[error("expected exactly one success sink and one failure sink")]
    Sinks,
}

/// Check the structural invariants of a transition table.
///
/// - stage states have exactly one `StatusIsError` row followed by one `Otherwise` row
/// - other non-sink states have exactly one `Always` row
/// - sinks have no outgoing rows; there is one success and one failure sink
/// - every state is reachable from `init` and no path revisits a state
pub fn validate_graph(transitions: &[Transition]) -> Result<(), GraphError> {
    let sinks: Vec<RunStatus> = PipelineState::ALL.iter().filter_map(|state| state.sink()).collect();
    if sinks.len() != 2 || !sinks.contains(&RunStatus::Success) || !sinks.contains(&RunStatus::Failure) {
        return Err(GraphError::Sinks);
    }

    for state in PipelineState::ALL {
        let rows: Vec<&Transition> = transitions.iter().filter(|transition| transition.from == state).collect();
        if state.sink().is_some() {
            if !rows.is_empty() {
                return Err(GraphError::SinkWithEdges(state));
            }
            continue;
        }
        if rows.is_empty() {
            return Err(GraphError::DeadEnd(state));
        }

        let count = |guard: Guard| rows.iter().filter(|transition| transition.guard == guard).count();
        if state.stage().is_some() {
            let (conditions, fallbacks) = (count(Guard::StatusIsError), count(Guard::Otherwise));
            let ordered = rows.len() == 2 && rows[0].guard == Guard::StatusIsError && rows[1].guard == Guard::Otherwise;
            if !ordered {
                return Err(GraphError::MalformedBranch {
                    state,
                    conditions,
                    fallbacks,
                });
            }
        } else if rows.len() != 1 || count(Guard::Always) != 1 {
            return Err(GraphError::AmbiguousEdge(state));
        }
    }

    let mut visited = HashSet::new();
    let mut path = Vec::new();
    visit(START, transitions, &mut visited, &mut path)?;
    if let Some(unreachable) = PipelineState::ALL.into_iter().find(|state| !visited.contains(state)) {
        return Err(GraphError::Unreachable(unreachable));
    }
    Ok(())
}

fn visit(
    state: PipelineState,
    transitions: &[Transition],
    visited: &mut HashSet<PipelineState>,
    path: &mut Vec<PipelineState>,
) -> Result<(), GraphError> {
    if path.contains(&state) {
        return Err(GraphError::Cycle(state));
    }
    if !visited.insert(state) {
        return Ok(());
    }
    path.push(state);
    for transition in transitions.iter().filter(|transition| transition.from == state) {
        visit(transition.to, transitions, visited, path)?;
    }
    path.pop();
    Ok(())
}
