//! Asynchronous pipeline runner that walks the step graph and streams
//! lifecycle events.
//!
//! The runner owns nothing shared between runs: each call to
//! [`PipelineRunner::run`] creates a fresh [`RunContext`], steps through the
//! transition table until a sink, and drops the context. Events go out over an
//! optional Tokio channel; a dropped receiver never interrupts the run.

use std::{sync::Arc, time::Instant};

use anyhow::Context;
use chrono::NaiveDate;
use salesflow_api::PipelineClient;
use salesflow_types::{
    FailureSummary, Notification, PipelineEvent, PipelineInput, PipelineOutcome, RunStatus, Stage, StageFailure, StageReport,
    StageRunStatus, SuccessSummary,
};
use salesflow_util::{elapsed_seconds, parse_execution_date, redact_sensitive};
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::{
    config::PipelineConfig,
    context::{Clock, RunContext, SystemClock},
    error::PipelineError,
    graph::{self, PipelineState, StepOutcome},
    invoker::{CallTarget, HttpStageInvoker, StageCall, StageInvoker},
};

/// Everything needed to start one run.
#[derive(Debug, Clone)]
pub struct PipelineRunRequest {
    pub config: PipelineConfig,
    pub input: PipelineInput,
}

/// Run the pipeline described by `request`, streaming [`PipelineEvent`]s on `event_tx`.
///
/// A closed receiver is ignored; the run always proceeds to a sink.
pub async fn drive_pipeline_run(
    request: PipelineRunRequest,
    invoker: Arc<dyn StageInvoker>,
    event_tx: UnboundedSender<PipelineEvent>,
) -> Result<PipelineOutcome, PipelineError> {
    PipelineRunner::new(request.config, invoker)
        .run_with_events(&request.input, event_tx)
        .await
}

/// [`drive_pipeline_run`] without an event stream.
pub async fn run_pipeline(
    request: PipelineRunRequest,
    invoker: Arc<dyn StageInvoker>,
) -> Result<PipelineOutcome, PipelineError> {
    PipelineRunner::new(request.config, invoker).run(&request.input).await
}

/// Drives pipeline runs against a configuration and an invoker.
#[derive(Clone)]
pub struct PipelineRunner {
    config: PipelineConfig,
    invoker: Arc<dyn StageInvoker>,
    clock: Arc<dyn Clock>,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig, invoker: Arc<dyn StageInvoker>) -> Self {
        Self {
            config,
            invoker,
            clock: Arc::new(SystemClock),
        }
    }

    /// Build a runner that calls the deployed functions over HTTPS.
    pub fn from_config(config: PipelineConfig) -> anyhow::Result<Self> {
        let client = PipelineClient::new(config.auth_token.as_deref()).context("failed to build HTTP client")?;
        Ok(Self::new(config, Arc::new(HttpStageInvoker::new(client))))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run the pipeline to one of its sinks.
    pub async fn run(&self, input: &PipelineInput) -> Result<PipelineOutcome, PipelineError> {
        self.drive(input, None).await
    }

    /// Run the pipeline while emitting [`PipelineEvent`]s on `event_tx`.
    pub async fn run_with_events(
        &self,
        input: &PipelineInput,
        event_tx: UnboundedSender<PipelineEvent>,
    ) -> Result<PipelineOutcome, PipelineError> {
        self.drive(input, Some(&event_tx)).await
    }

    async fn drive(
        &self,
        input: &PipelineInput,
        event_tx: Option<&UnboundedSender<PipelineEvent>>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let emit = |event: PipelineEvent| {
            if let Some(sender) = event_tx {
                let _ = sender.send(event);
            }
        };

        // Resolve every URL up front so a bad configuration never leaves a run half done.
        let stage_urls = Stage::ALL
            .into_iter()
            .map(|stage| self.config.stage_url(stage))
            .collect::<Result<Vec<_>, _>>()?;
        let notification_url = self.config.notification_url()?;

        let mut state = graph::START;
        let mut context: Option<RunContext> = None;
        let mut duration_seconds = 0.0;

        loop {
            debug!(step = %state, "entering step");
            let outcome = match state {
                PipelineState::Init => {
                    let started_at = self.clock.now();
                    let execution_date = resolve_execution_date(input, started_at.date_naive())?;
                    info!(%execution_date, "starting sales pipeline");
                    emit(PipelineEvent::RunStarted {
                        execution_date,
                        at: started_at,
                    });
                    context = Some(RunContext::new(execution_date, started_at));
                    StepOutcome::Completed
                }
                PipelineState::Extract
                | PipelineState::Transform
                | PipelineState::GenerateReports
                | PipelineState::ValidateDataQuality => {
                    let Some(stage) = state.stage() else {
                        return Err(PipelineError::MissingTransition(state));
                    };
                    let run_context = context.as_mut().ok_or(PipelineError::NotInitialized(state))?;
                    let url = &stage_urls[stage_index(stage)];
                    let report = self.call_stage(stage, url, run_context, &emit).await;
                    let outcome = if report.is_failure() {
                        StepOutcome::StageError
                    } else {
                        StepOutcome::Completed
                    };
                    run_context.record(stage, report);
                    outcome
                }
                PipelineState::LogSuccess => {
                    let run_context = context.as_mut().ok_or(PipelineError::NotInitialized(state))?;
                    let end_time = self.clock.now();
                    duration_seconds = elapsed_seconds(run_context.started_at, end_time);
                    run_context.assign("end_time", json!(end_time.to_rfc3339()));
                    run_context.assign("duration", json!(duration_seconds));
                    info!(
                        execution_date = %run_context.execution_date,
                        records_processed = run_context.records_processed(),
                        total_revenue = run_context.total_revenue(),
                        duration_seconds,
                        "sales pipeline completed successfully"
                    );
                    StepOutcome::Completed
                }
                PipelineState::NotifySuccess => {
                    let run_context = context.as_ref().ok_or(PipelineError::NotInitialized(state))?;
                    let notification = Notification::Success {
                        execution_date: run_context.execution_date,
                        records_processed: run_context.records_processed(),
                        total_revenue: run_context.total_revenue(),
                        duration_seconds,
                    };
                    self.notify(&notification_url, notification, &emit).await;
                    StepOutcome::Completed
                }
                PipelineState::NotifyFailure => {
                    let run_context = context.as_ref().ok_or(PipelineError::NotInitialized(state))?;
                    let (error_step, error) = match run_context.failure() {
                        Some((stage, failure)) => (stage.step_name().to_string(), Some(failure.error.clone())),
                        None => ("unknown".to_string(), None),
                    };
                    let notification = Notification::Failure {
                        execution_date: run_context.execution_date,
                        error_step,
                        execution_id: self.config.execution_id.clone(),
                        error,
                    };
                    self.notify(&notification_url, notification, &emit).await;
                    StepOutcome::Completed
                }
                PipelineState::ReturnSuccess | PipelineState::ReturnFailure => {
                    let run_context = context.take().ok_or(PipelineError::NotInitialized(state))?;
                    let outcome = finish(state, &run_context, duration_seconds);
                    emit(PipelineEvent::RunCompleted {
                        status: outcome.status(),
                        finished_at: self.clock.now(),
                    });
                    return Ok(outcome);
                }
            };

            state = graph::next_state(state, outcome).ok_or(PipelineError::MissingTransition(state))?;
        }
    }

    async fn call_stage(
        &self,
        stage: Stage,
        url: &str,
        context: &RunContext,
        emit: &impl Fn(PipelineEvent),
    ) -> StageReport {
        let call = StageCall {
            target: CallTarget::Stage(stage),
            url: url.to_string(),
            body: context.request_body(stage),
            timeout: stage.timeout(),
        };
        emit(PipelineEvent::StageStarted {
            stage,
            url: call.url.clone(),
            started_at: self.clock.now(),
        });

        let started = Instant::now();
        let report = match self.invoker.invoke(&call).await {
            Ok(body) => StageReport::decode(body),
            Err(invoke_error) => StageReport::Failed(StageFailure::new(invoke_error.to_string())),
        };
        let duration_ms = started.elapsed().as_millis().try_into().unwrap_or(u64::MAX);

        match &report {
            StageReport::Succeeded(payload) => {
                match stage {
                    Stage::Extract => info!(%stage, records_processed = ?payload.records_processed, "extraction completed"),
                    Stage::Transform => info!(
                        %stage,
                        transformed_records = ?payload.transformed_records,
                        total_revenue = ?payload.total_revenue,
                        "transformation completed"
                    ),
                    Stage::GenerateReports => info!(%stage, message = ?payload.message, "reports generated"),
                    Stage::ValidateDataQuality => info!(%stage, message = ?payload.message, "data quality validated"),
                }
                emit(PipelineEvent::StageFinished {
                    stage,
                    status: StageRunStatus::Succeeded,
                    duration_ms,
                    detail: None,
                });
            }
            StageReport::Failed(failure) => {
                let error_text = redact_sensitive(&failure.error);
                error!(%stage, error = %error_text, "stage failed");
                emit(PipelineEvent::StageFinished {
                    stage,
                    status: StageRunStatus::Failed,
                    duration_ms,
                    detail: Some(error_text),
                });
            }
        }
        report
    }

    /// Post the run's single notification. Delivery problems are logged, not propagated.
    async fn notify(&self, url: &str, notification: Notification, emit: &impl Fn(PipelineEvent)) {
        let status = notification.status();
        let body = match serde_json::to_value(&notification) {
            Ok(body) => body,
            Err(serialize_error) => {
                warn!(error = %serialize_error, "could not serialize notification");
                emit(PipelineEvent::NotificationSent { status, delivered: false });
                return;
            }
        };
        let call = StageCall {
            target: CallTarget::Notification,
            url: url.to_string(),
            body,
            timeout: NOTIFICATION_TIMEOUT,
        };

        let delivered = match self.invoker.invoke(&call).await {
            Ok(_) => {
                debug!(%status, "notification delivered");
                true
            }
            Err(invoke_error) => {
                warn!(%status, error = %redact_sensitive(&invoke_error.to_string()), "notification delivery failed");
                false
            }
        };
        emit(PipelineEvent::NotificationSent { status, delivered });
    }
}

/// Notifications are not a stage; they use the shortest stage timeout.
const NOTIFICATION_TIMEOUT: std::time::Duration = Stage::ValidateDataQuality.timeout();

fn stage_index(stage: Stage) -> usize {
    Stage::ALL.iter().position(|candidate| *candidate == stage).unwrap_or_default()
}

/// The caller-supplied date, or `today` when none was given.
pub(crate) fn resolve_execution_date(input: &PipelineInput, today: NaiveDate) -> Result<NaiveDate, PipelineError> {
    match input.execution_date.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => Ok(parse_execution_date(value)?),
        None => Ok(today),
    }
}

fn finish(sink: PipelineState, context: &RunContext, duration_seconds: f64) -> PipelineOutcome {
    match sink.sink() {
        Some(RunStatus::Success) => PipelineOutcome::Success(SuccessSummary {
            execution_date: context.execution_date,
            records_processed: context.records_processed(),
            total_revenue: context.total_revenue(),
            duration_seconds,
            message: PipelineOutcome::SUCCESS_MESSAGE.to_string(),
        }),
        _ => PipelineOutcome::Failure(FailureSummary {
            execution_date: context.execution_date,
            message: PipelineOutcome::FAILURE_MESSAGE.to_string(),
            failed_stage: context.failure().map(|(stage, _)| stage),
        }),
    }
}
