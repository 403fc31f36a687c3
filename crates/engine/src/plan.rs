//! Dry-run rendering of a pipeline run.
//!
//! A plan shows every call a run would make, in order, without touching the
//! network. Values that only exist once an earlier stage has answered are
//! rendered as `${{ steps.<step>.<field> }}` placeholders.

use chrono::NaiveDate;
use salesflow_types::{PipelineInput, Stage};
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    config::PipelineConfig,
    error::PipelineError,
    graph::{self, Transition},
    invoker::{CallTarget, StageCall},
    runner::resolve_execution_date,
};

/// Placeholder for the revenue the transform stage will report.
pub const TOTAL_REVENUE_PLACEHOLDER: &str = "${{ steps.transform.total_revenue }}";

#[derive(Debug, Clone, Serialize)]
pub struct PipelinePlan {
    pub execution_date: NaiveDate,
    /// Stage calls in execution order.
    pub stages: Vec<StageCall>,
    pub notification_url: String,
    pub transitions: &'static [Transition],
}

/// Render the calls a run with `input` would make. `today` fills in a missing date.
pub fn plan_pipeline(config: &PipelineConfig, input: &PipelineInput, today: NaiveDate) -> Result<PipelinePlan, PipelineError> {
    let execution_date = resolve_execution_date(input, today)?;

    let stages = Stage::ALL
        .into_iter()
        .map(|stage| -> Result<StageCall, PipelineError> {
            Ok(StageCall {
                target: CallTarget::Stage(stage),
                url: config.stage_url(stage)?,
                body: planned_body(stage, execution_date),
                timeout: stage.timeout(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PipelinePlan {
        execution_date,
        stages,
        notification_url: config.notification_url()?,
        transitions: graph::transition_table(),
    })
}

fn planned_body(stage: Stage, execution_date: NaiveDate) -> Value {
    match stage {
        Stage::GenerateReports => json!({
            "execution_date": execution_date.to_string(),
            "total_revenue": TOTAL_REVENUE_PLACEHOLDER,
        }),
        _ => json!({ "execution_date": execution_date.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig {
            project_id: Some("acme-sales".into()),
            region: "europe-west1".into(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn plan_lists_stages_in_order_with_timeouts() {
        let input = PipelineInput {
            execution_date: Some("2024-01-15T06:00:00Z".into()),
        };
        let plan = plan_pipeline(&config(), &input, NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()).unwrap();

        assert_eq!(plan.execution_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        let urls: Vec<&str> = plan.stages.iter().map(|call| call.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://europe-west1-acme-sales.cloudfunctions.net/extract-sales-data",
                "https://europe-west1-acme-sales.cloudfunctions.net/transform-sales-data",
                "https://europe-west1-acme-sales.cloudfunctions.net/generate-reports",
                "https://europe-west1-acme-sales.cloudfunctions.net/validate-data-quality",
            ]
        );
        let timeouts: Vec<u64> = plan.stages.iter().map(|call| call.timeout.as_secs()).collect();
        assert_eq!(timeouts, vec![300, 600, 300, 180]);
        assert_eq!(
            plan.notification_url,
            "https://europe-west1-acme-sales.cloudfunctions.net/send-notification"
        );
    }

    #[test]
    fn report_body_uses_revenue_placeholder() {
        let plan = plan_pipeline(
            &config(),
            &PipelineInput::default(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
        )
        .unwrap();

        let value = serde_json::to_value(&plan).unwrap();
        assert_eq!(value["execution_date"], "2024-02-29");
        assert_eq!(
            value["stages"][2]["body"],
            json!({"execution_date": "2024-02-29", "total_revenue": "${{ steps.transform.total_revenue }}"})
        );
        assert_eq!(value["stages"][2]["timeout_secs"], 300);
    }

    #[test]
    fn plan_rejects_unparseable_dates() {
        let input = PipelineInput {
            execution_date: Some("yesterday".into()),
        };
        let error = plan_pipeline(&config(), &input, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).unwrap_err();
        assert!(matches!(error, PipelineError::InvalidExecutionDate(_)));
    }
}
