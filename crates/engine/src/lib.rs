//! # Salesflow Engine
//!
//! The Salesflow Engine runs the daily sales pipeline: extract, transform,
//! generate reports, validate data quality, then notify. Each stage is a
//! remote function called over HTTPS; the engine decides what runs next.
//!
//! ## Key Features
//!
//! - **Explicit step graph**: control flow lives in a static transition table
//!   ([`graph::TRANSITIONS`]) that can be inspected and validated
//! - **Typed stage results**: responses are decoded into `StageReport` before
//!   the graph branches on them
//! - **Explicit configuration**: project, region, and function names are
//!   collected once into a [`PipelineConfig`]
//! - **Event stream**: runs report progress over a Tokio channel
//!
//! ## Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use salesflow_engine::{PipelineConfig, plan_pipeline};
//! use salesflow_types::PipelineInput;
//!
//! let config = PipelineConfig {
//!     project_id: Some("acme-sales".into()),
//!     ..PipelineConfig::default()
//! };
//! let input = PipelineInput { execution_date: Some("2024-01-15".into()) };
//! let today = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
//!
//! let plan = plan_pipeline(&config, &input, today)?;
//! assert_eq!(plan.stages.len(), 4);
//! assert_eq!(
//!     plan.stages[0].url,
//!     "https://us-central1-acme-sales.cloudfunctions.net/extract-sales-data"
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`config`**: configuration sources and endpoint resolution
//! - **`graph`**: pipeline states, guards, and the transition table
//! - **`context`**: per-run variables and stage results
//! - **`invoker`**: the outbound call seam and its HTTP implementation
//! - **`runner`**: the run driver and event stream
//! - **`plan`**: dry-run rendering

pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod invoker;
pub mod plan;
pub mod runner;

// Re-export commonly used types for convenience
pub use config::{ConfigError, ConfigOverrides, FunctionNames, PipelineConfig, default_config_path};
pub use context::{Clock, RunContext, SystemClock};
pub use error::PipelineError;
pub use graph::{GraphError, PipelineState, StepOutcome, Transition, next_state, transition_table, validate_graph};
pub use invoker::{CallTarget, HttpStageInvoker, InvokeError, StageCall, StageInvoker};
pub use plan::{PipelinePlan, plan_pipeline};
pub use runner::{PipelineRunRequest, PipelineRunner, drive_pipeline_run, run_pipeline};
