use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use salesflow_engine::{ConfigOverrides, PipelineConfig, PipelineRunner, plan_pipeline, transition_table, validate_graph};
use salesflow_types::{PipelineEvent, PipelineInput};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("run", sub)) => {
            if !run_cmd(sub).await? {
                std::process::exit(1);
            }
        }
        Some(("plan", sub)) => plan_cmd(sub)?,
        Some(("graph", _)) => graph_cmd()?,
        Some(("config", sub)) => config_cmd(sub)?,
        _ => anyhow::bail!("expected one of: run, plan, graph, config"),
    }
    Ok(())
}

/// Logs go to stderr; stdout only carries JSON results.
fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_cli() -> Command {
    let execution_date = Arg::new("execution-date")
        .long("execution-date")
        .short('d')
        .action(ArgAction::Set)
        .help("Date to process (YYYY-MM-DD or RFC 3339); defaults to today in UTC");

    Command::new("salesflow")
        .about("Run the daily sales pipeline")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            with_config_args(Command::new("run").about("Run the pipeline and print its outcome"))
                .arg(execution_date.clone())
                .arg(
                    Arg::new("events")
                        .long("events")
                        .action(ArgAction::SetTrue)
                        .help("Print run events to stderr as JSON lines"),
                ),
        )
        .subcommand(
            with_config_args(Command::new("plan").about("Show the calls a run would make without calling anything"))
                .arg(execution_date),
        )
        .subcommand(Command::new("graph").about("Print and validate the step transition table"))
        .subcommand(with_config_args(Command::new("config").about("Print the resolved configuration")))
}

fn with_config_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_parser(value_parser!(PathBuf))
                .help("Path to a YAML or JSON config file"),
        )
        .arg(Arg::new("project-id").long("project-id").action(ArgAction::Set).help("Cloud project hosting the functions"))
        .arg(Arg::new("region").long("region").action(ArgAction::Set).help("Region the functions are deployed in"))
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .action(ArgAction::Set)
                .help("Call functions under this URL instead of the derived cloudfunctions.net host"),
        )
        .arg(
            Arg::new("execution-id")
                .long("execution-id")
                .action(ArgAction::Set)
                .help("Identifier echoed into failure notifications"),
        )
}

fn config_overrides(m: &ArgMatches) -> ConfigOverrides {
    let value = |name: &str| m.get_one::<String>(name).cloned();
    ConfigOverrides {
        project_id: value("project-id"),
        region: value("region"),
        execution_id: value("execution-id"),
        base_url: value("base-url"),
    }
}

fn load_config(m: &ArgMatches) -> Result<PipelineConfig> {
    let path = m.get_one::<PathBuf>("config");
    PipelineConfig::load(path.map(PathBuf::as_path), &config_overrides(m)).context("failed to load pipeline configuration")
}

fn pipeline_input(m: &ArgMatches) -> PipelineInput {
    PipelineInput {
        execution_date: m.get_one::<String>("execution-date").cloned(),
    }
}

/// Returns whether the run reached the success sink.
async fn run_cmd(m: &ArgMatches) -> Result<bool> {
    let config = load_config(m)?;
    let input = pipeline_input(m);
    let print_events = m.get_flag("events");
    let runner = PipelineRunner::from_config(config)?;

    let (event_tx, mut event_rx) = unbounded_channel::<PipelineEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if !print_events {
                debug!(?event, "pipeline event");
                continue;
            }
            if let Ok(line) = serde_json::to_string(&event) {
                eprintln!("{line}");
            }
        }
    });

    let outcome = runner.run_with_events(&input, event_tx).await?;
    printer.await.context("event printer task failed")?;

    info!(status = %outcome.status(), execution_date = %outcome.execution_date(), "run finished");
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome.is_success())
}

fn plan_cmd(m: &ArgMatches) -> Result<()> {
    let config = load_config(m)?;
    let plan = plan_pipeline(&config, &pipeline_input(m), Utc::now().date_naive())?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn graph_cmd() -> Result<()> {
    let table = transition_table();
    validate_graph(table).context("step graph is invalid")?;
    println!("{}", serde_json::to_string_pretty(table)?);
    Ok(())
}

fn config_cmd(m: &ArgMatches) -> Result<()> {
    let config = load_config(m)?;
    print!("{}", serde_yaml::to_string(&config)?);
    if config.auth_token.is_some() {
        println!("# identity token: set");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn flags_become_overrides() {
        let matches = build_cli()
            .try_get_matches_from([
                "salesflow",
                "run",
                "--project-id",
                "acme-sales",
                "--region",
                "europe-west1",
                "--execution-date",
                "2024-01-15",
            ])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();

        let overrides = config_overrides(sub);
        assert_eq!(overrides.project_id.as_deref(), Some("acme-sales"));
        assert_eq!(overrides.region.as_deref(), Some("europe-west1"));
        assert_eq!(overrides.base_url, None);
        assert_eq!(pipeline_input(sub).execution_date.as_deref(), Some("2024-01-15"));
    }

    #[test]
    fn graph_takes_no_config_flags() {
        assert!(build_cli().try_get_matches_from(["salesflow", "graph", "--region", "x"]).is_err());
    }
}
