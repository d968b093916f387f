use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::NaiveTime;
use clap::{Parser, Subcommand};

use fleetwatch::agent_core::{Orchestrator, RunOutcome};
use fleetwatch::config::{self, AppConfig};
use fleetwatch::health::HealthSnapshot;
use fleetwatch::inference::AnthropicClient;
use fleetwatch::mcp_client::{McpClient, TransportConfig};
use fleetwatch::metrics::{Metric, MetricsSink};
use fleetwatch::notify::{self, Notifier};
use fleetwatch::scheduler::Scheduler;

#[derive(Parser, Debug)]
#[command(
    name = "fleetwatch",
    version,
    about = "Scheduled fleet health reports over MCP"
)]
struct Cli {
    /// Path to fleetwatch.yaml. Defaults to the platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines instead of plain text.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Produce one fleet report and print it to stdout.
    Run,
    /// Run the daily schedule loop in the foreground.
    Schedule,
    /// Validate the configuration file and exit.
    CheckConfig,
    /// Print the last persisted health snapshot.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    fleetwatch::init_tracing(cli.log_json);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    tracing::info!(config = %config_path.display(), "resolved config path");

    match cli.command {
        Command::Run => run_once(&config_path).await,
        Command::Schedule => run_schedule(&config_path).await,
        Command::CheckConfig => check_config(&config_path),
        Command::Health => print_health(&config_path),
    }
}

fn load(config_path: &Path) -> anyhow::Result<AppConfig> {
    config::load_config(config_path)
        .with_context(|| format!("loading {}", config_path.display()))
}

// ─── Commands ───────────────────────────────────────────────────────────────

async fn run_once(config_path: &Path) -> anyhow::Result<()> {
    let config = load(config_path)?;
    let api_key = config.resolve_api_key()?;

    let outcome = execute_report_run(&config, &api_key).await?;
    if outcome.report.is_none() {
        tracing::warn!("run finished without a structured report");
    }
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn run_schedule(config_path: &Path) -> anyhow::Result<()> {
    let config = load(config_path)?;
    if !config.schedule.enabled {
        anyhow::bail!(
            "schedule.enabled is false in {}; enable it or use `fleetwatch run`",
            config_path.display()
        );
    }
    let time = NaiveTime::parse_from_str(&config.schedule.time, "%H:%M")
        .with_context(|| format!("parsing schedule.time {:?}", config.schedule.time))?;
    let api_key = Arc::new(config.resolve_api_key()?);
    let notifier = Arc::new(Notifier::new(config.notify.webhook_url.clone())?);
    let metrics = MetricsSink::spawn();
    let health = Arc::new(Mutex::new(HealthSnapshot::new()));
    let config = Arc::new(config);

    tracing::info!(time = %config.schedule.time, "schedule loop starting");
    Scheduler::new(time)
        .with_metrics(metrics.clone())
        .run_daily(move || {
            report_job(
                Arc::clone(&config),
                Arc::clone(&api_key),
                Arc::clone(&notifier),
                metrics.clone(),
                Arc::clone(&health),
            )
        })
        .await;
    Ok(())
}

fn check_config(config_path: &Path) -> anyhow::Result<()> {
    let config = load(config_path)?;

    println!("configuration OK: {}", config_path.display());
    println!("  transport: {}", describe_transport(&config.transport));
    println!("  model: {}", config.backend.model);
    let schedule = if config.schedule.enabled {
        format!("daily at {}", config.schedule.time)
    } else {
        "disabled".to_string()
    };
    println!("  schedule: {schedule}");
    let webhook = if config.notify.webhook_url.is_some() {
        "configured"
    } else {
        "none"
    };
    println!("  webhook: {webhook}");
    if let Err(err) = config.resolve_api_key() {
        println!("  warning: {err}");
    }
    Ok(())
}

fn print_health(config_path: &Path) -> anyhow::Result<()> {
    let config = load(config_path)?;
    let path = config
        .health
        .status_path
        .as_ref()
        .context("health.status_path is not configured")?;
    let snapshot = HealthSnapshot::read_from(path)
        .with_context(|| format!("reading {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

// ─── Report Execution ───────────────────────────────────────────────────────

/// One full report run: fresh session, orchestrated conversation, teardown.
async fn execute_report_run(config: &AppConfig, api_key: &str) -> anyhow::Result<RunOutcome> {
    let mut backend = AnthropicClient::new(api_key, &config.backend.model)?;
    if let Some(base_url) = &config.backend.base_url {
        backend = backend.with_base_url(base_url);
    }
    let orchestrator = Orchestrator::new(backend, config.run_options());

    let mut client = McpClient::from_config(config.transport.clone(), config.client_options());
    client.connect().await?;
    let result = orchestrator
        .run(
            &mut client,
            &config.agent.system_prompt,
            &config.agent.task_prompt,
        )
        .await;
    client.disconnect().await;
    Ok(result?)
}

/// The scheduled job: run, then fan the outcome out to metrics, health, and
/// the webhook. Never returns an error; the schedule loop must survive any
/// failed run.
async fn report_job(
    config: Arc<AppConfig>,
    api_key: Arc<String>,
    notifier: Arc<Notifier>,
    metrics: MetricsSink,
    health: Arc<Mutex<HealthSnapshot>>,
) {
    tracing::info!("scheduled report run starting");
    let result = execute_report_run(&config, &api_key).await;

    let message = match &result {
        Ok(outcome) => {
            metrics.record(Metric::RunCompleted { ok: true });
            metrics.record(Metric::ToolCalls {
                count: outcome.tool_call_count,
            });
            metrics.record(Metric::Tokens {
                input: outcome.token_usage.input_tokens,
                output: outcome.token_usage.output_tokens,
            });
            notify::render_outcome(outcome)
        }
        Err(err) => {
            metrics.record(Metric::RunCompleted { ok: false });
            tracing::error!(error = %format!("{err:#}"), "scheduled report run failed");
            let err_ref: &(dyn std::error::Error + 'static) = err.as_ref();
            notify::render_failure(err_ref)
        }
    };

    update_health(&health, &config, &result);
    notifier.send(&message).await;
    tracing::info!(ok = result.is_ok(), "scheduled report run finished");
}

fn update_health(
    health: &Mutex<HealthSnapshot>,
    config: &AppConfig,
    result: &anyhow::Result<RunOutcome>,
) {
    let mut snapshot = match health.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    match result {
        Ok(_) => snapshot.record_success(),
        Err(err) => snapshot.record_failure(&format!("{err:#}")),
    }
    if let Some(path) = &config.health.status_path {
        if let Err(err) = snapshot.write_to(path) {
            tracing::warn!(path = %path.display(), error = %err, "failed to write health snapshot");
        }
    }
}

fn describe_transport(transport: &TransportConfig) -> String {
    match transport {
        TransportConfig::Stdio { command, .. } => format!("stdio ({command})"),
        TransportConfig::Tcp { addr } => format!("tcp ({addr})"),
    }
}
