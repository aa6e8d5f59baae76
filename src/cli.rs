use crate::api::{DashboardClient, HistoryStore, RunExecutor, ServiceCatalog};
use crate::config::{DashboardConfig, Overrides};
use crate::flags::FlagClassification;
use crate::model::{ControllerEvent, RunRecord, RunStatus};
use crate::orchestrator::{ApplyPreview, ApplyProjector, RunController, RunHistory};
use crate::params::ParameterRowSet;
use crate::preview::{build_command_preview, required_args, BENCH_EXECUTABLE};
use crate::text_summary::{build_run_summary, format_params, history_line};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "llm-dock-bench",
    version,
    about = "Benchmark llm-dock llama.cpp services and track the runs"
)]
pub struct Cli {
    /// Dashboard base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Dashboard API token (defaults to DASHBOARD_TOKEN)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Service to benchmark (defaults to DASHBOARD_SERVICE)
    #[arg(short, long, global = true)]
    pub service: Option<String>,

    /// Interval between run status polls
    #[arg(long, global = true)]
    pub poll_interval: Option<humantime::Duration>,

    /// Number of past runs to load into history
    #[arg(long, global = true)]
    pub history_limit: Option<usize>,

    /// Give up after this many polls without a result (default: wait for the executor)
    #[arg(long, global = true)]
    pub max_polls: Option<u32>,

    /// Path to a JSON config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Start a benchmark and wait for its result
    Run(EditArgs),
    /// Print the command a run would execute
    Preview(EditArgs),
    /// List recent runs, newest first
    History {
        /// Only show runs with this status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },
    /// Show one run
    Show { run_id: String },
    /// Copy a run's non-benchmark parameters onto the service configuration
    Apply {
        run_id: String,
        /// Apply without stopping at the preview
        #[arg(long)]
        yes: bool,
    },
    /// Delete a run (cancels it if still active)
    Delete { run_id: String },
    /// List configurable flags for a service template
    Flags {
        /// Template type (llamacpp or vllm)
        template: Option<String>,
    },
}

/// Editor inputs shared by `run` and `preview`.
#[derive(Debug, Args, Clone, Default)]
pub struct EditArgs {
    /// Set a flag, e.g. `-P -ngl=99` or `-P -fa` for a boolean flag
    #[arg(short = 'P', long = "param", value_name = "FLAG[=VALUE]", allow_hyphen_values = true)]
    pub params: Vec<String>,

    /// Remove a flag from the editor
    #[arg(long, value_name = "FLAG", allow_hyphen_values = true)]
    pub unset: Vec<String>,

    /// Start from a past run's parameters
    #[arg(long, value_name = "RUN_ID")]
    pub rerun: Option<String>,

    /// Start from the safe defaults instead of the latest run
    #[arg(long)]
    pub fresh: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl From<StatusArg> for RunStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Pending => RunStatus::Pending,
            StatusArg::Running => RunStatus::Running,
            StatusArg::Completed => RunStatus::Completed,
            StatusArg::Failed => RunStatus::Failed,
            StatusArg::Cancelled => RunStatus::Cancelled,
        }
    }
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            service: self.service.clone(),
            poll_interval: self.poll_interval.map(Into::into),
            history_limit: self.history_limit,
            max_polls: self.max_polls,
        }
    }
}

/// Resolved configuration plus the dashboard client and output channel.
struct App {
    cfg: DashboardConfig,
    client: Arc<DashboardClient>,
    out: mpsc::UnboundedSender<OutputLine>,
    json: bool,
}

impl App {
    fn stdout(&self, line: impl Into<String>) {
        let _ = self.out.send(OutputLine::Stdout(line.into()));
    }

    fn stderr(&self, line: impl Into<String>) {
        let _ = self.out.send(OutputLine::Stderr(line.into()));
    }

    fn history(&self) -> Result<RunHistory> {
        let service = self.cfg.require_service()?;
        Ok(RunHistory::new(
            self.client.clone(),
            service,
            self.cfg.history_limit,
        ))
    }

    fn projector(&self) -> Result<ApplyProjector> {
        Ok(ApplyProjector::new(
            FlagClassification::default(),
            self.client.clone(),
            self.history()?,
        ))
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = DashboardConfig::load(args.config.clone(), &args.overrides())?;
    let token = cfg.require_token()?;
    let client = Arc::new(
        DashboardClient::new(&cfg.base_url, token).context("failed to build HTTP client")?,
    );
    let (out, out_handle) = spawn_output_writer();
    let app = App {
        cfg,
        client,
        out,
        json: args.json,
    };

    let res = match args.command {
        Command::Run(edit) => run_benchmark(&app, &edit).await,
        Command::Preview(edit) => preview(&app, &edit).await,
        Command::History { status } => list_history(&app, status.map(Into::into)).await,
        Command::Show { run_id } => show_run(&app, &run_id).await,
        Command::Apply { run_id, yes } => apply_run(&app, &run_id, yes).await,
        Command::Delete { run_id } => delete_run(&app, &run_id).await,
        Command::Flags { template } => list_flags(&app, template).await,
    };

    drop(app);
    let _ = out_handle.await;
    res
}

/// Split `-ngl=99` into flag and value; a bare flag has an empty value.
fn parse_param(raw: &str) -> Result<(String, String)> {
    let (flag, value) = match raw.split_once('=') {
        Some((f, v)) => (f.trim(), v.trim()),
        None => (raw.trim(), ""),
    };
    if flag.is_empty() {
        bail!("empty flag in parameter '{raw}'");
    }
    Ok((flag.to_string(), value.to_string()))
}

/// Build the editor: seed from history or defaults, then apply command-line edits.
fn build_editor(
    controller: &RunController,
    edit: &EditArgs,
    history_limit: usize,
) -> Result<ParameterRowSet> {
    let classification = FlagClassification::default();
    let latest = if edit.fresh {
        None
    } else {
        controller.history().latest()
    };
    let mut rows = ParameterRowSet::initial(latest.as_ref(), classification);

    if let Some(run_id) = edit.rerun.as_deref() {
        if !controller.rerun_from_history(run_id, &mut rows) {
            bail!("run {run_id} is not among the last {history_limit} runs of this service");
        }
    }

    for flag in &edit.unset {
        ensure_editable(&rows, flag)?;
        if let Some(id) = rows.find_flag(flag).map(|r| r.id) {
            rows.remove(id);
        }
    }

    for raw in &edit.params {
        let (flag, value) = parse_param(raw)?;
        ensure_editable(&rows, &flag)?;
        if !rows.add(flag.clone(), value.clone()) {
            if let Some(id) = rows.find_flag(&flag).map(|r| r.id) {
                rows.set_value(id, value);
            }
        }
    }
    debug!(edits = rows.revision(), params = rows.to_map().len(), "editor ready");
    Ok(rows)
}

fn ensure_editable(rows: &ParameterRowSet, flag: &str) -> Result<()> {
    if rows.is_locked(flag) {
        bail!("{flag} is supplied by the dashboard and cannot be set or removed");
    }
    Ok(())
}

/// Controller wired to the dashboard with a freshly loaded history window.
async fn controller(app: &App) -> Result<(RunController, mpsc::UnboundedReceiver<ControllerEvent>)> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let controller = RunController::new(
        app.cfg.controller_settings(),
        app.client.clone(),
        app.history()?,
        event_tx,
    );
    if let Err(e) = controller.refresh_history().await {
        warn!(error = %e, "could not load run history; starting from defaults");
    }
    Ok((controller, event_rx))
}

async fn command_preview(app: &App, rows: &ParameterRowSet) -> Result<String> {
    let service = app.cfg.require_service()?;
    let model_path = match app.client.service_defaults(service).await {
        Ok(defaults) => defaults.model_path,
        Err(e) => {
            warn!(error = %e, "could not fetch service defaults");
            String::from("<model>")
        }
    };
    Ok(build_command_preview(
        BENCH_EXECUTABLE,
        &required_args(&model_path),
        rows,
    ))
}

async fn preview(app: &App, edit: &EditArgs) -> Result<()> {
    let (controller, _events) = controller(app).await?;
    let rows = build_editor(&controller, edit, app.cfg.history_limit)?;
    let line = command_preview(app, &rows).await?;
    if app.json {
        app.stdout(serde_json::to_string_pretty(&serde_json::json!({
            "command": line,
            "params": rows.to_map(),
        }))?);
    } else {
        app.stdout(line);
    }
    Ok(())
}

async fn run_benchmark(app: &App, edit: &EditArgs) -> Result<()> {
    let (controller, mut events) = controller(app).await?;
    let rows = build_editor(&controller, edit, app.cfg.history_limit)?;
    app.stderr(format!("$ {}", command_preview(app, &rows).await?));

    let run_id = controller
        .start(&rows)
        .await
        .context("failed to start benchmark")?;

    let mut finished: Option<RunRecord> = None;
    loop {
        tokio::select! {
            ev = events.recv() => match ev {
                Some(ControllerEvent::Progress { status, polls, .. }) => {
                    app.stderr(format!("{run_id}: {status} (poll {polls})"));
                }
                Some(ControllerEvent::Info(info)) => app.stderr(info.to_message()),
                Some(ControllerEvent::Finished { record, summary }) => {
                    if app.json {
                        app.stdout(serde_json::to_string_pretty(&record)?);
                    } else {
                        for line in summary {
                            app.stdout(line);
                        }
                    }
                    finished = Some(*record);
                    break;
                }
                Some(ControllerEvent::StateChanged(_)) | Some(ControllerEvent::HistoryRefreshed { .. }) => {}
                None => {
                    warn!(state = ?controller.state(), "controller event stream closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                let tracked = controller.active_run_id().unwrap_or_else(|| run_id.clone());
                let last = controller
                    .running_indicator()
                    .map_or("pending", RunStatus::as_str);
                controller.stop();
                app.stderr(format!(
                    "Stopped tracking {tracked} (last status: {last}); the run continues on the dashboard"
                ));
                break;
            }
        }
    }

    match finished {
        Some(record) if record.status != RunStatus::Completed => {
            bail!("benchmark {} {}", record.id, record.status)
        }
        _ => Ok(()),
    }
}

async fn list_history(app: &App, status: Option<RunStatus>) -> Result<()> {
    let service = app.cfg.require_service()?;
    let runs = app
        .client
        .list_runs(service, status, app.cfg.history_limit)
        .await
        .context("failed to list runs")?;
    if app.json {
        app.stdout(serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    if runs.is_empty() {
        app.stderr(format!("No benchmark runs for {service}"));
    }
    for run in &runs {
        app.stdout(history_line(run));
    }
    Ok(())
}

async fn show_run(app: &App, run_id: &str) -> Result<()> {
    let run = app
        .client
        .get_run(run_id)
        .await
        .with_context(|| format!("failed to fetch run {run_id}"))?;
    if app.json {
        app.stdout(serde_json::to_string_pretty(&run)?);
        return Ok(());
    }
    app.stdout(format!("Run: {} ({})", run.id, run.service_name));
    if let Some(model) = run.model_path.as_deref() {
        app.stdout(format!("Model path: {model}"));
    }
    app.stdout(format!("Params: {}", format_params(&run.params)));
    app.stdout(format!("Created: {}", run.created_at));
    if !run.status.is_terminal() {
        app.stdout(format!("Status: {} (still in progress)", run.status));
    } else if let Some(completed) = run.completed_at.as_deref() {
        app.stdout(format!("Finished: {completed}"));
    }
    for line in build_run_summary(&run).lines {
        app.stdout(line);
    }
    Ok(())
}

fn print_apply_preview(app: &App, run: &RunRecord, preview: &ApplyPreview) {
    if preview.applicable.is_empty() {
        app.stdout(format!("Nothing to apply to {}", run.service_name));
    } else {
        app.stdout(format!(
            "Will apply to {}: {}",
            run.service_name, preview.formatted
        ));
    }
    if !preview.skipped.is_empty() {
        app.stdout(format!(
            "Skipped (benchmark-only): {}",
            preview.skipped.join(" ")
        ));
    }
}

async fn apply_run(app: &App, run_id: &str, yes: bool) -> Result<()> {
    let run = app
        .client
        .get_run(run_id)
        .await
        .with_context(|| format!("failed to fetch run {run_id}"))?;
    let projector = app.projector()?;
    let preview = projector.preview(&run);
    print_apply_preview(app, &run, &preview);
    if !yes {
        app.stderr("Re-run with --yes to apply.");
        return Ok(());
    }
    let ack = projector.apply(&run).await?;
    if app.json {
        app.stdout(serde_json::to_string_pretty(&ack)?);
    } else {
        app.stdout(ack.message);
    }
    Ok(())
}

async fn delete_run(app: &App, run_id: &str) -> Result<()> {
    app.projector()?
        .delete_run(run_id)
        .await
        .with_context(|| format!("failed to delete run {run_id}"))?;
    app.stderr(format!("Deleted {run_id}"));
    Ok(())
}

async fn list_flags(app: &App, template: Option<String>) -> Result<()> {
    let template = template.unwrap_or_else(|| app.cfg.template_type.clone());
    let catalog = app
        .client
        .flag_metadata(&template)
        .await
        .with_context(|| format!("failed to fetch flag metadata for {template}"))?;
    if app.json {
        app.stdout(serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }
    for (key, meta) in &catalog.optional_flags {
        app.stdout(format!(
            "{:<24} {:<28} {:<12} {:<10} {}",
            meta.cli,
            key,
            meta.category.as_deref().unwrap_or("-"),
            meta.default.as_deref().unwrap_or("-"),
            meta.description.as_deref().unwrap_or("")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{record_with_params, FakeDashboard, SERVICE};
    use crate::model::ParamMap;
    use crate::orchestrator::ControllerSettings;
    use pretty_assertions::assert_eq;

    async fn controller_with(history: Vec<RunRecord>) -> RunController {
        let fake = Arc::new(FakeDashboard::default());
        *fake.history.lock().unwrap() = history;
        let (tx, _rx) = mpsc::unbounded_channel();
        let controller = RunController::new(
            ControllerSettings::default(),
            fake.clone(),
            RunHistory::new(fake, SERVICE, 20),
            tx,
        );
        controller.refresh_history().await.unwrap();
        controller
    }

    fn map(pairs: &[(&str, &str)]) -> ParamMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn edits(params: &[&str], unset: &[&str]) -> EditArgs {
        EditArgs {
            params: params.iter().map(|s| s.to_string()).collect(),
            unset: unset.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn editor_seeds_from_latest_run_then_applies_edits() {
        let ctl = controller_with(vec![record_with_params(
            "latest",
            &[("-p", "512"), ("-ngl", "40")],
        )])
        .await;

        let rows = build_editor(&ctl, &edits(&["-ngl=99", "-fa"], &["-p"]), 20).unwrap();
        assert_eq!(rows.to_map(), map(&[("-ngl", "99"), ("-fa", "")]));
    }

    #[tokio::test]
    async fn fresh_editor_ignores_history() {
        let ctl = controller_with(vec![record_with_params("latest", &[("-ngl", "40")])]).await;
        let args = EditArgs {
            fresh: true,
            ..Default::default()
        };
        let rows = build_editor(&ctl, &args, 20).unwrap();
        assert_eq!(rows.to_map(), map(&[("-p", "512"), ("-n", "128"), ("-r", "3")]));
    }

    #[tokio::test]
    async fn rerun_loads_past_params_and_rejects_unknown_ids() {
        let ctl = controller_with(vec![
            record_with_params("latest", &[("-ngl", "40")]),
            record_with_params("older", &[("-b", "1024"), ("-r", "5")]),
        ])
        .await;

        let args = EditArgs {
            rerun: Some("older".into()),
            ..Default::default()
        };
        let rows = build_editor(&ctl, &args, 20).unwrap();
        assert_eq!(rows.to_map(), map(&[("-r", "5"), ("-b", "1024")]));

        let args = EditArgs {
            rerun: Some("missing".into()),
            ..Default::default()
        };
        let err = build_editor(&ctl, &args, 20).err().unwrap();
        assert!(err.to_string().contains("not among the last 20 runs"));
    }

    #[tokio::test]
    async fn dashboard_supplied_flags_cannot_be_edited() {
        let ctl = controller_with(Vec::new()).await;

        let err = build_editor(&ctl, &edits(&["-m=/models/x.gguf"], &[]), 20)
            .err()
            .unwrap();
        assert!(err.to_string().contains("-m is supplied by the dashboard"));

        let err = build_editor(&ctl, &edits(&[], &["-o"]), 20).err().unwrap();
        assert!(err.to_string().contains("-o is supplied by the dashboard"));

        assert!(build_editor(&ctl, &edits(&["-ngl=99"], &["-r"]), 20).is_ok());
    }

    #[test]
    fn parse_param_splits_on_first_equals() {
        assert_eq!(
            parse_param("-ngl=99").unwrap(),
            ("-ngl".to_string(), "99".to_string())
        );
        assert_eq!(
            parse_param("--override-kv=a=b").unwrap(),
            ("--override-kv".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_param("-fa").unwrap(), ("-fa".to_string(), String::new()));
        assert!(parse_param("=1").is_err());
    }

    #[test]
    fn cli_accepts_hyphenated_param_values() {
        let cli = Cli::try_parse_from([
            "llm-dock-bench",
            "--service",
            "llama-qwen",
            "run",
            "-P",
            "-ngl=99",
            "--unset",
            "-r",
        ])
        .unwrap();
        match cli.command {
            Command::Run(edit) => {
                assert_eq!(edit.params, vec!["-ngl=99".to_string()]);
                assert_eq!(edit.unset, vec!["-r".to_string()]);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.service.as_deref(), Some("llama-qwen"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
