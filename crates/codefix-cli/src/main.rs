//! CodeFix - lint a repository and repair the findings with a local model
//!
//! ## Commands
//!
//! - `run`: lint, fix, validate and land fixes on a review branch
//! - `cleanup`: delete cached linter environments
//! - `env list`: show cached linter environments
//! - `models`: list models on the configured Ollama server

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use codefix_core::{
    load_or_default, runner_from_config, CodefixConfig, FixReport, FixSynthesizer, OllamaClient,
    OutputMode, ReportDetail, RunnerKind, SynthesisConfig, WorkflowController, WorkflowOptions,
};
use codefix_lint::{AdapterRegistry, LintOrchestrator};
use lint_env_manager::{CancelToken, EnvironmentManager, ManagerConfig};
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "codefix")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Lint a repository and fix the findings with a local model", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (default: ~/.codefix/config.toml)
    #[arg(long, global = true, env = "CODEFIX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint a repository, fix what the linters find and commit the fixes
    Run(RunArgs),

    /// Delete cached linter environments
    Cleanup {
        /// Only delete environments unused for this many hours
        /// (default: delete every environment not in use)
        #[arg(long)]
        older_than_hours: Option<i64>,
    },

    /// Linter environment cache
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },

    /// List models available on the configured Ollama server
    Models,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Repository to fix
    #[arg(short, long, default_value = ".")]
    repo: PathBuf,

    /// Branch to commit fixes to
    #[arg(short, long, env = "CODEFIX_BRANCH")]
    branch: Option<String>,

    /// Model name passed to the runner
    #[arg(short, long, env = "CODEFIX_MODEL")]
    model: Option<String>,

    /// Model runner: ollama, ollama-cli or llama.cpp
    #[arg(long, env = "CODEFIX_RUNNER")]
    runner: Option<RunnerKind>,

    /// Ollama server URL
    #[arg(long, env = "CODEFIX_ENDPOINT")]
    endpoint: Option<String>,

    /// Commit locally without pushing or opening a pull request
    #[arg(long)]
    no_push: bool,

    /// Report what would be fixed without touching the repository
    #[arg(long)]
    dry_run: bool,

    /// Replace the fix branch if it already exists
    #[arg(long)]
    overwrite_branch: bool,

    /// Report format: text or json
    #[arg(short, long)]
    output: Option<OutputMode>,

    /// Include every lint issue in the report
    #[arg(long)]
    show_issues: bool,

    /// Include the diff of each accepted fix in the report
    #[arg(long)]
    show_diff: bool,

    /// Files fixed concurrently
    #[arg(long)]
    max_concurrency: Option<usize>,
}

#[derive(Subcommand)]
enum EnvAction {
    /// List cached environments
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        output: OutputMode,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    codefix_core::telemetry::init_tracing(cli.json, level);

    let mut config =
        load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Run(args) => {
            apply_overrides(&mut config, &args);
            cmd_run(&config, &args).await
        }
        Commands::Cleanup { older_than_hours } => {
            cmd_cleanup(&config, older_than_hours)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Env { action } => match action {
            EnvAction::List { output } => {
                cmd_env_list(&config, output)?;
                Ok(ExitCode::SUCCESS)
            }
        },
        Commands::Models => {
            cmd_models(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Command-line flags win over the configuration file.
fn apply_overrides(config: &mut CodefixConfig, args: &RunArgs) {
    if let Some(branch) = &args.branch {
        config.git.branch = branch.clone();
    }
    if let Some(model) = &args.model {
        config.model.name = model.clone();
    }
    if let Some(runner) = args.runner {
        config.model.runner = runner;
    }
    if let Some(endpoint) = &args.endpoint {
        config.model.endpoint = endpoint.clone();
    }
    if args.no_push {
        config.git.push = false;
    }
    if args.overwrite_branch {
        config.git.overwrite_branch = true;
    }
    if let Some(output) = args.output {
        config.output.mode = output;
    }
    config.output.show_issues |= args.show_issues;
    config.output.show_diff |= args.show_diff;
    if let Some(n) = args.max_concurrency {
        config.fix.max_concurrency = n.max(1);
    }
}

fn environment_manager(config: &CodefixConfig) -> EnvironmentManager {
    let defaults = ManagerConfig::default();
    EnvironmentManager::new(ManagerConfig {
        root: config.env.root.clone().unwrap_or(defaults.root),
        staleness: chrono::Duration::days(config.env.staleness_days),
    })
}

async fn cmd_run(config: &CodefixConfig, args: &RunArgs) -> Result<ExitCode> {
    let repo = args
        .repo
        .canonicalize()
        .with_context(|| format!("Repository not found: {}", args.repo.display()))?;

    let runner = runner_from_config(&config.model).context("Failed to set up model runner")?;
    info!(runner = %config.model.runner, model = %config.model.name, "model runner ready");

    let envs = Arc::new(environment_manager(config));
    match envs.evict_expired(chrono::Duration::hours(config.env.eviction_hours)) {
        Ok(report) if !report.removed.is_empty() => {
            info!(removed = report.removed.len(), "evicted unused environments");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "environment eviction failed"),
    }

    let options = WorkflowOptions {
        dry_run: args.dry_run,
        ..WorkflowOptions::from(config)
    };
    let controller = WorkflowController::new(
        envs,
        AdapterRegistry::builtin(),
        FixSynthesizer::new(runner, SynthesisConfig::from(config)),
        options,
    )
    .with_orchestrator(LintOrchestrator::new(config.lint_timeout()));

    let cancel = CancelToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling run");
            interrupt.cancel();
        }
    });

    let outcome = controller.run_detected(&repo, &cancel).await;
    let report = FixReport::build(
        &outcome,
        ReportDetail {
            show_issues: config.output.show_issues,
            show_diff: config.output.show_diff,
        },
    );
    let rendered = report
        .render(config.output.mode)
        .context("Failed to render report")?;
    println!("{}", rendered.trim_end());

    Ok(if outcome.is_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn cmd_cleanup(config: &CodefixConfig, older_than_hours: Option<i64>) -> Result<()> {
    let envs = environment_manager(config);
    let report = match older_than_hours {
        Some(hours) => envs.evict_expired(chrono::Duration::hours(hours)),
        None => envs.evict_all(),
    }
    .with_context(|| format!("Failed to clean up {}", envs.root().display()))?;

    println!("Removed {} environment(s)", report.removed.len());
    for dir in &report.removed {
        println!("  {}", dir.display());
    }
    if !report.retained.is_empty() {
        println!("Kept {} environment(s) in use", report.retained.len());
    }
    Ok(())
}

fn cmd_env_list(config: &CodefixConfig, output: OutputMode) -> Result<()> {
    let manager = environment_manager(config);
    let envs = manager
        .list()
        .with_context(|| format!("Failed to read {}", manager.root().display()))?;

    if output == OutputMode::Json {
        println!("{}", serde_json::to_string_pretty(&envs)?);
        return Ok(());
    }

    if envs.is_empty() {
        println!("No cached environments under {}", manager.root().display());
        return Ok(());
    }
    println!(
        "{:<12} {:<14} {:<20} {:<20} PATH",
        "LANGUAGE", "STATE", "CREATED", "LAST USED"
    );
    for env in &envs {
        println!(
            "{:<12} {:<14} {:<20} {:<20} {}",
            env.key.language,
            env.state.to_string(),
            env.created_at.format("%Y-%m-%d %H:%M:%S"),
            env.last_used_at.format("%Y-%m-%d %H:%M:%S"),
            env.dir.display()
        );
    }
    Ok(())
}

async fn cmd_models(config: &CodefixConfig) -> Result<()> {
    if config.model.runner != RunnerKind::Ollama {
        warn!(runner = %config.model.runner, "listing models from the Ollama server regardless of runner");
    }
    let client = OllamaClient::new(&config.model.endpoint, &config.model.name)
        .context("Failed to create Ollama client")?;
    let models = client
        .list_models()
        .await
        .with_context(|| format!("Failed to list models from {}", config.model.endpoint))?;

    if models.is_empty() {
        println!("No models installed on {}", config.model.endpoint);
        return Ok(());
    }
    for model in models {
        let marker = if model == config.model.name { "*" } else { " " };
        println!("{marker} {model}");
    }
    Ok(())
}
