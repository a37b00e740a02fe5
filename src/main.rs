//! AppRun CLI - submit and inspect app runs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use apprun::api::{parse_submission, PostRunResponse, SUBMIT_METHOD};
use apprun::credentials::ProviderCredentials;
use apprun::error::{AppRunError, FixSuggestion, Result};
use apprun::model::{Block, BlockType};
use apprun::runtime::{AppContext, RunOrchestrator, Submission, WriterSink};
use apprun::store::{NdjsonRunStore, RunStore};
use apprun::trace::{block_output, reshape_run};
use apprun::{AppRunConfig, Engine, HttpEngine};

#[derive(Parser)]
#[command(name = "apprun")]
#[command(about = "AppRun - run multi-block apps on an execution engine")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/apprun/config.toml)
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a run
    Run {
        /// Engine project owning the app
        #[arg(long)]
        project: String,

        /// App id (recorded with the run)
        #[arg(long)]
        app: String,

        /// User the run is submitted for
        #[arg(long)]
        user: String,

        /// Workspace (recorded with the run)
        #[arg(long, default_value = "default")]
        workspace: String,

        /// Specification hash
        #[arg(long)]
        hash: String,

        /// JSON file: block name → block config
        #[arg(long)]
        config: PathBuf,

        /// JSON file: array of inputs
        #[arg(long)]
        inputs: PathBuf,

        /// Relay the engine's event stream to stdout
        #[arg(long)]
        stream: bool,

        /// Wait for the run to finish
        #[arg(long)]
        blocking: bool,

        /// Only keep these blocks in the returned trace (repeatable)
        #[arg(long = "block-filter")]
        block_filter: Vec<String>,
    },

    /// Print a run's status
    Status {
        #[arg(long)]
        project: String,

        run_id: String,
    },

    /// Fetch and reshape a run
    Show {
        #[arg(long)]
        project: String,

        run_id: String,

        /// Only keep these blocks (repeatable)
        #[arg(long = "block-filter")]
        block_filter: Vec<String>,

        /// Print one block's output, as TYPE:NAME (e.g. map:LOOP)
        #[arg(long, value_parser = parse_block)]
        block: Option<Block>,
    },

    /// List recorded runs
    Runs {
        /// Show only the most recent N
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file path
    Path,
    /// Print the effective config (secrets masked)
    Show,
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    // Logs go to stderr: stdout carries run JSON and streamed bytes
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config_file = cli.config_file;

    let result = match cli.command {
        Commands::Run {
            project,
            app,
            user,
            workspace,
            hash,
            config,
            inputs,
            stream,
            blocking,
            block_filter,
        } => {
            let ctx = AppContext {
                project_id: project,
                app_id: app,
                user_id: user,
                workspace_id: workspace,
            };
            let body = SubmissionFiles {
                hash,
                config,
                inputs,
                stream,
                blocking,
                block_filter,
            };
            let result = run_app(config_file.as_deref(), ctx, body).await;
            if let Err(e) = &result {
                print_api_error(e);
            }
            result
        }
        Commands::Status { project, run_id } => {
            show_status(config_file.as_deref(), &project, &run_id).await
        }
        Commands::Show {
            project,
            run_id,
            block_filter,
            block,
        } => show_run(config_file.as_deref(), &project, &run_id, block_filter, block).await,
        Commands::Runs { limit } => list_runs(config_file.as_deref(), limit).await,
        Commands::Config { action } => show_config(config_file.as_deref(), action),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

// ═══════════════════════════════════════════════════════════════
// SETUP
// ═══════════════════════════════════════════════════════════════

fn load_config(path: Option<&Path>) -> Result<AppRunConfig> {
    let config = match path {
        Some(path) => AppRunConfig::load_from(path)?,
        None => AppRunConfig::load()?,
    }
    .with_env();
    config.validate()?;
    Ok(config)
}

fn http_engine(config: &AppRunConfig) -> Result<HttpEngine> {
    HttpEngine::with_timeouts(
        &config.engine.url,
        config.engine.timeout(),
        config.engine.connect_timeout(),
    )
    .map_err(|e| AppRunError::Config {
        reason: format!("Cannot create engine client: {}", e),
    })
}

/// Cancelled on Ctrl-C
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            trigger.cancel();
        }
    });
    token
}

fn parse_block(s: &str) -> std::result::Result<Block, String> {
    let (block_type, name) = s
        .split_once(':')
        .ok_or_else(|| format!("expected TYPE:NAME, got '{s}'"))?;
    let block_type: BlockType = block_type.parse()?;
    if name.is_empty() {
        return Err("block name is empty".to_string());
    }
    Ok(Block::new(block_type, name))
}

// ═══════════════════════════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════════════════════════

struct SubmissionFiles {
    hash: String,
    config: PathBuf,
    inputs: PathBuf,
    stream: bool,
    blocking: bool,
    block_filter: Vec<String>,
}

impl SubmissionFiles {
    /// Submission body as a caller would POST it
    async fn to_body(&self) -> Result<Value> {
        let config: Value = serde_json::from_str(&tokio::fs::read_to_string(&self.config).await?)?;
        let inputs: Value = serde_json::from_str(&tokio::fs::read_to_string(&self.inputs).await?)?;

        let mut body = json!({
            "specification_hash": self.hash,
            "config": config,
            "inputs": inputs,
            "stream": self.stream,
            "blocking": self.blocking,
        });
        if !self.block_filter.is_empty() {
            body["block_filter"] = json!(self.block_filter);
        }
        Ok(body)
    }
}

async fn run_app(config_file: Option<&Path>, ctx: AppContext, files: SubmissionFiles) -> Result<()> {
    let request = parse_submission(SUBMIT_METHOD, &files.to_body().await?)?;
    let config = load_config(config_file)?;

    let orchestrator = RunOrchestrator::new(
        Arc::new(http_engine(&config)?),
        Arc::new(NdjsonRunStore::new(config.store_path())),
        Arc::new(ProviderCredentials::new(config.providers.clone())),
    )
    .with_poll_config(config.poll_config()?)?;

    let cancel = ctrl_c_token();

    match orchestrator.submit(&ctx, request, &cancel).await? {
        Submission::Run(run) => {
            println!("{}", serde_json::to_string_pretty(&PostRunResponse { run })?);
        }
        Submission::Stream(pending) => {
            let mut sink = WriterSink::new(tokio::io::stdout());
            let outcome = pending.relay(&mut sink, &cancel).await;
            tracing::info!(
                chunks = outcome.chunks,
                bytes = outcome.bytes,
                closed = ?outcome.closed,
                run_id = outcome.run_id().unwrap_or("-"),
                "Stream finished"
            );
        }
    }
    Ok(())
}

async fn show_status(config_file: Option<&Path>, project: &str, run_id: &str) -> Result<()> {
    let config = load_config(config_file)?;
    let engine = http_engine(&config)?;

    let status = engine
        .get_run_status(project, run_id)
        .await
        .map_err(|source| AppRunError::RunStatus {
            run_id: run_id.to_string(),
            source,
        })?;

    println!("{} {}", "Run:".cyan().bold(), status.run);
    for block in &status.blocks {
        let progress = block
            .live_progress()
            .map(|(ok, err)| format!("  [{} ok, {} err]", ok, err))
            .unwrap_or_default();
        println!(
            "  {} {} {}{}",
            block.block_type.to_string().dimmed(),
            block.name.bold(),
            block.status,
            progress
        );
    }
    Ok(())
}

async fn show_run(
    config_file: Option<&Path>,
    project: &str,
    run_id: &str,
    block_filter: Vec<String>,
    block: Option<Block>,
) -> Result<()> {
    let config = load_config(config_file)?;
    let engine = http_engine(&config)?;

    let run = engine
        .get_run(project, run_id)
        .await
        .map_err(|source| AppRunError::RunRetrieval {
            run_id: run_id.to_string(),
            source,
        })?;
    let filter = (!block_filter.is_empty()).then_some(block_filter.as_slice());
    let run = reshape_run(run, filter);

    let Some(block) = block else {
        println!("{}", serde_json::to_string_pretty(&PostRunResponse { run })?);
        return Ok(());
    };

    let Some(output) = block_output(&block, &run) else {
        println!("{} no output for {}:{}", "→".cyan(), block.block_type, block.name);
        return Ok(());
    };

    println!(
        "{} {} {}",
        output.block.block_type.to_string().dimmed(),
        output.block.name.bold(),
        output.summary.to_string().cyan()
    );
    for (i, row) in output.rows.iter().enumerate() {
        for cell in row {
            match cell.display_error() {
                Some(error) if cell.is_error() => println!("  #{i} {}", error.red()),
                _ => println!(
                    "  #{i} {}",
                    cell.value.as_ref().map(Value::to_string).unwrap_or_default()
                ),
            }
        }
    }
    Ok(())
}

async fn list_runs(config_file: Option<&Path>, limit: Option<usize>) -> Result<()> {
    let config = load_config(config_file)?;
    let store = NdjsonRunStore::new(config.store_path());

    let records = store.list().await?;
    let skip = limit.map_or(0, |n| records.len().saturating_sub(n));

    if records.is_empty() {
        println!("{} No runs recorded", "→".cyan());
    }
    for record in records.iter().skip(skip) {
        println!(
            "{} {} {} {} {}",
            record.created.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            record.run_id.bold(),
            record.app_id,
            record.run_type,
            record.user_id.dimmed()
        );
    }
    Ok(())
}

fn show_config(config_file: Option<&Path>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => {
            let path = config_file
                .map(Path::to_path_buf)
                .unwrap_or_else(AppRunConfig::config_path);
            println!("{}", path.display());
        }
        ConfigAction::Show => {
            let config = load_config(config_file)?;
            print!("{}", config.redacted().to_toml()?);
            println!("# store file: {}", config.store_path().display());
        }
    }
    Ok(())
}

fn print_api_error(e: &AppRunError) {
    let api_error = e.to_api_error();
    if let Ok(body) = serde_json::to_string_pretty(&api_error) {
        println!("{}", body);
    }
}
