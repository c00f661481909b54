//! Assent CLI - inspection commands over conversation files.
//!
//! A conversation file is the JSON array of UI messages a client holds,
//! approvals included.
//!
//! ```text
//! assent reconcile chat.json   # run approved calls, print notices + conversation
//! assent sanitize chat.json    # the conversation as the model would see it
//! assent tools                 # built-in tool manifest
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use assent_engine::{
    AssentConfig, Message, NoticeLog, ToolRegistry, builtin_registry, cleanup_messages,
    config_path, reconcile,
};

#[derive(Debug, Parser)]
#[command(name = "assent", version, about = "Human-in-the-loop tool call reconciliation")]
struct Cli {
    /// Config file to use instead of ~/.assent/config.toml.
    #[arg(long, global = true, env = "ASSENT_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute approved calls, record denials and print the tool result
    /// notices (JSON lines) followed by the reconciled conversation.
    Reconcile { file: PathBuf },
    /// Drop messages holding tool calls without a result.
    Sanitize { file: PathBuf },
    /// List the built-in tool definitions.
    Tools,
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (log_file, init_warnings) = open_log_file(log_file_candidates());

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();
        tracing::info!(path = %log_path.display(), "Logging initialized");
    } else {
        // Stdout carries command output.
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr))
            .with(env_filter)
            .init();
    }
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file(candidates: Vec<PathBuf>) -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in candidates {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.assent/logs/assent.log
    if let Some(config_path) = config_path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("assent.log"));
    }

    // Fallback: ./.assent/logs/assent.log
    candidates.push(PathBuf::from(".assent").join("logs").join("assent.log"));

    candidates
}

fn load_config(path: Option<&Path>) -> AssentConfig {
    let loaded = match path {
        Some(path) => AssentConfig::load_from(path),
        None => AssentConfig::load(),
    };
    loaded.unwrap_or_else(|e| {
        tracing::warn!(path = %e.path().display(), "Using default config: {e}");
        AssentConfig::default()
    })
}

fn read_conversation(path: &Path) -> Result<Vec<Message>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read conversation {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse conversation {}", path.display()))
}

async fn run_reconcile(registry: &ToolRegistry, file: &Path, out: &mut impl Write) -> Result<()> {
    let messages = read_conversation(file)?;
    let log = NoticeLog::new();
    let reconciled = reconcile(&messages, registry, &log).await?;

    for notice in log.notices() {
        writeln!(out, "{}", serde_json::to_string(&notice)?)?;
    }
    writeln!(out, "{}", serde_json::to_string_pretty(&reconciled)?)?;
    Ok(())
}

fn run_sanitize(file: &Path, out: &mut impl Write) -> Result<()> {
    let messages = read_conversation(file)?;
    let cleaned = cleanup_messages(&messages);
    tracing::info!(
        before = messages.len(),
        after = cleaned.len(),
        "Sanitized conversation"
    );
    writeln!(out, "{}", serde_json::to_string_pretty(&cleaned)?)?;
    Ok(())
}

fn run_tools(registry: &ToolRegistry, out: &mut impl Write) -> Result<()> {
    for definition in registry.definitions() {
        let kind = if registry.is_confirmable(&definition.name) {
            "confirmable"
        } else {
            "auto"
        };
        writeln!(out, "{:<22} {kind:<12} {}", definition.name, definition.description)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());
    let registry = builtin_registry(&config.tools, &config.authorization)
        .context("failed to build the tool registry")?;
    let mut out = io::stdout().lock();

    let result = match &cli.command {
        Command::Reconcile { file } => run_reconcile(&registry, file, &mut out).await,
        Command::Sanitize { file } => run_sanitize(file, &mut out),
        Command::Tools => run_tools(&registry, &mut out),
    };
    if let Err(e) = &result {
        tracing::error!("Command failed: {e:#}");
    }
    result
}
