//! A minimal demo binary driving `kadabra_lsp`'s façade against a real
//! language server, for manual smoke-testing. Opens a file, prints its
//! document symbols, and exits.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use kadabra_lsp::config::{Config, Language};
use kadabra_lsp::facade::SyncSession;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Drives a language server session against a workspace and prints the
/// document symbols of one file.
#[derive(Parser, Debug)]
#[command(name = "kadabra-lsp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workspace root directory to analyze.
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// File within the workspace to print document symbols for.
    #[arg(short, long)]
    file: PathBuf,

    /// Language server command to use.
    #[arg(short, long, default_value = "rust-analyzer")]
    language_server: String,

    /// Arguments to pass to the language server.
    #[arg(long)]
    language_server_args: Vec<String>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn parse_log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            other => anyhow::bail!("invalid log level: {}", other),
        }
    }
}

fn init_tracing(level: Level) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kadabra_lsp={level},async_lsp={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.parse_log_level()?)?;

    let workspace = args
        .workspace
        .canonicalize()
        .context(format!("failed to canonicalize workspace path: {}", args.workspace.display()))?;

    info!(
        workspace = %workspace.display(),
        language_server = %args.language_server,
        "starting session"
    );

    let mut config = Config::new(Language::Rust, &workspace, &args.language_server);
    config.server_args = args.language_server_args;

    SyncSession::with_server(config, |session| {
        let (symbols, _tree) = session.document_symbols(args.file.clone())?;
        for sym in &symbols {
            println!("{:?} {} @ {:?}", sym.kind, sym.name, sym.location.range);
        }
        Ok(())
    })
    .context("documentSymbols request failed")?;

    info!("session stopped");
    Ok(())
}
