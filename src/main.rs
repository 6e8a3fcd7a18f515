//! cachelock - shared artifact cache maintenance
//!
//! CLI entry point that dispatches to subcommands.

use cachelock::cli::commands::{self, CommandContext};
use cachelock::cli::{Cli, Commands};
use cachelock::config::ConfigManager;
use cachelock::error::CacheResult;
use clap::{CommandFactory, Parser};
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit status for lock contention (EX_TEMPFAIL); callers may retry
const EXIT_TEMPFAIL: u8 = 75;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            if e.is_retryable() {
                ExitCode::from(EXIT_TEMPFAIL)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run() -> CacheResult<()> {
    let cli = Cli::parse();

    // Completions need neither config nor logging
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "cachelock", &mut std::io::stdout());
        return Ok(());
    }

    let manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = manager.load().await?;

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("cachelock=warn"),
        1 => EnvFilter::new("cachelock=info"),
        _ => EnvFilter::new("cachelock=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .without_time()
            .init();
    }

    debug!("Loaded configuration from {}", manager.path().display());
    let ctx = CommandContext::new(&config, cli.root);

    match cli.command {
        Commands::Completions { .. } => unreachable!("Completions handled above"),
        Commands::Init(args) => commands::init(args, &ctx).await,
        Commands::Evict(args) => commands::evict(args, &ctx).await,
        Commands::Cat(args) => commands::cat(args, &ctx).await,
        Commands::Put(args) => commands::put(args, &ctx).await,
        Commands::Touch(args) => commands::touch(args, &ctx).await,
        Commands::Rm(args) => commands::rm(args, &ctx).await,
        Commands::Status(args) => commands::status(args, &ctx).await,
        Commands::Config(args) => commands::config(args, &config, &manager).await,
    }
}
