//! cachepipe - build cache validation pipeline
//!
//! CLI entry point that dispatches to subcommands.

use cachepipe::cli::{Cli, Commands};
use cachepipe::config::ConfigManager;
use cachepipe::error::CachePipeResult;
use cachepipe::ui;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(tail) = e.output_tail() {
                eprintln!("{}", style("Last build output:").dim());
                for line in tail.lines() {
                    eprintln!("  {}", line);
                }
            }
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CachePipeResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config.general.log_format);
    ui::init_theme();
    debug!("Loaded configuration from {}", config_manager.path().display());

    match cli.command {
        Commands::Run(args) => cachepipe::cli::commands::run(args, &config).await,
        Commands::Check(args) => cachepipe::cli::commands::check(args, &config).await,
        Commands::Bench(args) => cachepipe::cli::commands::bench(args, &config).await,
        Commands::Analyze(args) => cachepipe::cli::commands::analyze(args, &config).await,
        Commands::Config(args) => {
            cachepipe::cli::commands::config(args, &config_manager, &config).await
        }
    }
}

/// 0 = warn (progress only), 1 = info, 2+ = debug. RUST_LOG wins when set.
fn init_logging(verbose: u8, format: &str) {
    let level = match verbose {
        0 => "cachepipe=warn",
        1 => "cachepipe=info",
        _ => "cachepipe=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
}
