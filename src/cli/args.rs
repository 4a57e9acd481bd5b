//! CLI argument definitions using clap derive

use crate::config::Config;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// cachepipe - build cache validation pipeline
///
/// Downloads a split build-cache release, verifies and extracts it, then
/// runs a containerized build against it and scores the cache hit rate.
#[derive(Parser, Debug)]
#[command(name = "cachepipe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CACHEPIPE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline: fetch, verify, extract, build, analyze
    Run(RunArgs),

    /// Check prerequisites only
    Check(CheckArgs),

    /// Time clean and incremental builds against an extracted cache
    Bench(BenchArgs),

    /// Analyze a saved build log
    Analyze(AnalyzeArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Settings shared by commands that touch the workspace and runtime
#[derive(Args, Debug, Default, Clone)]
pub struct OverrideArgs {
    /// Workspace directory holding the extracted caches
    #[arg(short, long, env = "CACHEPIPE_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Container image used for the build
    #[arg(long)]
    pub image: Option<String>,

    /// Release URL the cache objects are fetched from
    #[arg(long)]
    pub base_url: Option<String>,

    /// Container runtime executable (docker or podman)
    #[arg(long)]
    pub runtime: Option<String>,
}

impl OverrideArgs {
    /// Apply the flags that were given on top of `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref workspace) = self.workspace {
            config.workspace.path = workspace.clone();
        }
        if let Some(ref image) = self.image {
            config.container.image = image.clone();
        }
        if let Some(ref url) = self.base_url {
            config.remote.base_url = url.clone();
        }
        if let Some(ref runtime) = self.runtime {
            config.container.runtime = runtime.clone();
        }
    }
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Build target
    #[arg(short, long)]
    pub target: Option<String>,

    /// Write results JSON here instead of a timestamped file
    #[arg(long)]
    pub results: Option<PathBuf>,

    /// Build timeout in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Keep the source archives after extraction
    #[arg(long)]
    pub keep_archives: bool,

    /// Download the split parts concurrently
    #[arg(long)]
    pub concurrent: bool,

    /// Skip the reachability check of the release URL
    #[arg(long)]
    pub offline_check: bool,
}

impl RunArgs {
    pub fn apply(&self, config: &mut Config) {
        self.overrides.apply(config);
        if let Some(ref target) = self.target {
            config.build.target = target.clone();
        }
        if let Some(timeout) = self.timeout {
            config.build.timeout_secs = timeout;
        }
        if self.keep_archives {
            config.workspace.keep_archives = true;
        }
        if self.concurrent {
            config.remote.concurrent_parts = true;
        }
        if self.offline_check {
            config.prereq.check_remote = false;
        }
    }
}

/// Arguments for the bench command
#[derive(Parser, Debug)]
pub struct BenchArgs {
    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Builds per target; the first one is clean, the rest incremental
    #[arg(short = 'n', long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..))]
    pub iterations: u32,

    /// Targets to build [default: the configured build target]
    #[arg(short, long, num_args = 1..)]
    pub targets: Vec<String>,

    /// Write results JSON here instead of a timestamped file
    #[arg(long)]
    pub results: Option<PathBuf>,

    /// Timeout of each build in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,
}

impl BenchArgs {
    pub fn apply(&self, config: &mut Config) {
        self.overrides.apply(config);
        if let Some(timeout) = self.timeout {
            config.build.timeout_secs = timeout;
        }
    }

    /// Targets given on the command line, or the configured one
    pub fn targets(&self, config: &Config) -> Vec<String> {
        if self.targets.is_empty() {
            vec![config.build.target.clone()]
        } else {
            self.targets.clone()
        }
    }
}

/// Arguments for the check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub overrides: OverrideArgs,
}

/// Arguments for the analyze command
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Build log file to parse
    pub log: PathBuf,

    /// Measured build duration, enables scoring
    #[arg(short, long)]
    pub minutes: Option<f64>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,

        /// Answer yes to the overwrite prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}
