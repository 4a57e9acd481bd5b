//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Plain-mode transfer progress is logged every this many bytes
const PLAIN_PROGRESS_STEP: u64 = 10 * 1024 * 1024;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    /// Create a new spinner (shows immediately in interactive mode)
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if self.interactive {
            println!("{} {}", style("✓").green(), message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with warning message
    pub fn stop_warn(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if self.interactive {
            println!("{} {}", style("!").yellow(), message);
        } else {
            println!("{} {}", style("[WARN]").yellow(), message);
        }
    }
}

/// Byte progress for a single remote object.
///
/// Cloneable and `Send` so the blocking transfer thread can drive it.
/// Shows a byte bar when the size is known and a spinner otherwise; in CI
/// it logs every 10 MB instead.
#[derive(Clone)]
pub struct TransferProgress {
    bar: Option<ProgressBar>,
    name: String,
    total: Option<u64>,
}

impl TransferProgress {
    pub fn new(ctx: &UiContext, name: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("  {spinner:.cyan} {prefix}  {bytes:.dim} {bytes_per_sec:.dim}")
                    .unwrap(),
            );
            bar.set_prefix(name.to_string());
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            None
        };
        Self {
            bar,
            name: name.to_string(),
            total: None,
        }
    }

    /// Disabled progress, for library callers without a terminal
    pub fn hidden(name: &str) -> Self {
        Self {
            bar: None,
            name: name.to_string(),
            total: None,
        }
    }

    /// Record the announced content length
    pub fn set_total(&mut self, total: u64) {
        self.total = Some(total);
        if let Some(ref bar) = self.bar {
            bar.set_length(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("  {spinner:.cyan} {prefix}  {bar:20.cyan/dim} {bytes}/{total_bytes} {eta:.dim}")
                    .unwrap()
                    .progress_chars("━╸─"),
            );
        }
    }

    /// Advance to `written` bytes
    pub fn update(&self, previous: u64, written: u64) {
        if let Some(ref bar) = self.bar {
            bar.set_position(written);
            return;
        }
        if previous / PLAIN_PROGRESS_STEP == written / PLAIN_PROGRESS_STEP {
            return;
        }
        match self.total {
            Some(total) if total > 0 => info!(
                "  {}: {:.1}% ({}MB)",
                self.name,
                written as f64 / total as f64 * 100.0,
                written / (1024 * 1024)
            ),
            _ => info!("  {}: {}MB", self.name, written / (1024 * 1024)),
        }
    }

    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

/// Progress bar for the containerized build.
///
/// Parses BitBake `Running task N of M` lines and displays an indicatif
/// bar in interactive mode, or periodic plain text in CI.
pub struct BuildProgress {
    bar: Option<ProgressBar>,
}

impl BuildProgress {
    /// Create a new build progress indicator.
    pub fn new(ctx: &UiContext, label: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("  {spinner:.cyan} Building {prefix}  {bar:20.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}")
                    .unwrap()
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                    .progress_chars("━╸─"),
            );
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            println!("Building {}...", label);
            None
        };
        Self { bar }
    }

    /// Process a build output line. Parses task counters and updates the bar.
    pub fn on_line(&self, line: &str) {
        if let Some((n, total, task)) = parse_task_line(line) {
            if let Some(ref bar) = self.bar {
                bar.set_length(total);
                bar.set_position(n);
                bar.set_message(shorten(task, 50));
            } else if n == total || n % 100 == 0 {
                println!("  task {}/{}", n, total);
            }
        }
    }

    /// Finish and clear the progress bar.
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Parse `NOTE: Running [setscene ]task N of M (<task>)`
fn parse_task_line(line: &str) -> Option<(u64, u64, &str)> {
    let rest = line.trim_start().strip_prefix("NOTE: Running ")?;
    let rest = rest.strip_prefix("setscene ").unwrap_or(rest);
    let rest = rest.strip_prefix("task ")?;
    let (n, rest) = rest.split_once(" of ")?;
    let (total, task) = match rest.split_once(' ') {
        Some((total, task)) => (total, task.trim().trim_start_matches('(').trim_end_matches(')')),
        None => (rest, ""),
    };
    Some((n.parse().ok()?, total.trim().parse().ok()?, task))
}
