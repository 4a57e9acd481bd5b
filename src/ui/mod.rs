//! Terminal output for pipeline runs
//!
//! Uses `cliclack` for step and section output and `indicatif` for
//! transfer and build progress, with automatic fallback to plain output
//! in CI/non-interactive environments.
//!
//! # Example
//!
//! ```rust,ignore
//! use cachepipe::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//!
//! ui::intro(&ctx, "cachepipe check");
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Checking prerequisites...");
//! // ... do work ...
//! spinner.stop("All prerequisites satisfied");
//!
//! ui::key_value_status(&ctx, "docker", "Docker version 27.0.1", true);
//! ui::outro_success(&ctx, "Ready to run");
//! ```

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::{UiContext, PLAIN_ENV};
pub use output::{
    intro, key_value, key_value_status, outro_error, outro_success, section, step_error_detail,
    step_info, step_ok_detail, step_warn, step_warn_hint,
};
pub use progress::{BuildProgress, TaskSpinner, TransferProgress};
pub use prompts::confirm;
pub use theme::{init_theme, PipelineTheme};
