//! Run command - execute the full validation pipeline

use crate::cli::args::RunArgs;
use crate::config::Config;
use crate::error::{CachePipeError, CachePipeResult};
use crate::pipeline::{PipelineContext, PipelineOrchestrator};
use crate::ui::{self, UiContext};
use tracing::debug;

/// Execute the run command
pub async fn execute(args: RunArgs, config: &Config) -> CachePipeResult<()> {
    let ctx = UiContext::detect();
    let mut config = config.clone();
    args.apply(&mut config);
    debug!("Effective configuration: {:?}", config);

    ui::intro(&ctx, "cachepipe run");
    ui::key_value(&ctx, "Workspace", &config.workspace.path.display().to_string());
    ui::key_value(&ctx, "Image", &config.container.image);
    ui::key_value(&ctx, "Target", &config.build.target);
    ui::key_value(&ctx, "Release", &config.remote.base_url);

    let pipeline_ctx = PipelineContext::new(config, ctx.clone())?.with_results_path(args.results);
    let outcome = PipelineOrchestrator::new(pipeline_ctx).run().await;

    println!();
    println!("{}", outcome.report);

    if let Some(ref path) = outcome.results_file {
        ui::step_info(&ctx, &format!("Results saved to {}", path.display()));
    }

    if outcome.succeeded() {
        ui::outro_success(&ctx, "Build cache validated");
        return Ok(());
    }

    let stage = outcome
        .failed_stage()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    ui::outro_error(&ctx, &format!("Pipeline stopped at stage {}", stage));

    Err(outcome.error.unwrap_or_else(|| {
        CachePipeError::Internal(format!("pipeline stopped at stage {} without an error", stage))
    }))
}
