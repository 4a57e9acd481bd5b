//! Bench command - clean versus incremental builds on an extracted cache

use crate::cli::args::BenchArgs;
use crate::config::Config;
use crate::error::{CachePipeError, CachePipeResult};
use crate::pipeline::{persist_results, BenchRunner, PipelineContext};
use crate::ui::{self, UiContext};
use tracing::debug;

/// Execute the bench command
pub async fn execute(args: BenchArgs, config: &Config) -> CachePipeResult<()> {
    let ctx = UiContext::detect();
    let mut config = config.clone();
    args.apply(&mut config);
    let targets = args.targets(&config);
    debug!("Effective configuration: {:?}", config);

    ui::intro(&ctx, "cachepipe bench");
    ui::key_value(&ctx, "Workspace", &config.workspace.path.display().to_string());
    ui::key_value(&ctx, "Image", &config.container.image);
    ui::key_value(&ctx, "Targets", &targets.join(", "));
    ui::key_value(&ctx, "Iterations", &args.iterations.to_string());

    let pipeline_ctx = PipelineContext::new(config, ctx.clone())?.with_results_path(args.results);
    let results = pipeline_ctx.results_file_named("cache_bench_results");
    let report = BenchRunner::new(pipeline_ctx, targets, args.iterations)
        .run()
        .await?;

    println!();
    println!("{}", report.render());

    match persist_results(&report, &results).await {
        Ok(()) => ui::step_info(&ctx, &format!("Results saved to {}", results.display())),
        Err(e) => ui::step_warn(&ctx, &format!("Could not save results: {}", e)),
    }

    match report.average_efficiency() {
        Some(avg) if avg >= 80.0 => ui::step_info(&ctx, "The cache is highly effective"),
        Some(avg) if avg >= 60.0 => ui::step_info(&ctx, "The cache is working well"),
        Some(avg) => ui::step_warn(
            &ctx,
            &format!("Rebuilds save only {:.1}% of the clean build time; check the cache setup", avg),
        ),
        None => {}
    }

    let failed = report.failed_builds();
    if failed > 0 {
        ui::outro_error(&ctx, &format!("{} build(s) failed", failed));
        return Err(CachePipeError::BenchmarkFailed {
            failed,
            total: report.builds.len(),
        });
    }

    ui::outro_success(&ctx, "Benchmark complete");
    Ok(())
}
