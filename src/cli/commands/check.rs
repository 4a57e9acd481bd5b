//! Check command - verify prerequisites without touching the cache

use crate::cli::args::CheckArgs;
use crate::config::Config;
use crate::error::{CachePipeError, CachePipeResult};
use crate::orchestration::{CliRuntime, ContainerRuntime};
use crate::pipeline::check_prerequisites;
use crate::platform::PlatformProbe;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the check command
pub async fn execute(args: CheckArgs, config: &Config) -> CachePipeResult<()> {
    let ctx = UiContext::detect();
    let mut config = config.clone();
    args.overrides.apply(&mut config);

    ui::intro(&ctx, "cachepipe check");

    let probe = PlatformProbe::detect();
    ui::key_value(&ctx, "Platform", probe.platform().name());

    let runtime = CliRuntime::new(config.container.runtime.clone());
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Checking prerequisites...");
    let result = check_prerequisites(&config, &runtime, &config.workspace.path).await;
    if result.passed() {
        spinner.stop("Checks complete");
    } else {
        spinner.stop_warn(&format!("{} check(s) failed", result.failures.len()));
    }

    ui::key_value_status(
        &ctx,
        runtime.program(),
        result.runtime_version.as_deref().unwrap_or("not found"),
        result.runtime_available,
    );
    ui::key_value_status(
        &ctx,
        "Image",
        &image_status(&config.container.image, result.image_available, result.image_pulled),
        result.image_available,
    );
    if let Some(reachable) = result.remote_reachable {
        let status = if reachable { "reachable" } else { "unreachable" };
        ui::key_value_status(&ctx, "Release", status, reachable);
    }
    match result.free_space_gb {
        Some(free) => ui::key_value_status(
            &ctx,
            "Disk",
            &format!("{:.1}GB free (need {:.1}GB)", free, config.prereq.min_free_gb),
            result.disk_ok,
        ),
        None if config.prereq.min_free_gb <= 0.0 => ui::key_value(&ctx, "Disk", "not checked"),
        None => ui::key_value_status(&ctx, "Disk", "unknown", false),
    }

    if result.passed() {
        ui::outro_success(&ctx, "All prerequisites satisfied");
        Ok(())
    } else {
        ui::outro_error(&ctx, "Prerequisites not met");
        Err(CachePipeError::Prerequisite(result.failures.join("; ")))
    }
}

fn image_status(image: &str, available: bool, pulled: bool) -> String {
    match (available, pulled) {
        (true, true) => format!("{} (pulled)", image),
        (true, false) => image.to_string(),
        (false, _) => format!("{} missing", image),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_status_text() {
        assert_eq!(image_status("poky:5.0", true, false), "poky:5.0");
        assert_eq!(image_status("poky:5.0", true, true), "poky:5.0 (pulled)");
        assert_eq!(image_status("poky:5.0", false, false), "poky:5.0 missing");
    }
}
