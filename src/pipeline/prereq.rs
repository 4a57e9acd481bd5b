//! Prerequisite checks run before any transfer

use super::stage::PrereqResult;
use crate::config::{Config, PrereqConfig};
use crate::fetch::ArchiveFetcher;
use crate::orchestration::ContainerRuntime;
use std::path::Path;
use tracing::{info, warn};

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Run every configured check; failures are collected, never raised
pub async fn check_prerequisites(
    config: &Config,
    runtime: &dyn ContainerRuntime,
    workspace: &Path,
) -> PrereqResult {
    let mut result = PrereqResult::default();
    let prereq = &config.prereq;

    check_runtime(runtime, &config.container.image, prereq, &mut result).await;

    if prereq.check_remote {
        let fetcher = ArchiveFetcher::new(config.remote.base_url.clone(), None);
        let reachable = fetcher.probe().await;
        if !reachable {
            result
                .failures
                .push(format!("remote {} is not reachable", config.remote.base_url));
        }
        result.remote_reachable = Some(reachable);
    }

    check_disk(workspace, prereq.min_free_gb, &mut result);

    if result.passed() {
        info!("All prerequisites satisfied");
    } else {
        for failure in &result.failures {
            warn!("Prerequisite failed: {}", failure);
        }
    }
    result
}

async fn check_runtime(
    runtime: &dyn ContainerRuntime,
    image: &str,
    prereq: &PrereqConfig,
    result: &mut PrereqResult,
) {
    result.runtime_available = runtime.is_available().await.unwrap_or(false);
    if !result.runtime_available {
        result
            .failures
            .push(format!("container runtime '{}' not found", runtime.program()));
        return;
    }
    result.runtime_version = runtime.version().await.ok();

    match runtime.image_exists(image).await {
        Ok(true) => result.image_available = true,
        Ok(false) if prereq.pull_missing_image => match runtime.pull(image).await {
            Ok(()) => {
                result.image_available = true;
                result.image_pulled = true;
            }
            Err(e) => result.failures.push(e.to_string()),
        },
        Ok(false) => result
            .failures
            .push(format!("image {} is not present locally", image)),
        Err(e) => result.failures.push(e.to_string()),
    }
}

fn check_disk(workspace: &Path, min_free_gb: f64, result: &mut PrereqResult) {
    if min_free_gb <= 0.0 {
        result.disk_ok = true;
        return;
    }

    // The workspace may not exist yet; measure the filesystem it will live on
    let probe_dir = workspace
        .ancestors()
        .find(|p| p.exists())
        .unwrap_or(workspace);

    match fs2::available_space(probe_dir) {
        Ok(bytes) => {
            let free = bytes as f64 / GB;
            result.free_space_gb = Some(free);
            result.disk_ok = free >= min_free_gb;
            if !result.disk_ok {
                result.failures.push(format!(
                    "only {:.1}GB free in {}, need {:.1}GB",
                    free,
                    workspace.display(),
                    min_free_gb
                ));
            }
        }
        Err(e) => result.failures.push(format!(
            "cannot read free space of {}: {}",
            workspace.display(),
            e
        )),
    }
}
