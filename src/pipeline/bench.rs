//! Repeated builds against an already extracted cache
//!
//! Each target is built `iterations` times. The first build wipes the
//! build directory's `tmp/`; the rest are incremental and should be served
//! from the shared-state cache, which is what the speedup measures.

use super::context::PipelineContext;
use super::prereq::check_prerequisites;
use crate::analysis::{BuildLogAnalyzer, BuildMetrics, RebuildSpeedup};
use crate::error::{CachePipeError, CachePipeResult};
use crate::orchestration::{BuildRequest, BuildRunner};
use crate::ui::{self, BuildProgress};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

const RULE_WIDTH: usize = 60;

/// One build of a benchmark
#[derive(Debug, Clone, Serialize)]
pub struct BenchBuild {
    /// `<target>_build_<n>_clean` or `<target>_build_<n>_incremental`
    pub name: String,
    pub target: String,
    pub iteration: u32,
    pub clean: bool,
    pub succeeded: bool,
    pub duration_secs: f64,
    pub metrics: Option<BuildMetrics>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub iterations: u32,
    pub targets: Vec<String>,
    pub image: String,
    pub workspace: PathBuf,
    pub builds: Vec<BenchBuild>,
    /// Only targets whose builds all succeeded, with at least one rebuild
    pub speedups: BTreeMap<String, RebuildSpeedup>,
}

impl BenchReport {
    pub fn failed_builds(&self) -> usize {
        self.builds.iter().filter(|b| !b.succeeded).count()
    }

    /// Mean efficiency over the targets that could be compared
    pub fn average_efficiency(&self) -> Option<f64> {
        if self.speedups.is_empty() {
            return None;
        }
        let sum: f64 = self.speedups.values().map(|s| s.efficiency_percent).sum();
        Some(sum / self.speedups.len() as f64)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Err(e) = self.write_to(&mut out) {
            warn!("Benchmark report rendering stopped early: {}", e);
        }
        out
    }

    fn write_to(&self, out: &mut impl Write) -> fmt::Result {
        let rule = "=".repeat(RULE_WIDTH);
        writeln!(out, "{}", rule)?;
        writeln!(out, "BUILD CACHE BENCHMARK REPORT")?;
        writeln!(out, "{}", rule)?;
        writeln!(out, "Date: {}", self.started_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(out, "Targets: {}", self.targets.join(", "))?;
        writeln!(out, "Iterations: {}", self.iterations)?;
        writeln!(out, "Image: {}", self.image)?;
        writeln!(out, "Workspace: {}", self.workspace.display())?;
        writeln!(out)?;

        if !self.speedups.is_empty() {
            writeln!(out, "SPEEDUP")?;
            writeln!(out, "{}", "-".repeat(20))?;
            for (target, s) in &self.speedups {
                writeln!(out, "{}:", target)?;
                writeln!(out, "   Clean build: {:.1} minutes", s.clean_build_secs / 60.0)?;
                writeln!(
                    out,
                    "   Incremental build: {:.1} minutes",
                    s.incremental_build_secs / 60.0
                )?;
                writeln!(out, "   Speedup: {:.1}x", s.speedup_ratio)?;
                writeln!(out, "   Time saved: {:.1} minutes", s.time_saved_secs / 60.0)?;
                writeln!(out, "   Efficiency: {:.1}%", s.efficiency_percent)?;
                writeln!(out, "   Rating: {}", s.rating)?;
            }
            writeln!(out)?;
        }

        writeln!(out, "BUILDS")?;
        writeln!(out, "{}", "-".repeat(20))?;
        for build in &self.builds {
            writeln!(
                out,
                "[{}] {} ({:.1} minutes)",
                if build.succeeded { "PASS" } else { "FAIL" },
                build.name,
                build.duration_secs / 60.0
            )?;
            if let Some(ref m) = build.metrics {
                writeln!(out, "   sstate hit rate: {:.1}%", m.hit_rate_percent)?;
                writeln!(out, "   Task cache rate: {:.1}%", m.task_cache_rate_percent)?;
            }
            if let Some(ref error) = build.error {
                writeln!(out, "   Error: {}", error)?;
            }
        }
        write!(out, "{}", rule)
    }
}

/// Runs the clean and incremental builds of every target in turn
pub struct BenchRunner {
    ctx: PipelineContext,
    runner: BuildRunner,
    targets: Vec<String>,
    iterations: u32,
}

impl BenchRunner {
    pub fn new(ctx: PipelineContext, targets: Vec<String>, iterations: u32) -> Self {
        let runner = BuildRunner::new(ctx.runtime.clone());
        Self {
            ctx,
            runner,
            targets,
            iterations: iterations.max(1),
        }
    }

    /// Build every target. Failed builds are recorded and the run goes on;
    /// only a failed prerequisite or Ctrl-C ends it early.
    pub async fn run(self) -> CachePipeResult<BenchReport> {
        let ctx = &self.ctx;
        let started_at = Local::now();
        ctx.layout.create().await?;

        // The caches are already local; the release URL is not needed
        let mut config = ctx.config.clone();
        config.prereq.check_remote = false;
        let prereq = check_prerequisites(&config, ctx.runtime.as_ref(), ctx.layout.root()).await;
        if !prereq.passed() {
            return Err(CachePipeError::Prerequisite(prereq.failures.join("; ")));
        }

        let base = BuildRequest::from_config(
            &ctx.config.container,
            &ctx.config.build,
            ctx.probe.volume_path(ctx.layout.downloads_dir()),
            ctx.probe.volume_path(ctx.layout.sstate_dir()),
            ctx.container_name.clone(),
        );

        let mut builds = Vec::new();
        let mut speedups = BTreeMap::new();
        let mut sequence = 0;
        for target in &self.targets {
            ui::section(&ctx.ui, &format!("Benchmark {}", target));
            let mut durations = Vec::new();
            let mut all_succeeded = true;

            for iteration in 1..=self.iterations {
                sequence += 1;
                let clean = iteration == 1;
                let request = base
                    .for_target(target, format!("{}-{}", ctx.container_name, sequence))
                    .with_clean_tmp(clean);
                let build = self.build_once(&request, iteration).await?;
                all_succeeded &= build.succeeded;
                durations.push(build.duration_secs);
                builds.push(build);
            }

            if !all_succeeded {
                warn!("Skipping speedup for {}: not every build succeeded", target);
                continue;
            }
            if let Some(speedup) = RebuildSpeedup::compare(durations[0], &durations[1..]) {
                info!(
                    "{}: rebuild {:.1}x faster, {:.1}% of the clean build time saved ({})",
                    target, speedup.speedup_ratio, speedup.efficiency_percent, speedup.rating
                );
                speedups.insert(target.clone(), speedup);
            }
        }

        Ok(BenchReport {
            started_at,
            finished_at: Local::now(),
            iterations: self.iterations,
            targets: self.targets.clone(),
            image: ctx.config.container.image.clone(),
            workspace: ctx.layout.root().to_path_buf(),
            builds,
            speedups,
        })
    }

    async fn build_once(&self, request: &BuildRequest, iteration: u32) -> CachePipeResult<BenchBuild> {
        let ui_ctx = &self.ctx.ui;
        let kind = if request.clean_tmp { "clean" } else { "incremental" };
        let name = format!("{}_build_{}_{}", request.target, iteration, kind);
        info!("Starting {}", name);

        let started = Instant::now();
        let progress = BuildProgress::new(ui_ctx, &request.target);
        let on_line = |line: &str| {
            debug!(target: "cachepipe::build", "{}", line);
            progress.on_line(line);
        };
        let outcome = tokio::select! {
            result = self.runner.run(request, &on_line) => Some(result),
            Ok(()) = tokio::signal::ctrl_c() => None,
        };
        progress.finish();

        let Some(result) = outcome else {
            warn!("Interrupted during {}, removing container", name);
            self.runner.remove(&request.container_name).await;
            return Err(CachePipeError::Interrupted);
        };

        let build = match result {
            Ok(output) => {
                let secs = output.duration.as_secs_f64();
                ui::step_ok_detail(ui_ctx, &format!("{} passed", name), &format!("{:.1}s", secs));
                BenchBuild {
                    name,
                    target: request.target.clone(),
                    iteration,
                    clean: request.clean_tmp,
                    succeeded: true,
                    duration_secs: secs,
                    metrics: Some(BuildLogAnalyzer::parse(&output.log())),
                    error: None,
                }
            }
            Err(e) => {
                let secs = match e {
                    CachePipeError::BuildTimeout { .. } => request.timeout.as_secs_f64(),
                    _ => started.elapsed().as_secs_f64(),
                };
                ui::step_error_detail(ui_ctx, &format!("{} failed", name), &e.to_string());
                BenchBuild {
                    name,
                    target: request.target.clone(),
                    iteration,
                    clean: request.clean_tmp,
                    succeeded: false,
                    duration_secs: secs,
                    metrics: None,
                    error: Some(e.to_string()),
                }
            }
        };
        Ok(build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::EfficiencyRating;
    use crate::config::Config;
    use crate::ui::UiContext;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    /// Clean builds (the ones wiping tmp/) are slow, rebuilds are instant
    const CACHED_REBUILDS: &str = "case \"$1\" in\n\
         run)\n\
           case \"$*\" in *'rm -rf'*) sleep 1 ;; esac\n\
           echo 'Sstate summary: Wanted 100 Found 90 Missed 10 Current 0'\n\
           echo \"NOTE: Tasks Summary: Attempted 20 tasks of which 18 didn't need to be rerun and all succeeded.\"\n\
           ;;\n\
         *) echo 'Docker version 27.0.1' ;;\n\
         esac\n";

    fn config(temp: &Path, runtime_body: &str) -> Config {
        let script = temp.join("fake-docker");
        std::fs::write(&script, format!("#!/bin/sh\n{}", runtime_body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = Config::default();
        config.workspace.path = temp.join("workspace");
        config.container.runtime = script.display().to_string();
        config.prereq.min_free_gb = 0.0;
        config.build.timeout_secs = 30;
        config
    }

    async fn bench(config: Config, targets: &[&str], iterations: u32) -> CachePipeResult<BenchReport> {
        let ctx = PipelineContext::new(config, UiContext::non_interactive()).unwrap();
        let targets = targets.iter().map(|t| t.to_string()).collect();
        BenchRunner::new(ctx, targets, iterations).run().await
    }

    #[tokio::test]
    async fn cached_rebuild_is_rated_by_time_saved() {
        let temp = TempDir::new().unwrap();
        let report = bench(config(temp.path(), CACHED_REBUILDS), &["core-image-minimal"], 2)
            .await
            .unwrap();

        assert_eq!(report.builds.len(), 2);
        assert_eq!(report.builds[0].name, "core-image-minimal_build_1_clean");
        assert!(report.builds[0].clean);
        assert_eq!(report.builds[1].name, "core-image-minimal_build_2_incremental");
        assert!(!report.builds[1].clean);
        assert_eq!(report.failed_builds(), 0);

        let metrics = report.builds[1].metrics.as_ref().unwrap();
        assert_eq!(metrics.hit_rate_percent, 90.0);

        let speedup = &report.speedups["core-image-minimal"];
        assert!(speedup.clean_build_secs >= 1.0);
        assert!(speedup.speedup_ratio > 1.0);
        assert!(speedup.efficiency_percent > 50.0);
        assert_ne!(speedup.rating, EfficiencyRating::NeedsWork);
        assert!(report.average_efficiency().is_some());

        let text = report.render();
        assert!(text.contains("BUILD CACHE BENCHMARK REPORT"));
        assert!(text.contains("Iterations: 2"));
        assert!(text.contains("[PASS] core-image-minimal_build_2_incremental"));
        assert!(text.contains("sstate hit rate: 90.0%"));
        assert!(text.contains("Speedup: "));
    }

    #[tokio::test]
    async fn failed_builds_are_recorded_without_speedup() {
        let temp = TempDir::new().unwrap();
        let body = "case \"$1\" in\n\
             run) echo 'ERROR: Task do_compile failed'; exit 1 ;;\n\
             *) echo 'Docker version 27.0.1' ;;\n\
             esac\n";

        let report = bench(config(temp.path(), body), &["core-image-minimal"], 2)
            .await
            .unwrap();

        assert_eq!(report.failed_builds(), 2);
        assert!(report.speedups.is_empty());
        assert!(report.average_efficiency().is_none());
        let error = report.builds[0].error.as_deref().unwrap();
        assert!(error.contains("exit code 1"));
        assert!(report.render().contains("[FAIL] core-image-minimal_build_1_clean"));
    }

    #[tokio::test]
    async fn single_iteration_builds_each_target_once() {
        let temp = TempDir::new().unwrap();
        let report = bench(
            config(temp.path(), CACHED_REBUILDS),
            &["core-image-minimal", "core-image-base"],
            1,
        )
        .await
        .unwrap();

        let names: Vec<&str> = report.builds.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(
            names,
            ["core-image-minimal_build_1_clean", "core-image-base_build_1_clean"]
        );
        assert!(report.speedups.is_empty());
    }

    #[tokio::test]
    async fn missing_runtime_fails_before_building() {
        let temp = TempDir::new().unwrap();
        let mut config = config(temp.path(), CACHED_REBUILDS);
        config.container.runtime = "/nonexistent/docker".to_string();

        let err = bench(config, &["core-image-minimal"], 2).await.unwrap_err();
        assert!(matches!(err, CachePipeError::Prerequisite(_)));
    }
}
