//! Sequencing of the pipeline stages
//!
//! Stages run strictly in order and the first fatal error stops the run.
//! Whatever happened, the run ends with cleanup, a rendered report and a
//! persisted results file.

use super::context::PipelineContext;
use super::prereq::check_prerequisites;
use super::report::{persist_results, render_report};
use super::stage::{
    BuildResult, DownloadResult, DownloadedObject, ExtractionResult, IntegrityResult,
    PerformanceResult, PipelineState, StageDetail, StageLedger, StageName, StageResult,
};
use crate::analysis::{BuildLogAnalyzer, PerformanceScorer};
use crate::archive::{cache_stats, ArchiveAssembler, ArchiveCheck, CacheExtractor};
use crate::error::{CachePipeError, CachePipeResult};
use crate::fetch::{ArchiveFetcher, FetchedObject};
use crate::orchestration::{BuildOutput, BuildRequest, BuildRunner};
use crate::ui::{self, BuildProgress, TransferProgress};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const MB: f64 = 1024.0 * 1024.0;

/// Warnings and metrics a stage produced, kept even when it fails
#[derive(Default)]
struct StageScratch {
    warnings: Vec<String>,
    detail: Option<StageDetail>,
}

/// What a run produced
#[derive(Debug)]
pub struct PipelineOutcome {
    pub state: PipelineState,
    pub ledger: StageLedger,
    pub report: String,
    /// Results file, if it could be written
    pub results_file: Option<PathBuf>,
    /// The error that stopped the run
    pub error: Option<CachePipeError>,
}

impl PipelineOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Done && self.ledger.all_mandatory_passed()
    }

    /// Stage that stopped the run
    pub fn failed_stage(&self) -> Option<StageName> {
        match self.state {
            PipelineState::Failed(stage) => Some(stage),
            _ => None,
        }
    }
}

pub struct PipelineOrchestrator {
    ctx: PipelineContext,
    fetcher: ArchiveFetcher,
    extractor: CacheExtractor,
    runner: BuildRunner,
    build_started: bool,
    build_output: Option<BuildOutput>,
}

impl PipelineOrchestrator {
    pub fn new(ctx: PipelineContext) -> Self {
        let remote = &ctx.config.remote;
        let timeout = (remote.timeout_secs > 0).then(|| Duration::from_secs(remote.timeout_secs));
        let fetcher = ArchiveFetcher::new(remote.base_url.clone(), timeout)
            .with_checksums(remote.checksums.clone());
        let extractor = CacheExtractor::new(ctx.probe, ctx.config.tools.tar.as_deref());
        let runner = BuildRunner::new(ctx.runtime.clone());

        Self {
            ctx,
            fetcher,
            extractor,
            runner,
            build_started: false,
            build_output: None,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Run every stage, then report. Never fails; see `PipelineOutcome`.
    pub async fn run(mut self) -> PipelineOutcome {
        info!(
            "Validating build cache from {} in {}",
            self.fetcher.base_url(),
            self.ctx.layout.root().display()
        );

        let mut failure = None;
        for stage in StageName::MANDATORY {
            self.ctx.state = PipelineState::running(stage);
            if let Err(e) = self.run_stage(stage).await {
                error!("Stage {} failed: {}", stage, e);
                self.ctx.state = PipelineState::Failed(stage);
                failure = Some(e);
                break;
            }
        }

        if failure.is_none() {
            self.ctx.state = PipelineState::Analyze;
            if let Err(e) = self.run_stage(StageName::Analyze).await {
                warn!("Analysis failed, metrics unavailable: {}", e);
            }
        } else {
            self.cleanup().await;
        }

        if !self.ctx.state.is_terminal() {
            self.ctx.state = PipelineState::Report;
        }
        let report = render_report(&self.ctx.ledger, self.ctx.started_at, self.ctx.layout.root());

        let path = self.ctx.results_file();
        let results_file = match persist_results(&self.ctx.ledger, &path).await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Could not save results: {}", e);
                None
            }
        };

        if self.ctx.state == PipelineState::Report {
            self.ctx.state = PipelineState::Done;
        }

        PipelineOutcome {
            state: self.ctx.state,
            ledger: self.ctx.ledger,
            report,
            results_file,
            error: failure,
        }
    }

    /// Execute one stage, racing it against Ctrl-C, and record its result
    async fn run_stage(&mut self, stage: StageName) -> CachePipeResult<()> {
        ui::section(&self.ctx.ui, stage.title());
        let started = Instant::now();
        let mut scratch = StageScratch::default();

        let result = {
            let work = self.execute(stage, &mut scratch);
            tokio::select! {
                result = work => result,
                Ok(()) = tokio::signal::ctrl_c() => Err(CachePipeError::Interrupted),
            }
        };

        let elapsed = started.elapsed();
        for warning in &scratch.warnings {
            ui::step_warn(&self.ctx.ui, warning);
        }
        match result {
            Ok(()) => ui::step_ok_detail(
                &self.ctx.ui,
                &format!("{} passed", stage),
                &format!("{:.1}s", elapsed.as_secs_f64()),
            ),
            Err(ref e) => ui::step_error_detail(&self.ctx.ui, &format!("{} failed", stage), &e.to_string()),
        }

        let record = match result {
            Ok(()) => StageResult::success(elapsed, scratch.detail),
            Err(ref e) => StageResult::failure(elapsed, e, scratch.detail),
        }
        .with_warnings(scratch.warnings);
        self.ctx.ledger.record(stage, record)?;

        result
    }

    async fn execute(&mut self, stage: StageName, scratch: &mut StageScratch) -> CachePipeResult<()> {
        match stage {
            StageName::Prereq => self.prereq(scratch).await,
            StageName::Fetch => self.fetch(scratch).await,
            StageName::Verify => self.verify(scratch).await,
            StageName::Extract => self.extract(scratch).await,
            StageName::Build => self.build(scratch).await,
            StageName::Analyze => self.analyze(scratch),
        }
    }

    async fn prereq(&mut self, scratch: &mut StageScratch) -> CachePipeResult<()> {
        let layout = &self.ctx.layout;
        layout.create().await?;
        let removed = layout.clean_transient().await?;
        if removed > 0 {
            info!("Removed {} stale file(s) from the workspace", removed);
        }

        let result =
            check_prerequisites(&self.ctx.config, self.ctx.runtime.as_ref(), layout.root()).await;
        let failures = result.failures.join("; ");
        let passed = result.passed();
        scratch.detail = Some(StageDetail::Prereq(result));

        if passed {
            Ok(())
        } else {
            Err(CachePipeError::Prerequisite(failures))
        }
    }

    async fn fetch(&mut self, scratch: &mut StageScratch) -> CachePipeResult<()> {
        let mut fetched = Vec::new();
        let result = self.fetch_all(&mut fetched, scratch).await;

        let total: u64 = fetched.iter().map(|o| o.bytes).sum();
        scratch.detail = Some(StageDetail::Download(DownloadResult {
            files_downloaded: fetched.len(),
            total_mb: total as f64 / MB,
            objects: fetched
                .into_iter()
                .map(|o| DownloadedObject {
                    name: o.name,
                    bytes: o.bytes,
                    sha256: o.sha256,
                })
                .collect(),
        }));
        result
    }

    async fn fetch_all(
        &self,
        fetched: &mut Vec<FetchedObject>,
        scratch: &mut StageScratch,
    ) -> CachePipeResult<()> {
        let dir = self.ctx.layout.root();
        let files = &self.ctx.files;

        if self.ctx.config.remote.concurrent_parts {
            debug!("Fetching {} parts concurrently", files.downloads_parts().len());
            let transfers = files
                .downloads_parts()
                .iter()
                .map(|name| self.fetcher.fetch(name, dir, TransferProgress::hidden(name)));
            let mut first_error = None;
            for result in futures_util::future::join_all(transfers).await {
                match result {
                    Ok(object) => fetched.push(object),
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }
        } else {
            for name in files.downloads_parts() {
                let progress = TransferProgress::new(&self.ctx.ui, name);
                fetched.push(self.fetcher.fetch(name, dir, progress).await?);
            }
        }

        let sstate = files.sstate();
        let progress = TransferProgress::new(&self.ctx.ui, sstate);
        fetched.push(self.fetcher.fetch(sstate, dir, progress).await?);

        if let Some(info_name) = files.info() {
            let progress = TransferProgress::new(&self.ctx.ui, info_name);
            match self.fetcher.fetch(info_name, dir, progress).await {
                Ok(object) => fetched.push(object),
                Err(e) if !e.is_fatal() => {
                    warn!("Optional object {} not fetched: {}", info_name, e);
                    scratch
                        .warnings
                        .push(format!("optional {} not fetched: {}", info_name, e));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn verify(&mut self, scratch: &mut StageScratch) -> CachePipeResult<()> {
        let layout = &self.ctx.layout;
        let parts: Vec<PathBuf> = self
            .ctx
            .files
            .downloads_parts()
            .iter()
            .map(|name| layout.object_path(name))
            .collect();
        let downloads = layout.reassembled_archive();
        ArchiveAssembler::reassemble(&parts, &downloads).await?;

        let sstate = layout.object_path(self.ctx.files.sstate());
        let downloads_check = ArchiveAssembler::verify_archive(&downloads).await;
        let sstate_check = if sstate.exists() {
            ArchiveAssembler::verify_archive(&sstate).await
        } else {
            warn!("Build-state archive {} is missing", sstate.display());
            ArchiveCheck {
                ok: false,
                entries: 0,
            }
        };

        let downloads_mb = file_size(&downloads).await as f64 / MB;
        let sstate_mb = file_size(&sstate).await as f64 / MB;
        scratch.detail = Some(StageDetail::Integrity(IntegrityResult {
            downloads_size_mb: downloads_mb,
            sstate_size_mb: sstate_mb,
            total_size_gb: (downloads_mb + sstate_mb) / 1024.0,
            downloads_archive: downloads_check,
            sstate_archive: sstate_check,
        }));

        for (path, check) in [(downloads, downloads_check), (sstate, sstate_check)] {
            if !check.ok {
                return Err(CachePipeError::CorruptArchive {
                    path,
                    entries: (check.entries > 0).then_some(check.entries),
                });
            }
        }
        Ok(())
    }

    async fn extract(&mut self, scratch: &mut StageScratch) -> CachePipeResult<()> {
        let layout = &self.ctx.layout;
        let keep = self.ctx.config.workspace.keep_archives;
        let started = Instant::now();

        let downloads = layout.reassembled_archive();
        let sstate = layout.object_path(self.ctx.files.sstate());
        for archive in [&downloads, &sstate] {
            self.extractor
                .extract_and_remove(archive, layout.root(), keep)
                .await?;
        }

        let warnings = self
            .extractor
            .normalize_permissions(&[layout.downloads_dir(), layout.sstate_dir()])
            .await;
        scratch.warnings.extend(warnings);

        let stats = cache_stats(layout).await?;
        info!(
            "Extracted {} download files and {} sstate files",
            stats.downloads_files, stats.sstate_files
        );
        scratch.detail = Some(StageDetail::Extraction(ExtractionResult {
            extraction_secs: started.elapsed().as_secs_f64(),
            archives_removed: !keep,
            stats,
        }));
        Ok(())
    }

    async fn build(&mut self, scratch: &mut StageScratch) -> CachePipeResult<()> {
        let ctx = &self.ctx;
        let request = BuildRequest::from_config(
            &ctx.config.container,
            &ctx.config.build,
            ctx.probe.volume_path(ctx.layout.downloads_dir()),
            ctx.probe.volume_path(ctx.layout.sstate_dir()),
            ctx.container_name.clone(),
        );

        self.build_started = true;
        let progress = BuildProgress::new(&ctx.ui, &request.target);
        let result = self
            .runner
            .run(&request, &|line| {
                debug!(target: "cachepipe::build", "{}", line);
                progress.on_line(line);
            })
            .await;
        progress.finish();

        let mut detail = BuildResult {
            target: request.target.clone(),
            container: request.container_name.clone(),
            exit_code: None,
            duration_minutes: 0.0,
            output_lines: 0,
            tail: None,
        };

        let result = match result {
            Ok(output) => {
                detail.exit_code = Some(output.exit_code);
                detail.duration_minutes = minutes(output.duration);
                detail.output_lines = output.lines.len();
                self.build_output = Some(output);
                Ok(())
            }
            Err(CachePipeError::BuildFailure { target, code, tail }) => {
                detail.exit_code = Some(code);
                detail.tail = Some(tail.clone());
                Err(CachePipeError::BuildFailure { target, code, tail })
            }
            Err(e @ CachePipeError::BuildTimeout { .. }) => {
                detail.duration_minutes = minutes(request.timeout);
                Err(e)
            }
            Err(e) => Err(e),
        };
        scratch.detail = Some(StageDetail::Build(detail));
        result
    }

    fn analyze(&mut self, scratch: &mut StageScratch) -> CachePipeResult<()> {
        let output = self
            .build_output
            .as_ref()
            .ok_or_else(|| CachePipeError::Internal("no build output to analyze".to_string()))?;

        let analysis = BuildLogAnalyzer::analyze(&output.log());
        let verdict = PerformanceScorer::score(
            minutes(output.duration),
            &analysis.metrics,
            &self.ctx.config.targets,
        );
        info!(
            "Cache hit rate {:.1}% ({}), build took {:.1} minutes",
            verdict.hit_rate_percent, verdict.effectiveness, verdict.measured_minutes
        );

        scratch
            .warnings
            .extend(analysis.gaps.iter().map(|gap| gap.describe().to_string()));
        scratch.detail = Some(StageDetail::Performance(PerformanceResult {
            metrics: analysis.metrics,
            gaps: analysis.gaps,
            verdict,
        }));
        Ok(())
    }

    /// Best-effort teardown after a failed or interrupted run
    async fn cleanup(&mut self) {
        if self.build_started {
            info!("Removing build container {}", self.ctx.container_name);
            self.runner.remove(&self.ctx.container_name).await;
        }
    }
}

fn minutes(duration: Duration) -> f64 {
    duration.as_secs_f64() / 60.0
}

async fn file_size(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}
