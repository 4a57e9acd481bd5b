//! Plain-text report rendering and JSON persistence

use super::stage::{PerformanceResult, StageDetail, StageLedger, StageName, StageResult};
use crate::error::{CachePipeError, CachePipeResult};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt::{self, Write};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

const RULE_WIDTH: usize = 60;

/// Render the operator-facing report for a finished or aborted run
pub fn render_report(ledger: &StageLedger, started_at: DateTime<Local>, workspace: &Path) -> String {
    let mut out = String::new();
    if let Err(e) = write_report(&mut out, ledger, started_at, workspace) {
        warn!("Report rendering stopped early: {}", e);
    }
    out
}

fn write_report(
    out: &mut impl Write,
    ledger: &StageLedger,
    started_at: DateTime<Local>,
    workspace: &Path,
) -> fmt::Result {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out, "{}", rule)?;
    writeln!(out, "BUILD CACHE VALIDATION REPORT")?;
    writeln!(out, "{}", rule)?;
    writeln!(out, "Date: {}", started_at.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "Workspace: {}", workspace.display())?;
    writeln!(out)?;

    for stage in StageName::MANDATORY {
        write_heading(out, stage.title())?;
        match ledger.get(stage) {
            Some(result) => write_stage(out, result)?,
            None => writeln!(out, "SKIPPED")?,
        }
        writeln!(out)?;
    }

    if let Some(perf) = ledger.performance() {
        write_performance(out, perf)?;
    }

    let warnings: Vec<_> = ledger.warnings().collect();
    if !warnings.is_empty() {
        write_heading(out, "WARNINGS")?;
        for (stage, warning) in warnings {
            writeln!(out, "   [{}] {}", stage, warning)?;
        }
        writeln!(out)?;
    }

    let passed = ledger.mandatory_passed();
    let total = StageName::MANDATORY.len();
    write_heading(out, "OVERALL SUMMARY")?;
    writeln!(out, "Stages passed: {}/{}", passed, total)?;
    writeln!(
        out,
        "Overall result: {}",
        if passed == total {
            "ALL STAGES PASSED"
        } else {
            "SOME STAGES FAILED"
        }
    )?;
    write!(out, "{}", rule)
}

fn write_heading(out: &mut impl Write, title: &str) -> fmt::Result {
    writeln!(out, "{}", title)?;
    writeln!(out, "{}", "-".repeat(20))
}

fn write_performance(out: &mut impl Write, perf: &PerformanceResult) -> fmt::Result {
    let verdict = &perf.verdict;
    write_heading(out, StageName::Analyze.title())?;
    writeln!(out, "   Build time: {:.1} minutes", verdict.measured_minutes)?;
    writeln!(out, "   Cache hit rate: {:.1}%", verdict.hit_rate_percent)?;
    writeln!(out, "   Cache effectiveness: {}", verdict.effectiveness)?;
    writeln!(
        out,
        "   Tasks: {} attempted, {} executed, {} from cache",
        perf.metrics.tasks_attempted,
        perf.metrics.tasks_executed,
        perf.metrics.tasks_skipped_from_cache
    )?;
    writeln!(
        out,
        "   Estimated uncached time: {:.1} minutes",
        verdict.estimated_uncached_minutes
    )?;
    writeln!(
        out,
        "   Estimated time saved: {:.1} minutes",
        verdict.estimated_time_saved_minutes
    )?;
    writeln!(
        out,
        "   Meets documented target: {}",
        if verdict.meets_documented_target { "YES" } else { "NO" }
    )?;
    writeln!(out)
}

fn write_stage(out: &mut impl Write, result: &StageResult) -> fmt::Result {
    if result.succeeded {
        writeln!(out, "PASSED ({:.1}s)", result.duration_secs)?;
    } else {
        writeln!(out, "FAILED ({:.1}s)", result.duration_secs)?;
        if let Some(ref error) = result.error {
            writeln!(out, "   Error: {}", error)?;
        }
    }

    match result.detail {
        Some(StageDetail::Prereq(ref p)) => {
            writeln!(
                out,
                "   Container runtime: {}",
                p.runtime_version.as_deref().unwrap_or(if p.runtime_available {
                    "available"
                } else {
                    "missing"
                })
            )?;
            writeln!(
                out,
                "   Image: {}{}",
                if p.image_available { "present" } else { "missing" },
                if p.image_pulled { " (pulled)" } else { "" }
            )?;
            if let Some(reachable) = p.remote_reachable {
                writeln!(
                    out,
                    "   Remote: {}",
                    if reachable { "reachable" } else { "unreachable" }
                )?;
            }
            if let Some(free) = p.free_space_gb {
                writeln!(out, "   Free disk: {:.1}GB", free)?;
            }
        }
        Some(StageDetail::Download(ref d)) => {
            writeln!(out, "   Files downloaded: {}", d.files_downloaded)?;
            writeln!(out, "   Total: {:.1}MB", d.total_mb)?;
        }
        Some(StageDetail::Integrity(ref i)) => {
            writeln!(out, "   Total cache size: {:.2}GB", i.total_size_gb)?;
            writeln!(
                out,
                "   Downloads: {:.0}MB ({} entries{})",
                i.downloads_size_mb,
                i.downloads_archive.entries,
                if i.downloads_archive.ok { "" } else { ", corrupt" }
            )?;
            writeln!(
                out,
                "   sstate: {:.0}MB ({} entries{})",
                i.sstate_size_mb,
                i.sstate_archive.entries,
                if i.sstate_archive.ok { "" } else { ", corrupt" }
            )?;
        }
        Some(StageDetail::Extraction(ref e)) => {
            writeln!(out, "   Extraction time: {:.1}s", e.extraction_secs)?;
            writeln!(
                out,
                "   Downloads files: {} ({:.0}MB)",
                e.stats.downloads_files, e.stats.downloads_size_mb
            )?;
            writeln!(
                out,
                "   sstate files: {} ({} objects, {} signatures)",
                e.stats.sstate_files, e.stats.sstate_objects, e.stats.sstate_signatures
            )?;
        }
        Some(StageDetail::Build(ref b)) => {
            writeln!(out, "   Target: {}", b.target)?;
            writeln!(out, "   Build time: {:.1} minutes", b.duration_minutes)?;
            if let Some(code) = b.exit_code {
                writeln!(out, "   Exit code: {}", code)?;
            }
            if let Some(ref tail) = b.tail {
                writeln!(out, "   Last output:")?;
                for line in tail.lines() {
                    writeln!(out, "     | {}", line)?;
                }
            }
        }
        Some(StageDetail::Performance(_)) | None => {}
    }
    Ok(())
}

/// Write a results record (the stage ledger or a benchmark) as pretty JSON
pub async fn persist_results<T: Serialize + ?Sized>(record: &T, path: &Path) -> CachePipeResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| CachePipeError::io(format!("creating {}", parent.display()), e))?;
    }
    let content = serde_json::to_string_pretty(record)?;
    fs::write(path, content)
        .await
        .map_err(|e| CachePipeError::io(format!("writing results to {}", path.display()), e))?;
    info!("Results saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{BuildMetrics, PerformanceScorer};
    use crate::config::TargetsConfig;
    use crate::pipeline::stage::{BuildResult, PerformanceResult};
    use std::time::Duration;
    use tempfile::TempDir;

    fn ledger_with_build(success: bool) -> StageLedger {
        let mut ledger = StageLedger::new();
        for stage in [StageName::Prereq, StageName::Fetch, StageName::Verify, StageName::Extract] {
            ledger
                .record(stage, StageResult::success(Duration::from_secs(1), None))
                .unwrap();
        }

        let build = BuildResult {
            target: "core-image-minimal".to_string(),
            container: "c".to_string(),
            exit_code: Some(if success { 0 } else { 1 }),
            duration_minutes: 12.0,
            output_lines: 3,
            tail: (!success).then(|| "ERROR: do_compile failed".to_string()),
        };
        let result = if success {
            StageResult::success(Duration::from_secs(720), Some(StageDetail::Build(build)))
        } else {
            let err = CachePipeError::BuildFailure {
                target: "core-image-minimal".to_string(),
                code: 1,
                tail: String::new(),
            };
            StageResult::failure(Duration::from_secs(720), &err, Some(StageDetail::Build(build)))
        };
        ledger.record(StageName::Build, result).unwrap();
        ledger
    }

    #[test]
    fn report_for_successful_run() {
        let mut ledger = ledger_with_build(true);
        let metrics = BuildMetrics {
            tasks_wanted: 100,
            tasks_found: 80,
            hit_rate_percent: 80.0,
            ..BuildMetrics::default()
        };
        let verdict = PerformanceScorer::score(12.0, &metrics, &TargetsConfig::default());
        ledger
            .record(
                StageName::Analyze,
                StageResult::success(
                    Duration::ZERO,
                    Some(StageDetail::Performance(PerformanceResult {
                        metrics,
                        gaps: vec![],
                        verdict,
                    })),
                )
                .with_warnings(vec!["no task summary line in build output".to_string()]),
            )
            .unwrap();

        let report = render_report(&ledger, Local::now(), Path::new("/w"));

        assert!(report.contains("Workspace: /w"));
        assert!(report.contains("BUILD\n--------------------\nPASSED"));
        assert!(report.contains("Cache hit rate: 80.0%"));
        assert!(report.contains("Build time: 12.0 minutes"));
        assert!(report.contains("Meets documented target: YES"));
        assert!(report.contains("[analyze] no task summary line"));
        assert!(report.contains("Stages passed: 5/5"));
    }

    #[test]
    fn report_for_failed_build_shows_tail() {
        let ledger = ledger_with_build(false);
        let report = render_report(&ledger, Local::now(), Path::new("/w"));

        assert!(report.contains("FAILED"));
        assert!(report.contains("Build of core-image-minimal failed with exit code 1"));
        assert!(report.contains("| ERROR: do_compile failed"));
        assert!(report.contains("Stages passed: 4/5"));
        assert!(!report.contains("PERFORMANCE ANALYSIS"));
    }

    #[test]
    fn unreached_stages_are_skipped() {
        let mut ledger = StageLedger::new();
        ledger
            .record(
                StageName::Prereq,
                StageResult::failure(
                    Duration::ZERO,
                    &CachePipeError::Prerequisite("docker missing".to_string()),
                    None,
                ),
            )
            .unwrap();

        let report = render_report(&ledger, Local::now(), Path::new("/w"));
        assert_eq!(report.matches("SKIPPED").count(), 4);
        assert!(report.contains("Stages passed: 0/5"));
    }

    #[tokio::test]
    async fn results_are_persisted_as_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out").join("results.json");

        persist_results(&ledger_with_build(true), &path).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["build"]["succeeded"], true);
        assert_eq!(json["fetch"]["succeeded"], true);
        assert!(json.get("analyze").is_none());
    }
}
