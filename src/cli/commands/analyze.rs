//! Analyze command - extract cache metrics from a saved build log

use crate::analysis::{BuildLogAnalyzer, BuildMetrics, ParseGap, PerformanceScorer, PerformanceVerdict};
use crate::cli::args::{AnalyzeArgs, OutputFormat};
use crate::config::Config;
use crate::error::{CachePipeError, CachePipeResult};
use console::style;
use serde::Serialize;
use tokio::fs;

#[derive(Debug, Serialize)]
struct AnalyzeReport {
    metrics: BuildMetrics,
    gaps: Vec<ParseGap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verdict: Option<PerformanceVerdict>,
}

/// Execute the analyze command
pub async fn execute(args: AnalyzeArgs, config: &Config) -> CachePipeResult<()> {
    let content = fs::read_to_string(&args.log)
        .await
        .map_err(|e| CachePipeError::io(format!("reading build log {}", args.log.display()), e))?;

    let analysis = BuildLogAnalyzer::analyze(&content);
    let verdict = args
        .minutes
        .map(|minutes| PerformanceScorer::score(minutes, &analysis.metrics, &config.targets));

    let report = AnalyzeReport {
        metrics: analysis.metrics,
        gaps: analysis.gaps,
        verdict,
    };

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_text(&report),
    }

    Ok(())
}

fn print_text(report: &AnalyzeReport) {
    let m = &report.metrics;

    println!("{}", style("Build cache metrics").bold().cyan());
    println!();
    println!(
        "  Sstate:     wanted {}, found {}, missed {}",
        m.tasks_wanted, m.tasks_found, m.tasks_missed
    );
    println!("  Hit rate:   {:.1}%", m.hit_rate_percent);
    println!(
        "  Tasks:      attempted {}, executed {}, from cache {}",
        m.tasks_attempted, m.tasks_executed, m.tasks_skipped_from_cache
    );
    println!("  Task cache: {:.1}%", m.task_cache_rate_percent);
    println!("  Downloaded: {} files", m.downloaded_files);

    for gap in &report.gaps {
        println!("  {} {}", style("!").yellow(), gap.describe());
    }

    if let Some(ref v) = report.verdict {
        let meets = if v.meets_documented_target {
            style("YES").green()
        } else {
            style("NO").red()
        };
        println!();
        println!("  Build time:     {:.1} minutes", v.measured_minutes);
        println!("  Effectiveness:  {}", v.effectiveness);
        println!("  Meets target:   {}", meets);
        println!(
            "  Uncached est.:  {:.1} minutes ({:.1} saved)",
            v.estimated_uncached_minutes, v.estimated_time_saved_minutes
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn missing_log_is_io_error() {
        let args = AnalyzeArgs {
            log: PathBuf::from("/nonexistent/build.log"),
            minutes: None,
            format: OutputFormat::Text,
        };
        let err = execute(args, &Config::default()).await.unwrap_err();
        assert!(matches!(err, CachePipeError::Io { .. }));
    }

    #[test]
    fn verdict_omitted_without_minutes() {
        let report = AnalyzeReport {
            metrics: BuildMetrics::default(),
            gaps: vec![ParseGap::SstateSummary],
            verdict: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("verdict").is_none());
        assert_eq!(json["gaps"][0], "sstate_summary");
    }
}
