//! Build output parsing

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::{debug, warn};

static SSTATE_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Sstate summary: Wanted (\d+) Found (\d+) Missed (\d+)").unwrap()
});
static TASK_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:NOTE: )?Tasks Summary: Attempted (\d+) tasks of which (\d+) didn't need to be rerun")
        .unwrap()
});
static DOWNLOADED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Downloaded (\d+) files").unwrap());

/// Cache counters extracted from build output.
///
/// Every field defaults to zero when its summary line is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildMetrics {
    pub tasks_wanted: u64,
    pub tasks_found: u64,
    pub tasks_missed: u64,
    pub hit_rate_percent: f64,
    pub tasks_attempted: u64,
    pub tasks_executed: u64,
    pub tasks_skipped_from_cache: u64,
    pub task_cache_rate_percent: f64,
    pub downloaded_files: u64,
}

/// Summary lines that were expected but not found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseGap {
    SstateSummary,
    TaskSummary,
}

impl ParseGap {
    pub fn describe(&self) -> &'static str {
        match self {
            ParseGap::SstateSummary => "no sstate summary line in build output",
            ParseGap::TaskSummary => "no task summary line in build output",
        }
    }
}

/// Metrics plus the gaps found while parsing
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogAnalysis {
    pub metrics: BuildMetrics,
    pub gaps: Vec<ParseGap>,
}

pub struct BuildLogAnalyzer;

impl BuildLogAnalyzer {
    /// Parse build output into metrics; never fails
    pub fn parse(output: &str) -> BuildMetrics {
        Self::analyze(output).metrics
    }

    /// Parse build output, also reporting which summary lines were missing
    pub fn analyze(output: &str) -> LogAnalysis {
        let mut metrics = BuildMetrics::default();
        let mut gaps = Vec::new();

        match SSTATE_SUMMARY.captures(output) {
            Some(caps) => {
                metrics.tasks_wanted = number(&caps, 1);
                metrics.tasks_found = number(&caps, 2);
                metrics.tasks_missed = number(&caps, 3);
                metrics.hit_rate_percent = percent(metrics.tasks_found, metrics.tasks_wanted);
                debug!(
                    "sstate: wanted {} found {} missed {}",
                    metrics.tasks_wanted, metrics.tasks_found, metrics.tasks_missed
                );
            }
            None => gaps.push(ParseGap::SstateSummary),
        }

        match TASK_SUMMARY.captures(output) {
            Some(caps) => {
                let attempted = number(&caps, 1);
                let skipped = number(&caps, 2);
                metrics.tasks_attempted = attempted;
                metrics.tasks_skipped_from_cache = skipped;
                metrics.tasks_executed = attempted.saturating_sub(skipped);
                metrics.task_cache_rate_percent = percent(skipped, attempted);
            }
            None => gaps.push(ParseGap::TaskSummary),
        }

        metrics.downloaded_files = DOWNLOADED
            .captures_iter(output)
            .map(|caps| number(&caps, 1))
            .sum();

        for gap in &gaps {
            warn!("{}", gap.describe());
        }

        LogAnalysis { metrics, gaps }
    }
}

fn number(caps: &regex::Captures<'_>, index: usize) -> u64 {
    caps.get(index)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_LOG: &str = "\
Loading cache: 100% |#########| Time: 0:00:01
NOTE: Resolving any missing task queue dependencies
Sstate summary: Wanted 100 Found 80 Missed 20 Current 0 (80% match, 0% complete)
NOTE: Executing Tasks
NOTE: Tasks Summary: Attempted 2540 tasks of which 2400 didn't need to be rerun and all succeeded.
";

    #[test]
    fn parses_hit_rate_exactly() {
        let metrics = BuildLogAnalyzer::parse(FULL_LOG);
        assert_eq!(metrics.tasks_wanted, 100);
        assert_eq!(metrics.tasks_found, 80);
        assert_eq!(metrics.tasks_missed, 20);
        assert_eq!(metrics.hit_rate_percent, 80.0);
    }

    #[test]
    fn parses_task_summary() {
        let metrics = BuildLogAnalyzer::parse(FULL_LOG);
        assert_eq!(metrics.tasks_attempted, 2540);
        assert_eq!(metrics.tasks_skipped_from_cache, 2400);
        assert_eq!(metrics.tasks_executed, 140);
        assert!((metrics.task_cache_rate_percent - 94.488).abs() < 0.01);
    }

    #[test]
    fn task_summary_without_note_prefix() {
        let metrics =
            BuildLogAnalyzer::parse("Tasks Summary: Attempted 10 tasks of which 4 didn't need to be rerun");
        assert_eq!(metrics.tasks_executed, 6);
        assert_eq!(metrics.hit_rate_percent, 0.0);
    }

    #[test]
    fn zero_wanted_does_not_divide() {
        let metrics = BuildLogAnalyzer::parse("Sstate summary: Wanted 0 Found 0 Missed 0");
        assert_eq!(metrics.hit_rate_percent, 0.0);
    }

    #[test]
    fn missing_lines_yield_zero_metrics() {
        let analysis = BuildLogAnalyzer::analyze("NOTE: nothing to see here\nall done\n");
        assert_eq!(analysis.metrics, BuildMetrics::default());
        assert_eq!(
            analysis.gaps,
            vec![ParseGap::SstateSummary, ParseGap::TaskSummary]
        );

        assert_eq!(BuildLogAnalyzer::parse(""), BuildMetrics::default());
    }

    #[test]
    fn only_one_summary_present() {
        let analysis = BuildLogAnalyzer::analyze("Sstate summary: Wanted 4 Found 1 Missed 3");
        assert_eq!(analysis.metrics.hit_rate_percent, 25.0);
        assert_eq!(analysis.metrics.tasks_attempted, 0);
        assert_eq!(analysis.gaps, vec![ParseGap::TaskSummary]);
    }

    #[test]
    fn downloaded_files_are_summed() {
        let log = "Downloaded 3 files\nsomething\nDownloaded 12 files\n";
        assert_eq!(BuildLogAnalyzer::parse(log).downloaded_files, 15);
    }
}
