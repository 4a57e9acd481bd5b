//! Stage identities, per-stage results and the result ledger

use crate::analysis::{BuildMetrics, ParseGap, PerformanceVerdict};
use crate::archive::{ArchiveCheck, CacheStats};
use crate::error::{CachePipeError, CachePipeResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Prereq,
    Fetch,
    Verify,
    Extract,
    Build,
    Analyze,
}

impl StageName {
    /// Stages that must all succeed for the run to pass
    pub const MANDATORY: [StageName; 5] = [
        StageName::Prereq,
        StageName::Fetch,
        StageName::Verify,
        StageName::Extract,
        StageName::Build,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            StageName::Prereq => "PREREQUISITES",
            StageName::Fetch => "DOWNLOAD",
            StageName::Verify => "INTEGRITY",
            StageName::Extract => "EXTRACTION",
            StageName::Build => "BUILD",
            StageName::Analyze => "PERFORMANCE ANALYSIS",
        }
    }

    pub fn is_mandatory(&self) -> bool {
        Self::MANDATORY.contains(self)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageName::Prereq => "prereq",
            StageName::Fetch => "fetch",
            StageName::Verify => "verify",
            StageName::Extract => "extract",
            StageName::Build => "build",
            StageName::Analyze => "analyze",
        };
        f.write_str(name)
    }
}

/// Pipeline position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Init,
    PrereqCheck,
    Fetch,
    Verify,
    Extract,
    Build,
    Analyze,
    Report,
    Done,
    Failed(StageName),
}

impl PipelineState {
    /// State in which `stage` runs
    pub fn running(stage: StageName) -> Self {
        match stage {
            StageName::Prereq => PipelineState::PrereqCheck,
            StageName::Fetch => PipelineState::Fetch,
            StageName::Verify => PipelineState::Verify,
            StageName::Extract => PipelineState::Extract,
            StageName::Build => PipelineState::Build,
            StageName::Analyze => PipelineState::Analyze,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }
}

/// Outcome of the prerequisite checks
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrereqResult {
    pub runtime_available: bool,
    pub runtime_version: Option<String>,
    pub image_available: bool,
    pub image_pulled: bool,
    /// `None` when the remote check is disabled
    pub remote_reachable: Option<bool>,
    /// `None` when the disk check is disabled
    pub free_space_gb: Option<f64>,
    pub disk_ok: bool,
    pub failures: Vec<String>,
}

impl PrereqResult {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadedObject {
    pub name: String,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DownloadResult {
    pub objects: Vec<DownloadedObject>,
    pub files_downloaded: usize,
    pub total_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityResult {
    pub downloads_size_mb: f64,
    pub sstate_size_mb: f64,
    pub total_size_gb: f64,
    pub downloads_archive: ArchiveCheck,
    pub sstate_archive: ArchiveCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub extraction_secs: f64,
    pub archives_removed: bool,
    pub stats: CacheStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildResult {
    pub target: String,
    pub container: String,
    pub exit_code: Option<i32>,
    pub duration_minutes: f64,
    pub output_lines: usize,
    /// Last lines of output when the build failed
    pub tail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceResult {
    pub metrics: BuildMetrics,
    pub gaps: Vec<ParseGap>,
    pub verdict: PerformanceVerdict,
}

/// Stage-specific metrics, one variant per stage kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageDetail {
    Prereq(PrereqResult),
    Download(DownloadResult),
    Integrity(IntegrityResult),
    Extraction(ExtractionResult),
    Build(BuildResult),
    Performance(PerformanceResult),
}

/// Record of one finished stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    pub succeeded: bool,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<StageDetail>,
}

impl StageResult {
    pub fn success(duration: Duration, detail: Option<StageDetail>) -> Self {
        Self {
            succeeded: true,
            duration_secs: duration.as_secs_f64(),
            warnings: Vec::new(),
            error: None,
            detail,
        }
    }

    pub fn failure(duration: Duration, error: &CachePipeError, detail: Option<StageDetail>) -> Self {
        Self {
            succeeded: false,
            duration_secs: duration.as_secs_f64(),
            warnings: Vec::new(),
            error: Some(error.to_string()),
            detail,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Ordered, append-only mapping of stage results
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct StageLedger {
    entries: BTreeMap<StageName, StageResult>,
}

impl StageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of `stage`; a stage can only be recorded once
    pub fn record(&mut self, stage: StageName, result: StageResult) -> CachePipeResult<()> {
        if self.entries.contains_key(&stage) {
            return Err(CachePipeError::Internal(format!(
                "stage {} already recorded",
                stage
            )));
        }
        self.entries.insert(stage, result);
        Ok(())
    }

    pub fn get(&self, stage: StageName) -> Option<&StageResult> {
        self.entries.get(&stage)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StageName, &StageResult)> {
        self.entries.iter()
    }

    pub fn succeeded(&self, stage: StageName) -> bool {
        self.get(stage).is_some_and(|r| r.succeeded)
    }

    /// Mandatory stages that succeeded
    pub fn mandatory_passed(&self) -> usize {
        StageName::MANDATORY
            .iter()
            .filter(|s| self.succeeded(**s))
            .count()
    }

    pub fn all_mandatory_passed(&self) -> bool {
        self.mandatory_passed() == StageName::MANDATORY.len()
    }

    pub fn build(&self) -> Option<&BuildResult> {
        match self.get(StageName::Build)?.detail.as_ref()? {
            StageDetail::Build(build) => Some(build),
            _ => None,
        }
    }

    pub fn performance(&self) -> Option<&PerformanceResult> {
        match self.get(StageName::Analyze)?.detail.as_ref()? {
            StageDetail::Performance(perf) => Some(perf),
            _ => None,
        }
    }

    pub fn warnings(&self) -> impl Iterator<Item = (StageName, &str)> {
        self.entries
            .iter()
            .flat_map(|(stage, r)| r.warnings.iter().map(move |w| (*stage, w.as_str())))
    }
}
