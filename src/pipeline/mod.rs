//! The cache validation pipeline
//!
//! `PipelineOrchestrator` drives the stages over a `PipelineContext`:
//! prerequisites, fetch, verify, extract, build, then analysis. Each stage
//! leaves one `StageResult` in the context's ledger, which is rendered and
//! persisted at the end of every run.
//!
//! `BenchRunner` reuses the context against an extracted cache, building
//! each target repeatedly to measure how much a cached rebuild saves.

mod bench;
mod context;
mod orchestrator;
mod prereq;
mod report;
mod stage;

pub use bench::{BenchBuild, BenchReport, BenchRunner};
pub use context::PipelineContext;
pub use orchestrator::{PipelineOrchestrator, PipelineOutcome};
pub use prereq::check_prerequisites;
pub use report::{persist_results, render_report};
pub use stage::{
    BuildResult, DownloadResult, DownloadedObject, ExtractionResult, IntegrityResult,
    PerformanceResult, PipelineState, PrereqResult, StageDetail, StageLedger, StageName,
    StageResult,
};
