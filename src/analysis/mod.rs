//! Build log analysis and performance scoring

mod log;
mod score;
mod speedup;

pub use log::{BuildLogAnalyzer, BuildMetrics, LogAnalysis, ParseGap};
pub use score::{Effectiveness, PerformanceScorer, PerformanceVerdict};
pub use speedup::{EfficiencyRating, RebuildSpeedup};
