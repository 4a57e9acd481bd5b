//! Scoring of a measured build against documented targets

use super::BuildMetrics;
use crate::config::TargetsConfig;
use serde::Serialize;
use std::fmt;

/// Hit-rate class of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effectiveness {
    Poor,
    Good,
    Excellent,
}

impl fmt::Display for Effectiveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Effectiveness::Poor => "Poor",
            Effectiveness::Good => "Good",
            Effectiveness::Excellent => "Excellent",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceVerdict {
    pub measured_minutes: f64,
    pub hit_rate_percent: f64,
    pub effectiveness: Effectiveness,
    pub meets_documented_target: bool,
    pub estimated_uncached_minutes: f64,
    pub estimated_time_saved_minutes: f64,
}

pub struct PerformanceScorer;

impl PerformanceScorer {
    /// Classify the hit rate and check it against the documented targets.
    ///
    /// Class boundaries are strict: a rate equal to `excellent_above` is
    /// only Good. The target needs both rate and duration within bounds.
    pub fn score(
        duration_minutes: f64,
        metrics: &BuildMetrics,
        targets: &TargetsConfig,
    ) -> PerformanceVerdict {
        let rate = metrics.hit_rate_percent;
        let effectiveness = if rate > targets.excellent_above {
            Effectiveness::Excellent
        } else if rate > targets.good_above {
            Effectiveness::Good
        } else {
            Effectiveness::Poor
        };

        let meets_documented_target = rate >= targets.min_hit_rate_percent
            && duration_minutes <= targets.max_duration_minutes;
        let estimated_uncached_minutes = duration_minutes * targets.uncached_speedup_factor;

        PerformanceVerdict {
            measured_minutes: duration_minutes,
            hit_rate_percent: rate,
            effectiveness,
            meets_documented_target,
            estimated_uncached_minutes,
            estimated_time_saved_minutes: estimated_uncached_minutes - duration_minutes,
        }
    }
}
