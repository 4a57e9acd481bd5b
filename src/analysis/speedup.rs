//! Clean-versus-incremental rebuild comparison

use serde::Serialize;
use std::fmt;

/// How much of the clean build time a cached rebuild saves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EfficiencyRating {
    NeedsWork,
    Fair,
    Good,
    Excellent,
}

impl EfficiencyRating {
    /// Bands are inclusive: 80% saved is already Excellent
    pub fn from_percent(efficiency: f64) -> Self {
        if efficiency >= 80.0 {
            EfficiencyRating::Excellent
        } else if efficiency >= 60.0 {
            EfficiencyRating::Good
        } else if efficiency >= 40.0 {
            EfficiencyRating::Fair
        } else {
            EfficiencyRating::NeedsWork
        }
    }
}

impl fmt::Display for EfficiencyRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EfficiencyRating::NeedsWork => "Needs work",
            EfficiencyRating::Fair => "Fair",
            EfficiencyRating::Good => "Good",
            EfficiencyRating::Excellent => "Excellent",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebuildSpeedup {
    pub clean_build_secs: f64,
    /// Mean of the incremental builds
    pub incremental_build_secs: f64,
    pub speedup_ratio: f64,
    pub time_saved_secs: f64,
    pub efficiency_percent: f64,
    pub rating: EfficiencyRating,
}

impl RebuildSpeedup {
    /// Compare a clean build with the rebuilds that followed it.
    ///
    /// Returns `None` without any rebuild or when a duration is not positive.
    pub fn compare(clean_secs: f64, incremental_secs: &[f64]) -> Option<Self> {
        if incremental_secs.is_empty() || clean_secs <= 0.0 {
            return None;
        }
        let incremental = incremental_secs.iter().sum::<f64>() / incremental_secs.len() as f64;
        if incremental <= 0.0 {
            return None;
        }

        let time_saved = clean_secs - incremental;
        let efficiency = time_saved / clean_secs * 100.0;
        Some(Self {
            clean_build_secs: clean_secs,
            incremental_build_secs: incremental,
            speedup_ratio: clean_secs / incremental,
            time_saved_secs: time_saved,
            efficiency_percent: efficiency,
            rating: EfficiencyRating::from_percent(efficiency),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuild_five_times_faster() {
        let speedup = RebuildSpeedup::compare(3000.0, &[600.0]).unwrap();
        assert_eq!(speedup.speedup_ratio, 5.0);
        assert_eq!(speedup.time_saved_secs, 2400.0);
        assert_eq!(speedup.efficiency_percent, 80.0);
        assert_eq!(speedup.rating, EfficiencyRating::Excellent);
    }

    #[test]
    fn incremental_builds_are_averaged() {
        let speedup = RebuildSpeedup::compare(100.0, &[30.0, 50.0]).unwrap();
        assert_eq!(speedup.incremental_build_secs, 40.0);
        assert_eq!(speedup.efficiency_percent, 60.0);
        assert_eq!(speedup.rating, EfficiencyRating::Good);
    }

    #[test]
    fn slower_rebuild_needs_work() {
        let speedup = RebuildSpeedup::compare(100.0, &[120.0]).unwrap();
        assert!(speedup.efficiency_percent < 0.0);
        assert_eq!(speedup.rating, EfficiencyRating::NeedsWork);
    }

    #[test]
    fn no_comparison_without_rebuilds() {
        assert!(RebuildSpeedup::compare(100.0, &[]).is_none());
        assert!(RebuildSpeedup::compare(0.0, &[10.0]).is_none());
        assert!(RebuildSpeedup::compare(100.0, &[0.0]).is_none());
    }

    #[test]
    fn rating_bands() {
        assert_eq!(EfficiencyRating::from_percent(40.0), EfficiencyRating::Fair);
        assert_eq!(EfficiencyRating::from_percent(39.9), EfficiencyRating::NeedsWork);
        assert_eq!(EfficiencyRating::from_percent(79.9), EfficiencyRating::Good);
        assert_eq!(EfficiencyRating::Excellent.to_string(), "Excellent");
    }
}
