use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{error::Result, stats::RunStats};

/// Summary of a finished run.
///
/// A report is a pure data transformation of the merged [`RunStats`] and the
/// measured wall time; it carries no I/O. Hand it to a [`Reporter`] to show
/// or store it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub scenario: String,
    pub elapsed: Duration,
    pub issued: u64,
    pub failed: u64,
    pub divergences: u64,
    /// Achieved operations per second.
    pub throughput: f64,
    /// Operations per second the run was paced for.
    pub target_rate: f64,
}

impl RunReport {
    pub fn new(
        scenario: impl Into<String>,
        stats: RunStats,
        elapsed: Duration,
        target_rate: f64,
    ) -> Self {
        let secs = elapsed.as_secs_f64();
        let throughput = if secs > 0.0 {
            stats.issued as f64 / secs
        } else {
            0.0
        };
        Self {
            scenario: scenario.into(),
            elapsed,
            issued: stats.issued,
            failed: stats.failed,
            divergences: stats.divergences,
            throughput,
            target_rate,
        }
    }
}

/// A [`Reporter`] consumes a [`RunReport`] and performs side effects:
/// printing it, shipping it somewhere, persisting it.
pub trait Reporter {
    fn report(&self, report: &RunReport) -> impl Future<Output = Result<()>>;
}

/// Pretty-prints the report to stdout.
pub struct StdoutReporter;

impl Reporter for StdoutReporter {
    async fn report(&self, report: &RunReport) -> Result<()> {
        println!("{report:#?}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throughput_is_issued_over_elapsed() {
        let stats = RunStats {
            issued: 500,
            failed: 5,
            divergences: 1,
        };
        let report = RunReport::new("s", stats, Duration::from_secs(2), 300.0);
        assert_eq!(report.throughput, 250.0);
        assert_eq!(report.failed, 5);
        assert_eq!(report.divergences, 1);
    }

    #[test]
    fn zero_elapsed_does_not_divide_by_zero() {
        let report = RunReport::new("s", RunStats::new(), Duration::ZERO, 1.0);
        assert_eq!(report.throughput, 0.0);
    }
}
