use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Counters collected by one task and merged into the run total.
///
/// Every task owns its own `RunStats`, so the hot path never contends on
/// shared counters. `merge` is associative and commutative; task results are
/// merged in whatever order they are joined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Operations issued by workers, successful or not.
    pub issued: u64,
    /// Issued operations that came back as an error.
    pub failed: u64,
    /// Comparison-mode probes whose replies differed between servers.
    pub divergences: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one operation outcome.
    pub fn consume<T>(&mut self, outcome: &Result<T>) {
        self.issued += 1;
        if outcome.is_err() {
            self.failed += 1;
        }
    }

    pub fn merge(&mut self, other: Self) {
        self.issued += other.issued;
        self.failed += other.failed;
        self.divergences += other.divergences;
    }
}
