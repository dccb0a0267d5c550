use tracing::error;

use crate::error::{EnrichError, Result};

pub const DEFAULT_MIN_SAMPLE: usize = 20;
pub const DEFAULT_MIN_SUCCESS_PERCENT: f64 = 75.0;

/// Counters for one run. Owned by the driver loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunStats {
    pub processed: usize,
    /// Rows whose property search produced no address, for any reason.
    pub unlisted: usize,
    /// Subset of `unlisted` refused by the upstream.
    pub rejected: usize,
    pub geocoded: usize,
}

impl RunStats {
    pub fn listed(&self) -> usize {
        self.processed.saturating_sub(self.unlisted)
    }

    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            return 100.0;
        }
        (self.listed() as f64 * 100.0) / self.processed as f64
    }
}

/// Abort thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailurePolicy {
    /// Rows that must be processed before the rate is checked at all.
    pub min_sample: usize,
    pub min_success_percent: f64,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            min_sample: DEFAULT_MIN_SAMPLE,
            min_success_percent: DEFAULT_MIN_SUCCESS_PERCENT,
        }
    }
}

impl FailurePolicy {
    pub fn should_abort(&self, stats: &RunStats) -> bool {
        stats.processed > self.min_sample && stats.success_rate() < self.min_success_percent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    Aborted,
}

/// Outcome of one row as far as the monitor cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowOutcome {
    pub unlisted: bool,
    pub rejected: bool,
    pub geocoded: bool,
}

/// Circuit breaker over the aggregate lookup success rate.
#[derive(Debug, Clone)]
pub struct FailureMonitor {
    policy: FailurePolicy,
    stats: RunStats,
    state: MonitorState,
}

impl FailureMonitor {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            stats: RunStats::default(),
            state: MonitorState::Running,
        }
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Counts one row, then trips if the policy says so. Once tripped every
    /// later call fails too.
    pub fn record(&mut self, outcome: RowOutcome) -> Result<()> {
        if self.state == MonitorState::Aborted {
            return Err(self.failure());
        }

        self.stats.processed += 1;
        if outcome.unlisted {
            self.stats.unlisted += 1;
        }
        if outcome.rejected {
            self.stats.rejected += 1;
        }
        if outcome.geocoded {
            self.stats.geocoded += 1;
        }

        if self.policy.should_abort(&self.stats) {
            self.state = MonitorState::Aborted;
            error!(
                "Aborting after {} rows: {} unlisted ({} rejected by the upstream)",
                self.stats.processed, self.stats.unlisted, self.stats.rejected
            );
            return Err(self.failure());
        }
        Ok(())
    }

    fn failure(&self) -> EnrichError {
        EnrichError::TooManyFailures {
            processed: self.stats.processed,
            unlisted: self.stats.unlisted,
            success_rate: self.stats.success_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTED: RowOutcome = RowOutcome {
        unlisted: false,
        rejected: false,
        geocoded: true,
    };
    const UNLISTED: RowOutcome = RowOutcome {
        unlisted: true,
        rejected: false,
        geocoded: false,
    };

    fn stats(processed: usize, unlisted: usize) -> RunStats {
        RunStats {
            processed,
            unlisted,
            ..RunStats::default()
        }
    }

    #[test]
    fn test_policy_thresholds() {
        let policy = FailurePolicy::default();
        // 68% success over 25 rows
        assert!(policy.should_abort(&stats(25, 8)));
        // 80% success over 25 rows
        assert!(!policy.should_abort(&stats(25, 5)));
        // never before the sample is large enough
        assert!(!policy.should_abort(&stats(20, 20)));
        assert!(policy.should_abort(&stats(21, 6)));
        // exactly 75% is fine
        assert!(!policy.should_abort(&stats(24, 6)));
    }

    #[test]
    fn test_success_rate() {
        assert_eq!(stats(0, 0).success_rate(), 100.0);
        assert_eq!(stats(25, 5).success_rate(), 80.0);
        assert_eq!(stats(25, 8).success_rate(), 68.0);
    }

    #[test]
    fn test_listed_never_underflows() {
        assert_eq!(stats(2, 5).listed(), 0);
        assert_eq!(stats(2, 5).success_rate(), 0.0);
    }

    #[test]
    fn test_monitor_keeps_running_on_healthy_run() {
        let mut monitor = FailureMonitor::new(FailurePolicy::default());
        for i in 0..25 {
            let outcome = if i % 5 == 0 { UNLISTED } else { LISTED };
            monitor.record(outcome).unwrap();
        }
        assert_eq!(monitor.state(), MonitorState::Running);
        assert_eq!(monitor.stats().processed, 25);
        assert_eq!(monitor.stats().unlisted, 5);
        assert_eq!(monitor.stats().geocoded, 20);
    }

    #[test]
    fn test_monitor_aborts_and_stays_aborted() {
        let mut monitor = FailureMonitor::new(FailurePolicy::default());
        for _ in 0..15 {
            monitor.record(LISTED).unwrap();
        }
        for _ in 0..5 {
            monitor.record(UNLISTED).unwrap();
        }
        // row 21 puts the run at 15/21 = 71.4%
        let err = monitor.record(UNLISTED).unwrap_err();
        match err {
            EnrichError::TooManyFailures {
                processed,
                unlisted,
                ..
            } => {
                assert_eq!(processed, 21);
                assert_eq!(unlisted, 6);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(monitor.state(), MonitorState::Aborted);
        assert!(monitor.record(LISTED).is_err());
        assert_eq!(monitor.stats().processed, 21);
    }

    #[test]
    fn test_rejections_are_counted_separately() {
        let mut monitor = FailureMonitor::new(FailurePolicy::default());
        monitor
            .record(RowOutcome {
                unlisted: true,
                rejected: true,
                geocoded: false,
            })
            .unwrap();
        assert_eq!(monitor.stats().unlisted, 1);
        assert_eq!(monitor.stats().rejected, 1);
    }

    #[test]
    fn test_custom_policy() {
        let policy = FailurePolicy {
            min_sample: 2,
            min_success_percent: 50.0,
        };
        let mut monitor = FailureMonitor::new(policy);
        monitor.record(UNLISTED).unwrap();
        monitor.record(UNLISTED).unwrap();
        assert!(monitor.record(UNLISTED).is_err());
    }
}
