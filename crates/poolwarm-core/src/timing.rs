//! Phase timing for save and restore operations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

/// A named phase of a save or restore operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Connect,
    Status,
    Enumerate,
    Write,
    Read,
    Fetch,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Connect => "connect",
            Phase::Status => "status",
            Phase::Enumerate => "enumerate",
            Phase::Write => "write",
            Phase::Read => "read",
            Phase::Fetch => "fetch",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cumulative elapsed time per phase.
///
/// Durations come from [`Instant`], so they are monotonic and never
/// negative. Entries only ever grow while an operation runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingLedger {
    phases: BTreeMap<Phase, Duration>,
}

impl TimingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `elapsed` to the running total of `phase`.
    pub fn record(&mut self, phase: Phase, elapsed: Duration) {
        *self.phases.entry(phase).or_default() += elapsed;
    }

    /// Await `future`, charging its wall time to `phase`.
    pub async fn time<F, T>(&mut self, phase: Phase, future: F) -> T
    where
        F: Future<Output = T>,
    {
        let timer = PhaseTimer::start(phase);
        let output = future.await;
        timer.stop(self);
        output
    }

    pub fn get(&self, phase: Phase) -> Option<Duration> {
        self.phases.get(&phase).copied()
    }

    /// Seconds spent in `phase`, zero if it never ran.
    pub fn seconds(&self, phase: Phase) -> f64 {
        self.get(phase).map(|d| d.as_secs_f64()).unwrap_or(0.0)
    }

    /// Sum of all recorded phases.
    pub fn total(&self) -> Duration {
        self.phases.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Phase, Duration)> + '_ {
        self.phases.iter().map(|(phase, d)| (*phase, *d))
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Phase name to elapsed seconds, in phase order.
    pub fn to_seconds_map(&self) -> BTreeMap<&'static str, f64> {
        self.phases
            .iter()
            .map(|(phase, d)| (phase.as_str(), d.as_secs_f64()))
            .collect()
    }
}

/// Timer for a single phase.
pub struct PhaseTimer {
    phase: Phase,
    start: Instant,
}

impl PhaseTimer {
    pub fn start(phase: Phase) -> Self {
        Self {
            phase,
            start: Instant::now(),
        }
    }

    /// Stop the timer and charge the elapsed time to the ledger.
    pub fn stop(self, ledger: &mut TimingLedger) -> Duration {
        let elapsed = self.start.elapsed();
        ledger.record(self.phase, elapsed);
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let mut ledger = TimingLedger::new();
        ledger.record(Phase::Fetch, Duration::from_millis(40));
        ledger.record(Phase::Fetch, Duration::from_millis(60));
        ledger.record(Phase::Connect, Duration::from_millis(5));

        assert_eq!(ledger.get(Phase::Fetch), Some(Duration::from_millis(100)));
        assert_eq!(ledger.total(), Duration::from_millis(105));
        assert_eq!(ledger.seconds(Phase::Write), 0.0);
    }

    #[test]
    fn test_seconds_map_uses_phase_names() {
        let mut ledger = TimingLedger::new();
        ledger.record(Phase::Enumerate, Duration::from_secs(2));
        let map = ledger.to_seconds_map();
        assert_eq!(map.get("enumerate"), Some(&2.0));
        assert_eq!(map.len(), 1);
    }

    #[tokio::test]
    async fn test_time_charges_phase() {
        let mut ledger = TimingLedger::new();
        let wall = Instant::now();
        let value = ledger
            .time(Phase::Status, async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                7
            })
            .await;

        assert_eq!(value, 7);
        let recorded = ledger.get(Phase::Status).unwrap();
        assert!(recorded >= Duration::from_millis(10));
        assert!(recorded <= wall.elapsed());
    }
}
