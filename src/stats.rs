// 📊 Session statistics - request counters shared across one session
//
// Injected by reference into the engine; every request updates it under
// the lock once it finishes.

use crate::error::IntegrationError;
use crate::source::Provenance;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceTally {
    pub live: u64,
    pub synthetic: u64,
}

impl SourceTally {
    fn record(&mut self, provenance: Provenance) {
        match provenance {
            Provenance::Live => self.live += 1,
            Provenance::Synthetic => self.synthetic += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub invalid_inputs: u64,
    pub internal_faults: u64,
    pub cache_hits: u64,
    pub total_latency_ms: u64,
    pub enterprise: SourceTally,
    pub insurance: SourceTally,
    /// successes / total_requests, in [0, 1]
    pub success_rate: f64,
    pub average_latency_ms: f64,
}

#[derive(Debug, Default)]
struct Counters {
    total_requests: u64,
    successes: u64,
    failures: u64,
    invalid_inputs: u64,
    internal_faults: u64,
    cache_hits: u64,
    total_latency: Duration,
    enterprise: SourceTally,
    insurance: SourceTally,
}

#[derive(Debug, Default)]
pub struct SessionStatistics {
    counters: Mutex<Counters>,
}

impl SessionStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(
        &self,
        enterprise: Provenance,
        insurance: Provenance,
        latency: Duration,
        cache_hit: bool,
    ) {
        let mut c = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        c.total_requests += 1;
        c.successes += 1;
        c.total_latency += latency;
        if cache_hit {
            c.cache_hits += 1;
        } else {
            c.enterprise.record(enterprise);
            c.insurance.record(insurance);
        }
    }

    pub fn record_failure(&self, error: &IntegrationError, latency: Duration) {
        let mut c = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        c.total_requests += 1;
        c.failures += 1;
        c.total_latency += latency;
        if error.is_user_error() {
            c.invalid_inputs += 1;
        } else {
            c.internal_faults += 1;
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let total_latency_ms = c.total_latency.as_millis() as u64;

        StatsSnapshot {
            total_requests: c.total_requests,
            successes: c.successes,
            failures: c.failures,
            invalid_inputs: c.invalid_inputs,
            internal_faults: c.internal_faults,
            cache_hits: c.cache_hits,
            total_latency_ms,
            enterprise: c.enterprise.clone(),
            insurance: c.insurance.clone(),
            success_rate: ratio(c.successes, c.total_requests),
            average_latency_ms: if c.total_requests == 0 {
                0.0
            } else {
                c.total_latency.as_micros() as f64 / 1000.0 / c.total_requests as f64
            },
        }
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_counts_outcomes() {
        let stats = SessionStatistics::new();
        stats.record_success(Provenance::Live, Provenance::Synthetic, Duration::from_millis(30), false);
        stats.record_success(Provenance::Live, Provenance::Synthetic, Duration::from_millis(10), true);
        stats.record_failure(&IntegrationError::invalid_format("12", "too short"), Duration::ZERO);
        stats.record_failure(&IntegrationError::Internal("panic".into()), Duration::ZERO);

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 4);
        assert_eq!(snap.successes, 2);
        assert_eq!(snap.invalid_inputs, 1);
        assert_eq!(snap.internal_faults, 1);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.enterprise, SourceTally { live: 1, synthetic: 0 });
        assert_eq!(snap.insurance, SourceTally { live: 0, synthetic: 1 });
        assert_eq!(snap.success_rate, 0.5);
        assert_eq!(snap.average_latency_ms, 10.0);
    }

    #[test]
    fn test_concurrent_updates() {
        let stats = SessionStatistics::new();
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        stats.record_success(
                            Provenance::Synthetic,
                            Provenance::Synthetic,
                            Duration::ZERO,
                            false,
                        );
                    }
                });
            }
        });
        assert_eq!(stats.snapshot().successes, 800);
    }
}
