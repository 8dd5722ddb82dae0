use std::{collections::BTreeMap, time::Duration};

use tokio::time::Instant;

/// Outcome of a single hit, as observed by the attacker.
#[derive(Debug, Clone)]
pub(super) struct HitResult {
    pub(super) issued_at: Instant,
    pub(super) completed_at: Instant,
    pub(super) error: Option<String>,
}

/// Latency distribution of all hits of an attack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyMetrics {
    pub total: Duration,
    pub min: Duration,
    pub mean: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub max: Duration,
}

impl LatencyMetrics {
    /// Nearest-rank percentiles over the given latencies.
    pub fn from_latencies(mut latencies: Vec<Duration>) -> Self {
        if latencies.is_empty() {
            return Self::default();
        }
        latencies.sort_unstable();

        let total: Duration = latencies.iter().sum();
        let count = latencies.len();
        let percentile = |permille: usize| {
            let rank = (count * permille).div_ceil(1000);
            latencies[rank.clamp(1, count) - 1]
        };
        let mean = u64::try_from(total.as_nanos() / count as u128).unwrap_or(u64::MAX);

        Self {
            total,
            min: latencies[0],
            mean: Duration::from_nanos(mean),
            p50: percentile(500),
            p95: percentile(950),
            p99: percentile(990),
            max: latencies[count - 1],
        }
    }
}

/// Aggregated results of an attack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttackMetrics {
    /// Hits issued.
    pub hits: u64,
    pub successes: u64,
    /// Time between the first and the last issued hit.
    pub attack: Duration,
    /// Time between the last issued hit and the last completed one.
    pub wait: Duration,
    pub latencies: LatencyMetrics,
    /// Error messages of failed hits, with their occurrences.
    pub errors: BTreeMap<String, u64>,
}

impl AttackMetrics {
    pub fn failures(&self) -> u64 {
        self.hits - self.successes
    }

    pub fn duration(&self) -> Duration {
        self.attack + self.wait
    }

    /// Issued hits per second.
    pub fn rate(&self) -> f64 {
        per_second(self.hits, self.attack)
    }

    /// Successful hits per second, wait time included.
    pub fn throughput(&self) -> f64 {
        per_second(self.successes, self.duration())
    }

    pub fn success_ratio(&self) -> f64 {
        if self.hits == 0 {
            return 0.;
        }
        self.successes as f64 / self.hits as f64
    }
}

fn per_second(count: u64, span: Duration) -> f64 {
    let secs = span.as_secs_f64();
    if secs == 0. { 0. } else { count as f64 / secs }
}

#[derive(Debug, Default)]
pub(super) struct MetricsCollector {
    hits: u64,
    successes: u64,
    first_issue: Option<Instant>,
    last_issue: Option<Instant>,
    last_completion: Option<Instant>,
    latencies: Vec<Duration>,
    errors: BTreeMap<String, u64>,
}

impl MetricsCollector {
    pub(super) fn observe(&mut self, result: HitResult) {
        self.hits += 1;

        self.first_issue = Some(
            self.first_issue
                .map_or(result.issued_at, |t| t.min(result.issued_at)),
        );
        self.last_issue = Some(
            self.last_issue
                .map_or(result.issued_at, |t| t.max(result.issued_at)),
        );
        self.last_completion = Some(
            self.last_completion
                .map_or(result.completed_at, |t| t.max(result.completed_at)),
        );

        self.latencies
            .push(result.completed_at.saturating_duration_since(result.issued_at));

        match result.error {
            None => self.successes += 1,
            Some(err) => *self.errors.entry(err).or_default() += 1,
        }
    }

    /// Counts a failed hit whose timing is unknown.
    pub(super) fn observe_lost(&mut self, error: String) {
        self.hits += 1;
        *self.errors.entry(error).or_default() += 1;
    }

    pub(super) fn finish(self) -> AttackMetrics {
        let attack = match (self.first_issue, self.last_issue) {
            (Some(first), Some(last)) => last.saturating_duration_since(first),
            _ => Duration::ZERO,
        };
        let wait = match (self.last_issue, self.last_completion) {
            (Some(last), Some(done)) => done.saturating_duration_since(last),
            _ => Duration::ZERO,
        };

        AttackMetrics {
            hits: self.hits,
            successes: self.successes,
            attack,
            wait,
            latencies: LatencyMetrics::from_latencies(self.latencies),
            errors: self.errors,
        }
    }
}
