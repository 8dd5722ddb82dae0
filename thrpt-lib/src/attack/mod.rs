//! Load generation driven by a [`Pacer`].
//!
//! The attack loop asks the pacer how long to wait before every hit, then
//! hands the hit to the target service on its own task. In-flight hits are
//! bounded by a semaphore; once saturated the loop falls behind schedule and
//! the pacer makes it catch up as soon as permits free up.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use rama::{Service, error::BoxError, telemetry::tracing};
use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinSet},
    time::{self, Instant},
};

use crate::{
    pacer::{Pace, Pacer},
    utils::env::compute_concurrent_request_count,
};

mod metrics;

pub use self::metrics::{AttackMetrics, LatencyMetrics};

use self::metrics::{HitResult, MetricsCollector};

#[cfg(test)]
mod tests;

/// A single request of an attack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    /// Identifier shared by all hits of an attack.
    pub run_id: u64,
    /// 0-based, in issue order.
    pub index: u64,
    pub issued_at: SystemTime,
}

impl Hit {
    /// Event identifier unique across attacks (given distinct run identifiers).
    pub fn event_id(&self) -> String {
        format!("{:016x}-{:016x}", self.run_id, self.index)
    }
}

#[derive(Debug, Clone)]
pub struct Attacker<P> {
    pacer: P,
    duration: Duration,
    concurrency: usize,
    max_hits: Option<u64>,
    run_id: u64,
}

impl<P: Pacer> Attacker<P> {
    /// Creates an attacker issuing hits paced by `pacer` for `duration`,
    /// with a random run identifier and the default concurrency.
    pub fn new(pacer: P, duration: Duration) -> Self {
        Self {
            pacer,
            duration,
            concurrency: compute_concurrent_request_count(),
            max_hits: None,
            run_id: rand::random(),
        }
    }

    /// Maximum amount of in-flight hits, at least 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Stops the attack once `max_hits` hits were issued.
    pub fn with_max_hits(mut self, max_hits: u64) -> Self {
        self.max_hits = Some(max_hits);
        self
    }

    pub fn with_run_id(mut self, run_id: u64) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Runs the attack against `target`.
    ///
    /// Issuing stops once the next hit would be issued after the attack
    /// duration, when the pacer stops, when the hit limit is reached or when
    /// `cancel` resolves. Hits still in flight are awaited in all cases.
    pub async fn attack<S, F>(&self, target: Arc<S>, cancel: F) -> AttackMetrics
    where
        S: Service<Hit, Error: Into<BoxError>>,
        F: Future,
    {
        tracing::info!(
            pacer = %self.pacer,
            duration = ?self.duration,
            concurrency = self.concurrency,
            max_hits = ?self.max_hits,
            run_id = %format_args!("{:016x}", self.run_id),
            "start attack",
        );

        let limit = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight = JoinSet::new();
        let mut collector = MetricsCollector::default();
        let mut cancel = std::pin::pin!(cancel);

        let start = Instant::now();
        let mut hits: u64 = 0;

        loop {
            if self.max_hits.is_some_and(|max| hits >= max) {
                tracing::debug!(%hits, "stop attack: hit limit reached");
                break;
            }

            let elapsed = start.elapsed();
            let wait = match self.pacer.pace(elapsed, hits) {
                Pace::Stop => {
                    tracing::warn!(%hits, ?elapsed, "stop attack: pacer requested stop");
                    break;
                }
                Pace::Wait(wait) => wait,
            };
            if elapsed.saturating_add(wait) > self.duration {
                tracing::debug!(%hits, ?elapsed, "stop attack: duration reached");
                break;
            }

            let permit = tokio::select! {
                biased;

                _ = cancel.as_mut() => {
                    tracing::info!(%hits, "stop attack: cancelled");
                    break;
                }
                permit = async {
                    if !wait.is_zero() {
                        time::sleep(wait).await;
                    }
                    limit.clone().acquire_owned().await
                } => match permit {
                    Ok(permit) => permit,
                    Err(err) => {
                        tracing::error!("stop attack: concurrency limit closed: {err}");
                        break;
                    }
                },
            };

            if start.elapsed() > self.duration {
                tracing::debug!(%hits, "stop attack: duration reached while waiting for a permit");
                break;
            }

            let hit = Hit {
                run_id: self.run_id,
                index: hits,
                issued_at: SystemTime::now(),
            };
            let target = target.clone();
            let issued_at = Instant::now();
            in_flight.spawn(async move {
                let result = target.serve(hit).await;
                drop(permit);
                HitResult {
                    issued_at,
                    completed_at: Instant::now(),
                    error: result.err().map(|err| Into::<BoxError>::into(err).to_string()),
                }
            });
            hits += 1;

            while let Some(result) = in_flight.try_join_next() {
                observe(&mut collector, result);
            }
        }

        tracing::debug!(in_flight = in_flight.len(), "wait for in-flight hits");
        while let Some(result) = in_flight.join_next().await {
            observe(&mut collector, result);
        }

        let metrics = collector.finish();
        tracing::info!(
            hits = metrics.hits,
            successes = metrics.successes,
            attack = ?metrics.attack,
            wait = ?metrics.wait,
            "attack finished",
        );
        metrics
    }
}

fn observe(collector: &mut MetricsCollector, result: Result<HitResult, JoinError>) {
    match result {
        Ok(result) => collector.observe(result),
        Err(err) => {
            tracing::error!("hit task failed: {err}");
            collector.observe_lost(format!("hit task failed: {err}"));
        }
    }
}
