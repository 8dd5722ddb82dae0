use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use rama::telemetry::tracing;
use tracing_test::traced_test;

use super::*;
use crate::pacer::ConstantPacer;

#[derive(Debug, Default)]
struct Target {
    latency: Duration,
    fail_odd: bool,
    indices: Mutex<Vec<u64>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Target {
    fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    fn indices(&self) -> Vec<u64> {
        let mut indices = self.indices.lock().clone();
        indices.sort_unstable();
        indices
    }
}

impl Service<Hit> for Target {
    type Output = ();
    type Error = BoxError;

    async fn serve(&self, hit: Hit) -> Result<Self::Output, Self::Error> {
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if !self.latency.is_zero() {
            time::sleep(self.latency).await;
        }

        self.indices.lock().push(hit.index);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_odd && hit.index % 2 == 1 {
            return Err(BoxError::from("odd index"));
        }
        Ok(())
    }
}

fn attacker(rate: u64, duration: Duration) -> Attacker<ConstantPacer> {
    Attacker::new(ConstantPacer::per_second(rate), duration)
        .with_concurrency(64)
        .with_run_id(0x7417)
}

#[test]
fn event_id_is_unique_per_run_and_index() {
    let hit = Hit {
        run_id: 0xabc,
        index: 5,
        issued_at: SystemTime::UNIX_EPOCH,
    };
    assert_eq!(hit.event_id(), "0000000000000abc-0000000000000005");

    let other_run = Hit {
        run_id: 0xabd,
        ..hit.clone()
    };
    assert_ne!(hit.event_id(), other_run.event_id());
}

#[tokio::test(start_paused = true)]
async fn constant_attack_issues_paced_hits() {
    let target = Arc::new(Target::default());

    let metrics = attacker(100, Duration::from_secs(1))
        .attack(target.clone(), std::future::pending::<()>())
        .await;

    assert_eq!(metrics.hits, 100);
    assert_eq!(metrics.successes, 100);
    assert!(metrics.errors.is_empty());
    assert_eq!(target.indices(), (0..100).collect::<Vec<_>>());
    // first hit at 10ms, last one at 1s
    assert_eq!(metrics.attack, Duration::from_millis(990));
    assert_eq!(metrics.wait, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn failed_hits_are_grouped_by_error() {
    let target = Arc::new(Target {
        fail_odd: true,
        ..Default::default()
    });

    let metrics = attacker(100, Duration::from_secs(1))
        .attack(target, std::future::pending::<()>())
        .await;

    assert_eq!(metrics.hits, 100);
    assert_eq!(metrics.successes, 50);
    assert_eq!(metrics.failures(), 50);
    assert_eq!(metrics.errors.len(), 1);
    assert_eq!(metrics.errors.get("odd index"), Some(&50));
}

#[tokio::test(start_paused = true)]
async fn latency_and_wait_are_measured() {
    let target = Arc::new(Target::with_latency(Duration::from_millis(30)));

    let metrics = attacker(10, Duration::from_secs(1))
        .attack(target, std::future::pending::<()>())
        .await;

    assert_eq!(metrics.hits, 10);
    assert_eq!(metrics.latencies.min, Duration::from_millis(30));
    assert_eq!(metrics.latencies.max, Duration::from_millis(30));
    assert_eq!(metrics.wait, Duration::from_millis(30));
}

#[tokio::test(start_paused = true)]
async fn hit_limit_ends_attack() {
    let target = Arc::new(Target::default());

    let start = Instant::now();
    let metrics = attacker(1_000, Duration::from_secs(10))
        .with_max_hits(25)
        .attack(target, std::future::pending::<()>())
        .await;

    assert_eq!(metrics.hits, 25);
    assert_eq!(start.elapsed(), Duration::from_millis(25));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn cancellation_ends_attack() {
    let target = Arc::new(Target::with_latency(Duration::from_millis(50)));

    let metrics = attacker(100, Duration::from_secs(1))
        .attack(target.clone(), time::sleep(Duration::from_millis(505)))
        .await;

    assert_eq!(metrics.hits, 50);
    // in-flight hits were awaited
    assert_eq!(target.indices().len(), 50);
    assert_eq!(target.in_flight.load(Ordering::SeqCst), 0);
    assert!(logs_contain("stop attack: cancelled"));
}

#[tokio::test(start_paused = true)]
async fn concurrency_bounds_in_flight_hits() {
    let target = Arc::new(Target::with_latency(Duration::from_millis(100)));

    let metrics = attacker(100, Duration::from_millis(200))
        .with_concurrency(2)
        .attack(target.clone(), std::future::pending::<()>())
        .await;

    assert_eq!(target.max_in_flight.load(Ordering::SeqCst), 2);
    // issued at 10, 20, 110 and 120ms
    assert_eq!(metrics.hits, 4);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn pacer_stop_ends_attack() {
    struct StopAfter(u64);

    impl fmt::Display for StopAfter {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "StopAfter{{{}}}", self.0)
        }
    }

    impl Pacer for StopAfter {
        fn pace(&self, _: Duration, hits: u64) -> Pace {
            if hits < self.0 { Pace::NOW } else { Pace::Stop }
        }

        fn rate(&self, _: Duration) -> f64 {
            0.
        }
    }

    let target = Arc::new(Target::default());
    let metrics = Attacker::new(StopAfter(3), Duration::from_secs(1))
        .attack(target, std::future::pending::<()>())
        .await;

    assert_eq!(metrics.hits, 3);
    assert!(logs_contain("pacer requested stop"));
}
