use clap::Parser;
use rama::graceful::Shutdown;
use thrpt_lib::sample::{MemorySink, QueueLengthSample, SampleSink, ThroughputSample};
use tracing_test::traced_test;

use super::*;

#[derive(Debug, Default)]
struct Collect {
    samples: MemorySink,
    attack: Option<AttackInfo>,
    report: Option<AttackMetrics>,
    summary: Option<RunSummary>,
}

impl SampleSink for Collect {
    fn add_throughput(&mut self, sample: ThroughputSample) -> Result<(), BoxError> {
        self.samples.add_throughput(sample)
    }

    fn add_queue_length(&mut self, sample: QueueLengthSample) -> Result<(), BoxError> {
        self.samples.add_queue_length(sample)
    }
}

impl Reporter for Collect {
    fn on_attack_start(&mut self, attack: &AttackInfo) -> Result<(), BoxError> {
        self.attack = Some(attack.clone());
        Ok(())
    }

    fn on_attack_report(&mut self, metrics: &AttackMetrics) -> Result<(), BoxError> {
        self.report = Some(metrics.clone());
        Ok(())
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<(), BoxError> {
        self.summary = Some(summary.clone());
        Ok(())
    }
}

fn plan(rate: u64, duration: Duration, recheck_period: Duration) -> DrillPlan {
    DrillPlan {
        mode: AttackMode::Constant,
        rate,
        duration,
        concurrency: 64,
        max_hits: None,
        recheck_period,
        consecutive_quiet_periods: 2,
        estimated_total_events: 0,
        duplicate_policy: DuplicatePolicy::Abort,
        profiling: false,
        target: TargetConfig::default(),
    }
}

#[derive(Debug, Parser)]
struct Cli {
    #[command(flatten)]
    drill: DrillCommand,
}

fn resolve(args: &[&str]) -> DrillPlan {
    let cli = Cli::try_parse_from(std::iter::once("drill").chain(args.iter().copied())).unwrap();
    DrillPlan::resolve(cli.drill)
}

#[test]
fn resolve_defaults() {
    let plan = resolve(&[]);
    assert_eq!(plan.mode, AttackMode::Constant);
    assert_eq!(plan.rate, DEFAULT_RATE);
    assert_eq!(plan.duration, DEFAULT_DURATION);
    assert!(plan.concurrency > 0);
    assert_eq!(plan.max_hits, None);
    assert_eq!(plan.recheck_period, DEFAULT_RECHECK_PERIOD);
    assert_eq!(plan.consecutive_quiet_periods, DEFAULT_CONSECUTIVE_QUIET_PERIODS);
    assert_eq!(plan.estimated_total_events, 10_000);
    assert_eq!(plan.duplicate_policy, DuplicatePolicy::Abort);
    assert!(!plan.profiling);
}

#[test]
fn resolve_scenario_with_overwrites() {
    let plan = resolve(&[
        "--scenario",
        "saturation",
        "--rate",
        "100",
        "--max-hits",
        "500",
        "--duplicate-policy",
        "warn",
        "--profiling",
    ]);
    assert_eq!(plan.mode, AttackMode::Constant);
    assert_eq!(plan.rate, 100);
    assert_eq!(plan.duration, Duration::from_secs(10));
    assert_eq!(plan.concurrency, 512);
    assert_eq!(plan.max_hits, Some(500));
    assert_eq!(plan.recheck_period, Duration::from_secs(5));
    assert_eq!(plan.consecutive_quiet_periods, 3);
    // 1000 expected hits, capped by the hit limit
    assert_eq!(plan.estimated_total_events, 500);
    assert_eq!(plan.target.error_rate, Some(0.01));
    assert_eq!(plan.duplicate_policy, DuplicatePolicy::Warn);
    assert!(plan.profiling);
}

#[test]
#[traced_test]
fn resolve_caps_presized_store() {
    let plan = resolve(&["--rate", "1000000000", "--duration", "1h"]);
    assert_eq!(plan.estimated_total_events, MAX_PRESIZED_EVENTS);
    assert!(logs_contain("too large to pre-size the store"));

    let plan = resolve(&["--estimated-total-events", "42"]);
    assert_eq!(plan.estimated_total_events, 42);

    let plan = resolve(&["--estimated-total-events", "100000000000"]);
    assert_eq!(plan.estimated_total_events, MAX_PRESIZED_EVENTS);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn constant_drill_measures_rate() {
    let shutdown = Shutdown::new(std::future::pending::<()>());
    let mut plan = plan(1_000, Duration::from_secs(10), Duration::from_secs(1));
    plan.max_hits = Some(10_000);
    plan.estimated_total_events = 10_000;

    let mut reporter = Collect::default();
    let summary = run_drill(&shutdown.guard(), plan.clone(), &mut reporter)
        .await
        .unwrap();

    assert_eq!(summary.hits, 10_000);
    assert_eq!(summary.recorded, 10_000);
    assert_eq!(summary.duplicates, 0);
    assert!(
        (summary.peak_throughput - 1_000.).abs() <= 20.,
        "peak throughput: {}",
        summary.peak_throughput
    );

    // the last event may arrive anywhere within a recheck period
    let max_delay = QuiescenceDetector::new(plan.recheck_period, plan.consecutive_quiet_periods)
        .max_detection_delay();
    let delay = summary.detection_delay.unwrap();
    assert!(delay <= max_delay, "detection delay: {delay:?}");
    assert!(delay >= plan.recheck_period * plan.consecutive_quiet_periods);

    assert_eq!(reporter.samples.throughput.len(), 10_000);
    assert!(reporter.samples.queue_length.is_empty());
    assert_eq!(reporter.attack.unwrap().max_hits, Some(10_000));
    assert_eq!(reporter.report.unwrap().hits, 10_000);
    assert_eq!(reporter.summary, Some(summary));
    assert!(logs_contain("received 10000 event(s)"));
    assert!(logs_contain("end of traffic is detected at most 3s after the last event"));
}

#[tokio::test(start_paused = true)]
async fn short_attack_is_measured() {
    let shutdown = Shutdown::new(std::future::pending::<()>());
    // the attack ends before the first poll for an event
    let plan = plan(1_000, Duration::from_millis(200), Duration::from_millis(100));
    assert!(plan.duration + plan.recheck_period < FIRST_EVENT_POLL_PERIOD);

    let mut reporter = Collect::default();
    let summary = run_drill(&shutdown.guard(), plan, &mut reporter)
        .await
        .unwrap();

    assert_eq!(summary.hits, 200);
    assert_eq!(summary.recorded, 200);
    assert!(summary.detection_delay.is_some());
    assert_eq!(reporter.samples.throughput.len(), 200);
}

#[tokio::test(start_paused = true)]
async fn profiling_samples_queue_length() {
    let shutdown = Shutdown::new(std::future::pending::<()>());
    let mut plan = plan(100, Duration::from_secs(1), Duration::from_millis(200));
    plan.profiling = true;

    let mut reporter = Collect::default();
    let summary = run_drill(&shutdown.guard(), plan, &mut reporter)
        .await
        .unwrap();

    assert_eq!(summary.recorded, 100);
    assert!(!reporter.samples.queue_length.is_empty());

    // sampled on the receive clock: profiling starts once the first event
    // was seen, which is polled for after FIRST_EVENT_POLL_PERIOD
    let first_event = reporter.samples.throughput[0].ts;
    assert!(
        reporter
            .samples
            .queue_length
            .iter()
            .all(|sample| sample.ts >= first_event + FIRST_EVENT_POLL_PERIOD)
    );
    assert!(
        reporter
            .samples
            .queue_length
            .iter()
            .all(|sample| sample.length <= thrpt_lib::recorder::RECEIVE_BUFFER_SIZE as f64)
    );
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn duplicate_aborts_measurement() {
    let shutdown = Shutdown::new(std::future::pending::<()>());
    let mut plan = plan(100, Duration::from_secs(1), Duration::from_millis(200));
    plan.target.duplicate_rate = Some(1.);

    let mut reporter = Collect::default();
    let result = run_drill(&shutdown.guard(), plan, &mut reporter).await;

    assert!(result.is_err());
    assert!(reporter.summary.is_none());
    // the attack is cut short
    assert!(reporter.report.unwrap().hits < 100);
    assert!(logs_contain("abort measurement"));
}

#[tokio::test(start_paused = true)]
async fn duplicate_warn_keeps_measuring() {
    let shutdown = Shutdown::new(std::future::pending::<()>());
    let mut plan = plan(100, Duration::from_secs(1), Duration::from_millis(200));
    plan.target.duplicate_rate = Some(1.);
    plan.duplicate_policy = DuplicatePolicy::Warn;

    let mut reporter = Collect::default();
    let summary = run_drill(&shutdown.guard(), plan, &mut reporter)
        .await
        .unwrap();

    assert_eq!(summary.hits, 100);
    assert_eq!(summary.recorded, 100);
    assert_eq!(summary.duplicates, 100);
}

#[tokio::test(start_paused = true)]
async fn no_event_is_an_error() {
    let shutdown = Shutdown::new(std::future::pending::<()>());
    let mut plan = plan(100, Duration::from_secs(1), Duration::from_millis(200));
    plan.target.error_rate = Some(1.);

    let mut reporter = Collect::default();
    let err = run_drill(&shutdown.guard(), plan, &mut reporter)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("no event recorded"), "{err}");
    let report = reporter.report.unwrap();
    assert_eq!(report.hits, 100);
    assert_eq!(report.errors.get("emulated receiver error"), Some(&100));
}

#[tokio::test(start_paused = true)]
async fn invalid_ramp_is_rejected_before_attack() {
    let shutdown = Shutdown::new(std::future::pending::<()>());
    let mut plan = plan(3, Duration::from_secs(10), Duration::from_secs(1));
    plan.mode = AttackMode::Ramp;

    let mut reporter = Collect::default();
    assert!(
        run_drill(&shutdown.guard(), plan, &mut reporter)
            .await
            .is_err()
    );
    assert!(reporter.attack.is_none());
}
