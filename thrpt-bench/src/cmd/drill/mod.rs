use std::{
    io,
    sync::Arc,
    time::{Duration, SystemTime},
};

use rama::{
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    telemetry::tracing,
};

use clap::Args;
use thrpt_lib::{
    attack::{AttackMetrics, Attacker},
    profiler::{QUEUE_LENGTH_POLL_PERIOD, run_queue_profiler},
    quiescence::{
        DEFAULT_CONSECUTIVE_QUIET_PERIODS, DEFAULT_RECHECK_PERIOD, FIRST_EVENT_POLL_PERIOD,
        Outcome, QuiescenceDetector, wait_for_first_event,
    },
    recorder::{DuplicatePolicy, EventRecorder},
    throughput::{DEFAULT_WINDOW, ThroughputCurve, publish_throughput, sorted_timestamps},
    utils::env::compute_concurrent_request_count,
};
use tokio::sync::{oneshot, watch};

use crate::{
    config::{
        AttackConfig, AttackMode, DuplicatePolicyArg, ReceiverConfig, Scenario, TargetConfig,
    },
    report::{AttackInfo, HumanReporter, JsonlReporter, Reporter, RunSummary},
};

mod target;

use self::target::EmulatedReceiver;

#[cfg(test)]
mod tests;

const DEFAULT_RATE: u64 = 1_000;
const DEFAULT_DURATION: Duration = Duration::from_secs(10);

/// Upper bound of the event store pre-allocation.
const MAX_PRESIZED_EVENTS: usize = 10_000_000;

#[derive(Debug, Clone, Args)]
/// attack an emulated receiver and measure the throughput it records
pub struct DrillCommand {
    #[clap(flatten)]
    attack: Option<AttackConfig>,

    #[clap(flatten)]
    receiver: Option<ReceiverConfig>,

    #[clap(flatten)]
    target: Option<TargetConfig>,

    #[arg(long)]
    /// Scenario to run,
    /// manually defined parameters overwrite scenario parameters.
    scenario: Option<Scenario>,

    /// sample the recorder queue length while events are received
    #[arg(long, default_value_t = false)]
    profiling: bool,

    /// what to do when the same event is received twice
    #[arg(long, value_enum, default_value_t = DuplicatePolicyArg::Abort)]
    duplicate_policy: DuplicatePolicyArg,

    /// report json lines instead of a human-friendly format
    #[arg(long, default_value_t = false)]
    json: bool,
}

pub async fn exec(guard: ShutdownGuard, args: DrillCommand) -> Result<(), BoxError> {
    let json = args.json;
    let plan = DrillPlan::resolve(args);

    let mut reporter: Box<dyn Reporter> = if json {
        Box::new(JsonlReporter::new(io::stdout()))
    } else {
        Box::new(HumanReporter::new(io::stdout()))
    };

    let summary = run_drill(&guard, plan, &mut *reporter).await?;
    tracing::debug!(?summary, "drill finished");
    Ok(())
}

/// Fully resolved drill parameters.
#[derive(Debug, Clone)]
pub struct DrillPlan {
    pub mode: AttackMode,
    pub rate: u64,
    pub duration: Duration,
    pub concurrency: usize,
    pub max_hits: Option<u64>,
    pub recheck_period: Duration,
    pub consecutive_quiet_periods: u32,
    pub estimated_total_events: usize,
    pub duplicate_policy: DuplicatePolicy,
    pub profiling: bool,
    pub target: TargetConfig,
}

impl DrillPlan {
    fn resolve(args: DrillCommand) -> Self {
        let (attack_base, receiver_base, target_base) = match args.scenario {
            Some(scenario) => {
                tracing::info!("use scenario to define base config: {scenario:?}");
                (
                    scenario.attack_config(),
                    scenario.receiver_config(),
                    scenario.target_config(),
                )
            }
            None => {
                tracing::info!("no scenario defined, use default as base config");
                Default::default()
            }
        };

        let attack = args.attack.unwrap_or_default().merge_over(attack_base);
        let receiver = args.receiver.unwrap_or_default().merge_over(receiver_base);
        let target = args.target.unwrap_or_default().merge_over(target_base);

        let mode = attack.mode.unwrap_or_default();
        let rate = attack.rate.unwrap_or(DEFAULT_RATE);
        let duration = attack.duration.map(Into::into).unwrap_or(DEFAULT_DURATION);
        let concurrency = match attack.concurrency {
            Some(c) if c > 0 => c,
            _ => compute_concurrent_request_count(),
        };

        let estimated_total_events = match receiver.estimated_total_events {
            Some(estimate) => estimate as f64,
            None => {
                let expected = (rate as f64 * duration.as_secs_f64()).ceil();
                attack
                    .max_hits
                    .map_or(expected, |max| expected.min(max as f64))
            }
        };
        let estimated_total_events = if estimated_total_events > MAX_PRESIZED_EVENTS as f64 {
            tracing::warn!(
                estimated = %estimated_total_events,
                "estimated event count too large to pre-size the store: cap to {MAX_PRESIZED_EVENTS}",
            );
            MAX_PRESIZED_EVENTS
        } else {
            estimated_total_events as usize
        };

        let plan = Self {
            mode,
            rate,
            duration,
            concurrency,
            max_hits: attack.max_hits,
            recheck_period: receiver
                .recheck_period
                .map(Into::into)
                .unwrap_or(DEFAULT_RECHECK_PERIOD),
            consecutive_quiet_periods: receiver
                .consecutive_quiet_periods
                .unwrap_or(DEFAULT_CONSECUTIVE_QUIET_PERIODS),
            estimated_total_events,
            duplicate_policy: args.duplicate_policy.into(),
            profiling: args.profiling,
            target,
        };
        tracing::info!(?plan, "drill plan ready");
        plan
    }
}

enum Observation {
    Quiescent { detected_at: SystemTime },
    Interrupted,
    NoEvent,
}

/// Attacks an emulated receiver, waits until it received the last event and
/// analyses the receive times of all recorded events.
///
/// A shutdown while running yields the partial results.
pub async fn run_drill<R>(
    guard: &ShutdownGuard,
    plan: DrillPlan,
    reporter: &mut R,
) -> Result<RunSummary, BoxError>
where
    R: Reporter + ?Sized,
{
    let pacer = plan
        .mode
        .pacer(plan.rate, plan.duration)
        .context("create pacer")?;

    let (recorder, worker) = EventRecorder::new(plan.estimated_total_events, plan.duplicate_policy);
    let receiver = Arc::new(
        EmulatedReceiver::try_new(plan.target.clone(), recorder.clone())
            .context("create emulated receiver")?,
    );

    let mut attacker = Attacker::new(pacer, plan.duration).with_concurrency(plan.concurrency);
    if let Some(max_hits) = plan.max_hits {
        attacker = attacker.with_max_hits(max_hits);
    }

    reporter.on_attack_start(&AttackInfo {
        pacer: attacker.pacer().to_string(),
        duration: attacker.duration(),
        concurrency: attacker.concurrency(),
        max_hits: plan.max_hits,
        run_id: attacker.run_id(),
    })?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let (worker_stopped_tx, worker_stopped_rx) = watch::channel(false);
    let (attack_done_tx, attack_done_rx) = watch::channel(false);

    let worker_run = worker.run(first_of(guard.cancelled(), stop_rx));
    let worker = async move {
        let result = worker_run.await;
        let _ = worker_stopped_tx.send(true);
        result
    };

    let interrupted = {
        let worker_stopped_rx = &worker_stopped_rx;
        move || first_of(guard.cancelled(), is_set(worker_stopped_rx.clone()))
    };

    let attack = async {
        let metrics = attacker.attack(receiver.clone(), interrupted()).await;
        let _ = attack_done_tx.send(true);
        metrics
    };

    let observe = async {
        // without any event in the period following the attack, none will come
        let no_traffic = async {
            is_set(attack_done_rx.clone()).await;
            tokio::time::sleep(plan.recheck_period).await;
        };
        let mut no_event = false;
        let received = wait_for_first_event(&recorder, FIRST_EVENT_POLL_PERIOD, async {
            tokio::select! {
                _ = interrupted() => {}
                _ = no_traffic => no_event = true,
            }
        })
        .await;
        if !received {
            return if no_event {
                Observation::NoEvent
            } else {
                Observation::Interrupted
            };
        }
        tracing::info!("first event recorded: wait for the end of traffic");

        let detector = QuiescenceDetector::new(plan.recheck_period, plan.consecutive_quiet_periods);
        tracing::info!(
            "end of traffic is detected at most {:?} after the last event",
            detector.max_detection_delay(),
        );
        let outcome = if plan.profiling {
            let (profiler_stop_tx, profiler_stop_rx) = oneshot::channel::<()>();
            let (outcome, samples) = tokio::join!(
                async {
                    let outcome = detector.wait_until_quiescent(&recorder, interrupted()).await;
                    let _ = profiler_stop_tx.send(());
                    outcome
                },
                run_queue_profiler(
                    &recorder,
                    &mut *reporter,
                    QUEUE_LENGTH_POLL_PERIOD,
                    profiler_stop_rx
                ),
            );
            tracing::debug!(%samples, "queue length profiling done");
            outcome
        } else {
            detector.wait_until_quiescent(&recorder, interrupted()).await
        };

        match outcome {
            Outcome::Quiescent => Observation::Quiescent {
                detected_at: recorder.now(),
            },
            Outcome::Cancelled => Observation::Interrupted,
        }
    };

    let measure = async {
        let (metrics, observation) = tokio::join!(attack, observe);
        let _ = stop_tx.send(());
        (metrics, observation)
    };

    let (worker_result, (metrics, observation)) = tokio::join!(worker, measure);

    reporter.on_attack_report(&metrics)?;

    if let Err(err) = &worker_result {
        tracing::error!("abort measurement: {err}");
    }
    worker_result.context("abort measurement")?;

    let detected_at = match observation {
        Observation::Quiescent { detected_at } => Some(detected_at),
        Observation::Interrupted => {
            tracing::warn!("drill interrupted: report partial results");
            None
        }
        Observation::NoEvent => {
            return Err(BoxError::from(
                "no event recorded: the receiver did not record any event of the attack",
            ));
        }
    };

    let summary = analyse(&recorder, &metrics, detected_at, reporter)?;
    reporter.finish(&summary)?;
    Ok(summary)
}

fn analyse<R>(
    recorder: &EventRecorder,
    metrics: &AttackMetrics,
    detected_at: Option<SystemTime>,
    reporter: &mut R,
) -> Result<RunSummary, BoxError>
where
    R: Reporter + ?Sized,
{
    let store = recorder.recorded();
    tracing::info!(recorded = store.len(), "received {} event(s)", store.len());

    let timestamps = sorted_timestamps(&store);
    publish_throughput(&timestamps, DEFAULT_WINDOW, reporter).context("publish throughput")?;

    let peak_throughput = ThroughputCurve::new(&timestamps, DEFAULT_WINDOW)
        .map(|sample| sample.rate)
        .fold(0., f64::max);

    let receive_span = match (timestamps.first(), timestamps.last()) {
        (Some(first), Some(last)) => last.duration_since(*first).unwrap_or_default(),
        _ => Duration::ZERO,
    };
    let mean_throughput = if receive_span.is_zero() {
        timestamps.len() as f64
    } else {
        timestamps.len() as f64 / receive_span.as_secs_f64()
    };

    let detection_delay = detected_at
        .zip(timestamps.last())
        .map(|(detected_at, last)| detected_at.duration_since(*last).unwrap_or_default());

    Ok(RunSummary {
        hits: metrics.hits,
        recorded: store.len(),
        duplicates: recorder.duplicates(),
        receive_span,
        peak_throughput,
        mean_throughput,
        detection_delay,
    })
}

async fn first_of(a: impl Future, b: impl Future) {
    tokio::select! {
        _ = a => {}
        _ = b => {}
    }
}

/// Resolves once the flag is set or its sender dropped.
async fn is_set(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|set| *set).await;
}
