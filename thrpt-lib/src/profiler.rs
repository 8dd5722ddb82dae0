//! Periodic sampling of the ingestion queue depth.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use rama::telemetry::tracing;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::sample::{QueueLengthSample, SampleSink};

pub const QUEUE_LENGTH_POLL_PERIOD: Duration = Duration::from_millis(100);

/// Exposes the amount of observations waiting to be processed.
pub trait QueueProfiler: Send + Sync {
    fn queue_length(&self) -> usize;

    /// Timestamp given to a sample taken now, on the clock the
    /// observations themselves are timestamped with.
    fn now(&self) -> SystemTime;
}

impl<P: QueueProfiler + ?Sized> QueueProfiler for Arc<P> {
    fn queue_length(&self) -> usize {
        (**self).queue_length()
    }

    fn now(&self) -> SystemTime {
        (**self).now()
    }
}

/// Samples `profiler` every `period` into `sink` until `cancel` resolves.
///
/// Sink failures are logged and do not stop the profiler.
/// Returns the amount of samples taken.
pub async fn run_queue_profiler<P, S, F>(
    profiler: &P,
    sink: &mut S,
    period: Duration,
    cancel: F,
) -> usize
where
    P: QueueProfiler + ?Sized,
    S: SampleSink + ?Sized,
    F: Future,
{
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut cancel = std::pin::pin!(cancel);
    let mut samples = 0;

    loop {
        tokio::select! {
            biased;

            _ = cancel.as_mut() => {
                tracing::debug!(%samples, "queue profiler stopped");
                return samples;
            }
            _ = ticker.tick() => {
                let sample = QueueLengthSample {
                    ts: profiler.now(),
                    length: profiler.queue_length() as f64,
                };
                samples += 1;
                if let Err(err) = sink.add_queue_length(sample) {
                    tracing::error!("failed to publish queue length sample: {err}");
                }
            }
        }
    }
}
