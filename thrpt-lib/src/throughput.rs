//! Instantaneous throughput computed from event receive times.
//!
//! For every event, in chronological order, the throughput is the amount of
//! events received within the trailing window ending at that event (the
//! event itself included). A trailing pointer makes this a single linear
//! pass over the sorted timestamps.

use std::time::{Duration, SystemTime};

use rama::error::{BoxError, ErrorContext as _};

use crate::{
    recorder::EventStore,
    sample::{SampleSink, ThroughputSample},
};

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Receive times of all recorded events, sorted ascending.
pub fn sorted_timestamps(store: &EventStore) -> Vec<SystemTime> {
    let mut timestamps: Vec<_> = store.values().copied().collect();
    timestamps.sort_unstable();
    timestamps
}

/// Iterator over the throughput samples of ascending `timestamps`.
///
/// An event exactly `window` older than the current one is still counted.
#[derive(Debug, Clone)]
pub struct ThroughputCurve<'a> {
    timestamps: &'a [SystemTime],
    window: Duration,
    trailing: usize,
    next: usize,
}

impl<'a> ThroughputCurve<'a> {
    pub fn new(timestamps: &'a [SystemTime], window: Duration) -> Self {
        debug_assert!(timestamps.is_sorted(), "timestamps must be sorted");
        Self {
            timestamps,
            window,
            trailing: 0,
            next: 0,
        }
    }
}

impl Iterator for ThroughputCurve<'_> {
    type Item = ThroughputSample;

    fn next(&mut self) -> Option<Self::Item> {
        let ts = *self.timestamps.get(self.next)?;

        while self.trailing < self.next
            && ts
                .duration_since(self.timestamps[self.trailing])
                .unwrap_or_default()
                > self.window
        {
            self.trailing += 1;
        }

        let rate = (self.next - self.trailing + 1) as f64;
        self.next += 1;

        Some(ThroughputSample { ts, rate })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.timestamps.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ThroughputCurve<'_> {}

pub fn throughput_curve(timestamps: &[SystemTime], window: Duration) -> Vec<ThroughputSample> {
    ThroughputCurve::new(timestamps, window).collect()
}

/// Pushes one sample per timestamp into `sink`, in chronological order.
///
/// Stops at the first sink failure. Returns the amount of samples published.
pub fn publish_throughput<S>(
    timestamps: &[SystemTime],
    window: Duration,
    sink: &mut S,
) -> Result<usize, BoxError>
where
    S: SampleSink + ?Sized,
{
    let mut published = 0;
    for sample in ThroughputCurve::new(timestamps, window) {
        sink.add_throughput(sample)
            .context("publish throughput sample")
            .context_debug_field("published", published)?;
        published += 1;
    }
    Ok(published)
}
