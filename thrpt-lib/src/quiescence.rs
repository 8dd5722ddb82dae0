//! Detection of the end of incoming traffic.
//!
//! The detector polls the amount of recorded events at a fixed period and
//! declares traffic over once that amount did not grow for a configured number
//! of consecutive periods. The end of traffic is detected between
//! `max_quiet_periods` and `max_quiet_periods + 1` recheck periods after the
//! last event, as that event may fall anywhere within a period.

use std::{sync::Arc, time::Duration};

use rama::telemetry::tracing;
use tokio::time::{self, Instant, MissedTickBehavior};

pub const DEFAULT_RECHECK_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_CONSECUTIVE_QUIET_PERIODS: u32 = 2;

/// Period at which [`wait_for_first_event`] is usually polled.
pub const FIRST_EVENT_POLL_PERIOD: Duration = Duration::from_millis(500);

/// Source of the amount of events recorded so far.
pub trait EventCounter: Send + Sync {
    fn recorded_count(&self) -> usize;
}

impl<C: EventCounter + ?Sized> EventCounter for Arc<C> {
    fn recorded_count(&self) -> usize {
        (**self).recorded_count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Events are still arriving.
    Active,
    /// No event arrived for the configured amount of consecutive periods.
    Quiescent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Quiescent,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct QuiescenceDetector {
    recheck_period: Duration,
    max_quiet_periods: u32,
    quiet_periods: u32,
    last_count: usize,
    state: State,
}

impl QuiescenceDetector {
    /// A `max_quiet_periods` of zero is treated as one.
    pub fn new(recheck_period: Duration, max_quiet_periods: u32) -> Self {
        Self {
            recheck_period,
            max_quiet_periods: max_quiet_periods.max(1),
            quiet_periods: 0,
            last_count: 0,
            state: State::Active,
        }
    }

    pub fn recheck_period(&self) -> Duration {
        self.recheck_period
    }

    pub fn max_quiet_periods(&self) -> u32 {
        self.max_quiet_periods
    }

    pub fn quiet_periods(&self) -> u32 {
        self.quiet_periods
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Upper bound between the last event and the detection of quiescence,
    /// saturating at [`Duration::MAX`].
    pub fn max_detection_delay(&self) -> Duration {
        self.recheck_period
            .checked_mul(self.max_quiet_periods.saturating_add(1))
            .unwrap_or(Duration::MAX)
    }

    /// Feeds the event count sampled at the end of a period.
    pub fn observe(&mut self, count: usize) -> State {
        if self.state == State::Quiescent {
            return State::Quiescent;
        }

        if count > self.last_count {
            self.quiet_periods = 0;
        } else {
            self.quiet_periods += 1;
            tracing::info!(
                quiet_periods = self.quiet_periods,
                max_quiet_periods = self.max_quiet_periods,
                "observed {} period(s) without event",
                self.quiet_periods,
            );
        }
        self.last_count = count;

        if self.quiet_periods >= self.max_quiet_periods {
            self.state = State::Quiescent;
        }
        self.state
    }

    /// Polls `counter` every recheck period until quiescence,
    /// or until `cancel` resolves.
    pub async fn wait_until_quiescent<C, F>(mut self, counter: &C, cancel: F) -> Outcome
    where
        C: EventCounter + ?Sized,
        F: Future,
    {
        self.last_count = counter.recorded_count();

        let mut ticker = time::interval_at(Instant::now() + self.recheck_period, self.recheck_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut cancel = std::pin::pin!(cancel);

        loop {
            tokio::select! {
                _ = cancel.as_mut() => {
                    tracing::debug!("stop waiting for quiescence: cancelled");
                    return Outcome::Cancelled;
                }
                _ = ticker.tick() => {
                    if self.observe(counter.recorded_count()) == State::Quiescent {
                        tracing::info!(
                            recorded = self.last_count,
                            "no more events recorded for {} consecutive period(s) of {:?}",
                            self.max_quiet_periods,
                            self.recheck_period,
                        );
                        return Outcome::Quiescent;
                    }
                }
            }
        }
    }
}

impl Default for QuiescenceDetector {
    fn default() -> Self {
        Self::new(DEFAULT_RECHECK_PERIOD, DEFAULT_CONSECUTIVE_QUIET_PERIODS)
    }
}

/// Polls `counter` until at least one event is recorded.
///
/// When `cancel` resolves first the counter is read one last time, so an
/// event recorded since the previous poll is not missed. Returns `false` only
/// if no event was recorded at all.
pub async fn wait_for_first_event<C, F>(counter: &C, poll_period: Duration, cancel: F) -> bool
where
    C: EventCounter + ?Sized,
    F: Future,
{
    let mut ticker = time::interval_at(Instant::now() + poll_period, poll_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut cancel = std::pin::pin!(cancel);

    loop {
        tokio::select! {
            _ = cancel.as_mut() => {
                let received = counter.recorded_count() > 0;
                tracing::debug!(%received, "stop waiting for first event: cancelled");
                return received;
            }
            _ = ticker.tick() => {
                if counter.recorded_count() > 0 {
                    return true;
                }
            }
        }
    }
}
