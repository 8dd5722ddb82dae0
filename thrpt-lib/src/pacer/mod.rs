//! Attack pacing.
//!
//! A [`Pacer`] answers one question before every hit: how long should the
//! attack loop wait before issuing it? It is a pure function of the elapsed
//! attack time and the number of hits issued so far, so a single pacer can be
//! shared by any number of workers without synchronisation.

use std::{fmt, time::Duration};

mod constant;
mod ramp;

pub use self::{
    constant::ConstantPacer,
    ramp::{RampPacer, RampPacerError},
};

/// Number of intervals a ramp attack is divided into.
pub const RAMP_INTERVALS: u32 = 5;

/// Decision taken by a [`Pacer`] for the next hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Wait for the given duration, then issue the hit.
    ///
    /// A zero duration means the attack is behind schedule
    /// and the hit should be issued immediately.
    Wait(Duration),
    /// Stop the attack.
    Stop,
}

impl Pace {
    /// Issue the next hit right away.
    pub const NOW: Self = Self::Wait(Duration::ZERO);
}

pub trait Pacer: fmt::Display + Send + Sync + 'static {
    /// Returns the [`Pace`] for the next hit, given the elapsed time
    /// of the attack and the amount of hits issued so far.
    fn pace(&self, elapsed: Duration, hits: u64) -> Pace;

    /// Expected instantaneous hit rate (hits per second) at the given elapsed time.
    fn rate(&self, elapsed: Duration) -> f64;
}

impl<P: Pacer> Pacer for std::sync::Arc<P> {
    fn pace(&self, elapsed: Duration, hits: u64) -> Pace {
        (**self).pace(elapsed, hits)
    }

    fn rate(&self, elapsed: Duration) -> f64 {
        (**self).rate(elapsed)
    }
}

/// Either of the pacers supported by an attack.
#[derive(Debug, Clone)]
pub enum AnyPacer {
    Constant(ConstantPacer),
    Ramp(RampPacer),
}

impl From<ConstantPacer> for AnyPacer {
    fn from(value: ConstantPacer) -> Self {
        Self::Constant(value)
    }
}

impl From<RampPacer> for AnyPacer {
    fn from(value: RampPacer) -> Self {
        Self::Ramp(value)
    }
}

impl Pacer for AnyPacer {
    fn pace(&self, elapsed: Duration, hits: u64) -> Pace {
        match self {
            Self::Constant(p) => p.pace(elapsed, hits),
            Self::Ramp(p) => p.pace(elapsed, hits),
        }
    }

    fn rate(&self, elapsed: Duration) -> f64 {
        match self {
            Self::Constant(p) => p.rate(elapsed),
            Self::Ramp(p) => p.rate(elapsed),
        }
    }
}

impl fmt::Display for AnyPacer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(p) => p.fmt(f),
            Self::Ramp(p) => p.fmt(f),
        }
    }
}

/// Iterator over the offsets at which a pacer issues hits,
/// driven by a virtual clock instead of real sleeps.
///
/// Ends when the next hit would be issued after `duration`
/// or when the pacer stops. A pacer that never waits (unlimited rate)
/// yields forever, so bound it with [`Iterator::take`] in that case.
#[derive(Debug)]
pub struct Schedule<'a, P: ?Sized> {
    pacer: &'a P,
    duration: Duration,
    elapsed: Duration,
    hits: u64,
    done: bool,
}

impl<'a, P: Pacer + ?Sized> Schedule<'a, P> {
    pub fn new(pacer: &'a P, duration: Duration) -> Self {
        Self {
            pacer,
            duration,
            elapsed: Duration::ZERO,
            hits: 0,
            done: false,
        }
    }
}

impl<P: Pacer + ?Sized> Iterator for Schedule<'_, P> {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.pacer.pace(self.elapsed, self.hits) {
            Pace::Stop => {
                self.done = true;
                None
            }
            Pace::Wait(wait) => {
                let at = self.elapsed.saturating_add(wait);
                if at > self.duration {
                    self.done = true;
                    return None;
                }
                self.elapsed = at;
                self.hits += 1;
                Some(at)
            }
        }
    }
}
