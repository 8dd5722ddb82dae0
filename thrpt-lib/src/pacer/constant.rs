use std::{fmt, time::Duration};

use super::{Pace, Pacer};

/// Paces an attack at a constant rate of `freq` hits every `per`.
///
/// Hits are spread uniformly, `per / freq` apart. When the attack falls
/// behind schedule the next hit is issued immediately, so the average rate
/// recovers over the lifetime of the attack.
///
/// A `freq` of zero means an unlimited rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantPacer {
    freq: u64,
    per: Duration,
}

impl ConstantPacer {
    pub const fn new(freq: u64, per: Duration) -> Self {
        Self { freq, per }
    }

    pub const fn per_second(freq: u64) -> Self {
        Self::new(freq, Duration::from_secs(1))
    }

    pub fn freq(&self) -> u64 {
        self.freq
    }

    pub fn per(&self) -> Duration {
        self.per
    }

    fn is_unlimited(&self) -> bool {
        self.freq == 0 || self.per.is_zero()
    }
}

impl Pacer for ConstantPacer {
    fn pace(&self, elapsed: Duration, hits: u64) -> Pace {
        if self.is_unlimited() {
            return Pace::NOW;
        }

        let per = self.per.as_nanos();
        let periods = u64::try_from(elapsed.as_nanos() / per).unwrap_or(u64::MAX);
        let expected_hits = self.freq.saturating_mul(periods);
        if hits < expected_hits {
            // running behind, send next hit immediately
            return Pace::NOW;
        }

        let interval = u64::try_from(per / u128::from(self.freq)).unwrap_or(u64::MAX);
        if interval == 0 {
            // rate is finer than the clock resolution
            return Pace::NOW;
        }

        if (i64::MAX as u64) / interval < hits {
            // wait would overflow, stop the attack
            return Pace::Stop;
        }

        let next = Duration::from_nanos((hits + 1) * interval);
        Pace::Wait(next.saturating_sub(elapsed))
    }

    fn rate(&self, _elapsed: Duration) -> f64 {
        if self.is_unlimited() {
            return f64::INFINITY;
        }
        self.freq as f64 / self.per.as_secs_f64()
    }
}

impl fmt::Display for ConstantPacer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Constant{{{} hits/{:?}}}", self.freq, self.per)
    }
}
