use std::{fmt, time::Duration};

use super::{Pace, Pacer};

/// Paces an attack in equal-duration intervals of increasing rate.
///
/// The attack starts at the interval rate for the first interval, and the
/// rate of interval `k` (1-indexed) is `k` times the interval rate. Once the
/// configured duration is exceeded the rate of the last interval is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampPacer {
    interval_rate: u64,
    intervals: u64,
    interval_duration: Duration,
}

impl RampPacer {
    /// Creates a ramp reaching `max_rate` (hits/sec) in the last of `intervals`
    /// intervals spread over `duration`.
    ///
    /// The interval rate is `max_rate / intervals` (integer division), so the
    /// effective max rate can be slightly lower than requested (e.g. `1234/5*5 = 1230`).
    pub fn try_new(max_rate: u64, intervals: u32, duration: Duration) -> Result<Self, RampPacerError> {
        if max_rate == 0 {
            return Err(RampPacerError::InfiniteRate);
        }
        if intervals == 0 {
            return Err(RampPacerError::NoIntervals);
        }

        let interval_rate = max_rate / u64::from(intervals);
        if interval_rate == 0 {
            return Err(RampPacerError::IntervalRateTooLow {
                max_rate,
                intervals,
            });
        }

        let interval_duration = duration / intervals;
        if interval_duration.is_zero() {
            return Err(RampPacerError::IntervalTooShort {
                duration,
                intervals,
            });
        }

        Ok(Self {
            interval_rate,
            intervals: u64::from(intervals),
            interval_duration,
        })
    }

    pub fn interval_rate(&self) -> u64 {
        self.interval_rate
    }

    pub fn intervals(&self) -> u64 {
        self.intervals
    }

    pub fn interval_duration(&self) -> Duration {
        self.interval_duration
    }

    /// 1-indexed interval the attack is in at the given elapsed time,
    /// saturating at the last interval.
    pub fn current_interval(&self, elapsed: Duration) -> u64 {
        let completed = elapsed.as_nanos() / self.interval_duration.as_nanos();
        u64::try_from(completed)
            .unwrap_or(u64::MAX)
            .saturating_add(1)
            .min(self.intervals)
    }

    /// Number of hits expected to have been sent at the given elapsed time.
    ///
    /// Fractional so that [`Pacer::pace`] knows exactly how far ahead of
    /// schedule the attack is.
    pub fn expected_hits(&self, elapsed: Duration) -> f64 {
        let current = self.current_interval(elapsed);
        let base_rate = self.interval_rate as f64;
        let interval_secs = self.interval_duration.as_secs_f64();

        let previous_intervals = interval_secs * (current - 1) as f64;
        let in_current = (elapsed.as_secs_f64() - previous_intervals).max(0.);

        let mut hits = in_current * base_rate * current as f64;
        for i in 1..current {
            hits += interval_secs * base_rate * i as f64;
        }
        hits
    }
}

impl Pacer for RampPacer {
    fn pace(&self, elapsed: Duration, hits: u64) -> Pace {
        let expected_hits = self.expected_hits(elapsed);
        if hits == 0 || hits < expected_hits as u64 {
            // running behind, send next hit immediately
            return Pace::NOW;
        }

        let interval = (1e9 / self.rate(elapsed)).round();
        let interval_nanos = interval as u64;
        if interval_nanos != 0 && (i64::MAX as u64) / interval_nanos < hits {
            // wait would overflow, stop the attack
            return Pace::Stop;
        }

        let delta = (hits + 1) as f64 - expected_hits;
        Pace::Wait(Duration::from_nanos((interval * delta) as u64))
    }

    fn rate(&self, elapsed: Duration) -> f64 {
        (self.interval_rate * self.current_interval(elapsed)) as f64
    }
}

impl fmt::Display for RampPacer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ramp{{{} intervals, {} hits/1s increments}}",
            self.intervals, self.interval_rate
        )
    }
}

/// Invalid ramp configuration, rejected before the attack starts.
#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum RampPacerError {
    InfiniteRate,
    NoIntervals,
    IntervalRateTooLow { max_rate: u64, intervals: u32 },
    IntervalTooShort { duration: Duration, intervals: u32 },
}

impl fmt::Display for RampPacerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RampPacerError::InfiniteRate => {
                write!(f, "infinite rate (0) makes no sense for a ramp attack")
            }
            RampPacerError::NoIntervals => {
                write!(f, "a ramp attack requires at least one interval")
            }
            RampPacerError::IntervalRateTooLow {
                max_rate,
                intervals,
            } => write!(
                f,
                "a rate of {max_rate} events/sec divided in {intervals} intervals would result in an interval rate < 1 event/sec"
            ),
            RampPacerError::IntervalTooShort {
                duration,
                intervals,
            } => write!(
                f,
                "a duration of {duration:?} divided in {intervals} intervals would result in empty intervals"
            ),
        }
    }
}

impl std::error::Error for RampPacerError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacer::{RAMP_INTERVALS, Schedule};

    fn pacer(max_rate: u64, duration: Duration) -> RampPacer {
        RampPacer::try_new(max_rate, RAMP_INTERVALS, duration).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let d = Duration::from_secs(10);
        assert_eq!(
            RampPacer::try_new(0, 5, d).unwrap_err(),
            RampPacerError::InfiniteRate
        );
        assert_eq!(
            RampPacer::try_new(100, 0, d).unwrap_err(),
            RampPacerError::NoIntervals
        );
        assert_eq!(
            RampPacer::try_new(4, 5, d).unwrap_err(),
            RampPacerError::IntervalRateTooLow {
                max_rate: 4,
                intervals: 5
            }
        );
        assert_eq!(
            RampPacer::try_new(100, 5, Duration::from_nanos(4)).unwrap_err(),
            RampPacerError::IntervalTooShort {
                duration: Duration::from_nanos(4),
                intervals: 5
            }
        );
        assert!(
            RampPacerError::IntervalRateTooLow {
                max_rate: 4,
                intervals: 5
            }
            .to_string()
            .contains("interval rate < 1 event/sec")
        );
    }

    #[test]
    fn integer_division_of_max_rate() {
        let p = pacer(1234, Duration::from_secs(5));
        assert_eq!(p.interval_rate(), 246);
        assert_eq!(p.rate(Duration::from_secs(100)), 1230.);
    }

    #[test]
    fn rate_increases_per_interval() {
        let p = pacer(1_000, Duration::from_secs(10));
        assert_eq!(p.interval_duration(), Duration::from_secs(2));

        for k in 1..=5u64 {
            let start = Duration::from_secs(2 * (k - 1));
            let end = start + Duration::from_millis(1_999);
            assert_eq!(p.current_interval(start), k);
            assert_eq!(p.rate(start), (200 * k) as f64);
            assert_eq!(p.rate(end), (200 * k) as f64);
        }

        // saturates at the last interval
        assert_eq!(p.current_interval(Duration::from_secs(10)), 5);
        assert_eq!(p.rate(Duration::from_secs(60)), 1_000.);
    }

    #[test]
    fn expected_hits_closed_form() {
        let p = pacer(1_000, Duration::from_secs(10));

        assert_eq!(p.expected_hits(Duration::ZERO), 0.);
        assert_eq!(p.expected_hits(Duration::from_secs(1)), 200.);
        // 400 in the first interval + 1s at 400/s
        assert_eq!(p.expected_hits(Duration::from_secs(3)), 800.);
        // 400 + 800 + 1200 + 1600 + 2000
        assert_eq!(p.expected_hits(Duration::from_secs(10)), 6_000.);
        // past the end, keeps going at the last interval rate
        assert_eq!(p.expected_hits(Duration::from_secs(11)), 7_000.);
    }

    #[test]
    fn first_hit_and_behind_schedule_fire_immediately() {
        let p = pacer(1_000, Duration::from_secs(10));
        assert_eq!(p.pace(Duration::ZERO, 0), Pace::NOW);
        assert_eq!(p.pace(Duration::from_secs(3), 700), Pace::NOW);
    }

    #[test]
    fn ahead_of_schedule_waits_proportionally() {
        let p = pacer(1_000, Duration::from_secs(10));

        // interval 2 runs at 400/s: 2.5ms per hit, 1 hit ahead
        assert_eq!(
            p.pace(Duration::from_secs(3), 800),
            Pace::Wait(Duration::from_micros(2_500))
        );
        // 4 hits ahead
        assert_eq!(
            p.pace(Duration::from_secs(3), 803),
            Pace::Wait(Duration::from_millis(10))
        );
    }

    #[test]
    fn overflow_stops_attack() {
        // interval rate of 1 hit/sec, so 1e9ns between hits
        let p = pacer(5, Duration::from_secs(10));
        let hits = (i64::MAX as u64) / 1_000_000_000 + 1;
        assert_eq!(p.pace(Duration::ZERO, hits), Pace::Stop);
        assert_eq!(p.pace(Duration::from_secs(5), u64::MAX), Pace::Stop);
    }

    #[test]
    fn short_ramp_hit_count() {
        // 5 intervals of 10ms: 1000, 2000, ... 5000 hits/sec
        let p = pacer(5_000, Duration::from_millis(50));
        let hits = Schedule::new(&p, Duration::from_millis(50)).count();
        assert!((148..=152).contains(&hits), "got {hits} hits");
    }

    #[test]
    fn hits_per_interval_converge() {
        let duration = Duration::from_secs(10);
        let p = pacer(1_000, duration);

        let mut per_interval = [0u64; 5];
        for at in Schedule::new(&p, duration) {
            // a hit issued exactly on a boundary closes the previous interval
            let idx = (at.as_nanos().saturating_sub(1) / p.interval_duration().as_nanos()) as usize;
            per_interval[idx.min(4)] += 1;
        }

        for (i, hits) in per_interval.iter().enumerate() {
            let k = i as f64 + 1.;
            let expected = p.interval_duration().as_secs_f64() * 200. * k;
            let error = (*hits as f64 - expected).abs() / expected;
            assert!(
                error <= 0.01,
                "interval {k}: expected ~{expected}, got {hits}"
            );
        }
    }

    #[test]
    fn display() {
        assert_eq!(
            pacer(5_000, Duration::from_secs(1)).to_string(),
            "Ramp{5 intervals, 1000 hits/1s increments}"
        );
    }
}
