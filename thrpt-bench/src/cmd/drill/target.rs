use std::time::Duration;

use rama::{Service, error::BoxError};
use thrpt_lib::{attack::Hit, recorder::EventRecorder};

use crate::config::TargetConfig;

/// In-process stand-in for the system under test:
/// every successful hit ends up as a recorded event.
#[derive(Debug)]
pub(super) struct EmulatedReceiver {
    base_latency: Duration,
    jitter: Duration,
    error_rate: f64,
    duplicate_rate: f64,
    recorder: EventRecorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Error,
    Duplicate,
    Ok,
}

impl EmulatedReceiver {
    pub(super) fn try_new(cfg: TargetConfig, recorder: EventRecorder) -> Result<Self, BoxError> {
        let base_latency = cfg.base_latency.map(Into::into).unwrap_or_default();
        let jitter = cfg.jitter.map(Into::into).unwrap_or_default();
        let error_rate = cfg.error_rate.unwrap_or_default();
        let duplicate_rate = cfg.duplicate_rate.unwrap_or_default();

        for (name, rate) in [("error_rate", error_rate), ("duplicate_rate", duplicate_rate)] {
            if !(0. ..=1.).contains(&rate) {
                return Err(BoxError::from(format!(
                    "{name} must be within [0, 1], got {rate}"
                )));
            }
        }
        if error_rate + duplicate_rate > 1. {
            return Err(BoxError::from("error_rate + duplicate_rate must be <= 1.0"));
        }

        Ok(Self {
            base_latency,
            jitter,
            error_rate,
            duplicate_rate,
            recorder,
        })
    }

    fn pick_outcome(&self) -> Outcome {
        let r: f64 = rand::random();

        let t_error = self.error_rate;
        let t_duplicate = t_error + self.duplicate_rate;

        if r < t_error {
            Outcome::Error
        } else if r < t_duplicate {
            Outcome::Duplicate
        } else {
            Outcome::Ok
        }
    }

    fn compute_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.base_latency;
        }

        let base = self.base_latency.as_secs_f64();
        let jitter = self.jitter.as_secs_f64();

        let u: f64 = rand::random();
        let delta = (u * jitter * 2.) - jitter;

        Duration::from_secs_f64((base + delta).max(0.))
    }
}

impl Service<Hit> for EmulatedReceiver {
    type Output = ();
    type Error = BoxError;

    async fn serve(&self, hit: Hit) -> Result<Self::Output, Self::Error> {
        let delay = self.compute_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.pick_outcome() {
            Outcome::Error => return Err(BoxError::from("emulated receiver error")),
            Outcome::Duplicate => {
                let id = hit.event_id();
                self.recorder.record(id.clone()).await;
                self.recorder.record(id).await;
            }
            Outcome::Ok => self.recorder.record(hit.event_id()).await,
        }
        Ok(())
    }
}
