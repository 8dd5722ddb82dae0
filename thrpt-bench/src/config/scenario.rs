use std::time::Duration;

use super::{AttackConfig, AttackMode, ReceiverConfig, TargetConfig};

/// High level benchmark scenarios.
/// Each scenario is a preset of attack, receiver and target behavior.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum Scenario {
    /// Constant moderate load on a fast and reliable receiver.
    /// Used to measure the recording overhead.
    #[default]
    Steady,

    /// Load increasing in steps.
    /// Used to find the rate at which the receiver starts lagging.
    Ramp,

    /// Load above what the receiver can absorb, with occasional failures.
    /// Used to observe queuing and backpressure.
    Saturation,
}

fn duration(d: Duration) -> Option<humantime::Duration> {
    Some(d.into())
}

impl Scenario {
    pub fn attack_config(self) -> AttackConfig {
        match self {
            Scenario::Steady => AttackConfig {
                mode: Some(AttackMode::Constant),
                rate: Some(1_000),
                duration: duration(Duration::from_secs(10)),
                concurrency: None,
                max_hits: None,
            },

            Scenario::Ramp => AttackConfig {
                mode: Some(AttackMode::Ramp),
                rate: Some(5_000),
                duration: duration(Duration::from_secs(20)),
                concurrency: None,
                max_hits: None,
            },

            Scenario::Saturation => AttackConfig {
                mode: Some(AttackMode::Constant),
                rate: Some(20_000),
                duration: duration(Duration::from_secs(10)),
                // the receiver is the bottleneck, not the attacker
                concurrency: Some(512),
                max_hits: None,
            },
        }
    }

    pub fn receiver_config(self) -> ReceiverConfig {
        match self {
            Scenario::Steady => ReceiverConfig {
                recheck_period: duration(Duration::from_secs(1)),
                consecutive_quiet_periods: Some(2),
                estimated_total_events: None,
            },

            Scenario::Ramp => ReceiverConfig {
                recheck_period: duration(Duration::from_secs(2)),
                consecutive_quiet_periods: Some(2),
                estimated_total_events: None,
            },

            Scenario::Saturation => ReceiverConfig {
                recheck_period: duration(Duration::from_secs(5)),
                consecutive_quiet_periods: Some(3),
                estimated_total_events: None,
            },
        }
    }

    pub fn target_config(self) -> TargetConfig {
        match self {
            Scenario::Steady => TargetConfig {
                base_latency: duration(Duration::from_millis(1)),
                jitter: None,
                error_rate: None,
                duplicate_rate: None,
            },

            Scenario::Ramp => TargetConfig {
                base_latency: duration(Duration::from_millis(2)),
                jitter: duration(Duration::from_millis(1)),
                error_rate: None,
                duplicate_rate: None,
            },

            Scenario::Saturation => TargetConfig {
                base_latency: duration(Duration::from_millis(20)),
                jitter: duration(Duration::from_millis(10)),
                error_rate: Some(0.01),
                duplicate_rate: None,
            },
        }
    }
}
