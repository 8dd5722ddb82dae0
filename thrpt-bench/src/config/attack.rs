use std::{fmt, time::Duration};

use thrpt_lib::pacer::{AnyPacer, ConstantPacer, RAMP_INTERVALS, RampPacer, RampPacerError};

use super::merge_config;

/// How the attack rate evolves over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum AttackMode {
    /// Same rate for the whole attack.
    #[default]
    Constant,
    /// Rate increasing in 5 equal steps up to the given rate.
    Ramp,
}

impl AttackMode {
    /// Pacer issuing `rate` hits/sec (the max rate for a ramp) over `duration`.
    pub fn pacer(self, rate: u64, duration: Duration) -> Result<AnyPacer, RampPacerError> {
        Ok(match self {
            Self::Constant => ConstantPacer::per_second(rate).into(),
            Self::Ramp => RampPacer::try_new(rate, RAMP_INTERVALS, duration)?.into(),
        })
    }
}

impl fmt::Display for AttackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant => f.write_str("constant"),
            Self::Ramp => f.write_str("ramp"),
        }
    }
}

/// Load generation configuration.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct AttackConfig {
    /// Pacing of the attack.
    #[arg(long, value_enum)]
    pub mode: Option<AttackMode>,

    /// Hits per second (max rate of a ramp attack).
    /// A constant attack with rate 0 is unlimited.
    #[arg(long, value_name = "HITS/SEC")]
    pub rate: Option<u64>,

    /// Duration of the attack (e.g. `10s`, `1m30s`).
    #[arg(long)]
    pub duration: Option<humantime::Duration>,

    /// Maximum number of in flight hits.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Stop the attack after this many hits.
    #[arg(long, value_name = "N")]
    pub max_hits: Option<u64>,
}

impl AttackConfig {
    pub fn merge_over(self, base: Self) -> Self {
        merge_config!(AttackConfig, base, self, {
            mode,
            rate,
            duration,
            concurrency,
            max_hits,
        })
    }
}
