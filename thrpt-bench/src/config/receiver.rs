use thrpt_lib::recorder::DuplicatePolicy;

use super::merge_config;

/// Event recording and end-of-traffic detection configuration.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ReceiverConfig {
    /// Period at which the amount of recorded events is checked (e.g. `5s`).
    #[arg(long)]
    pub recheck_period: Option<humantime::Duration>,

    /// Consecutive periods without new event after which traffic is considered over.
    #[arg(long, value_name = "N")]
    pub consecutive_quiet_periods: Option<u32>,

    /// Expected amount of events, used to pre-size the event store.
    #[arg(long, value_name = "N")]
    pub estimated_total_events: Option<usize>,
}

impl ReceiverConfig {
    pub fn merge_over(self, base: Self) -> Self {
        merge_config!(ReceiverConfig, base, self, {
            recheck_period,
            consecutive_quiet_periods,
            estimated_total_events,
        })
    }
}

/// What to do when an event ID is received twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DuplicatePolicyArg {
    /// Abort the measurement with an error.
    #[default]
    Abort,
    /// Log a warning and keep measuring.
    Warn,
}

impl From<DuplicatePolicyArg> for DuplicatePolicy {
    fn from(value: DuplicatePolicyArg) -> Self {
        match value {
            DuplicatePolicyArg::Abort => DuplicatePolicy::Abort,
            DuplicatePolicyArg::Warn => DuplicatePolicy::Warn,
        }
    }
}
