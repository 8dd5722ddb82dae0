use super::merge_config;

/// Behavior of the emulated receiver, the in-process system under test.
/// This models processing cost and instability.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct TargetConfig {
    /// Base processing time of a hit (e.g. `2ms`).
    #[arg(long)]
    pub base_latency: Option<humantime::Duration>,

    /// Random delay added to or removed from the base latency.
    #[arg(long)]
    pub jitter: Option<humantime::Duration>,

    /// Probability of failing a hit without recording its event.
    #[arg(long)]
    pub error_rate: Option<f64>,

    /// Probability of recording the event of a hit twice.
    #[arg(long)]
    pub duplicate_rate: Option<f64>,
}

impl TargetConfig {
    pub fn merge_over(self, base: Self) -> Self {
        merge_config!(TargetConfig, base, self, {
            base_latency,
            jitter,
            error_rate,
            duplicate_rate,
        })
    }
}
