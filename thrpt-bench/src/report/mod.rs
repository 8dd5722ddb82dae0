//! Presentation of a drill: attack parameters and report,
//! throughput and queue length samples, and the final summary.

use std::time::{Duration, SystemTime};

use rama::error::BoxError;
use thrpt_lib::{attack::AttackMetrics, sample::SampleSink};

mod human;
mod json;

pub use self::{human::HumanReporter, json::JsonlReporter};

pub trait Reporter: SampleSink {
    fn on_attack_start(&mut self, attack: &AttackInfo) -> Result<(), BoxError>;

    fn on_attack_report(&mut self, metrics: &AttackMetrics) -> Result<(), BoxError>;

    fn finish(&mut self, summary: &RunSummary) -> Result<(), BoxError>;
}

/// Parameters of the attack about to start.
#[derive(Debug, Clone)]
pub struct AttackInfo {
    pub pacer: String,
    pub duration: Duration,
    pub concurrency: usize,
    pub max_hits: Option<u64>,
    pub run_id: u64,
}

/// Outcome of a drill, from the receiver's point of view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub hits: u64,
    pub recorded: usize,
    pub duplicates: u64,
    /// Time between the first and the last received event.
    pub receive_span: Duration,
    pub peak_throughput: f64,
    /// Received events per second over the receive span.
    pub mean_throughput: f64,
    /// Time between the last received event and the detection of the end of
    /// traffic. Undefined when the drill was cancelled.
    pub detection_delay: Option<Duration>,
}

fn unix_millis(ts: SystemTime) -> u128 {
    ts.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
