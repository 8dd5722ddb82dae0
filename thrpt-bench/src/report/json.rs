use std::io::Write;

use rama::error::{BoxError, ErrorContext as _};
use serde_json::{Value, json};
use thrpt_lib::{
    attack::AttackMetrics,
    sample::{QueueLengthSample, SampleSink, ThroughputSample},
};

use super::{AttackInfo, Reporter, RunSummary, unix_millis};

/// Reports one JSON object per line, every sample included.
///
/// Each object carries a `type`: `attack`, `report`, `throughput`,
/// `queue_length` or `final`.
pub struct JsonlReporter<W> {
    out: W,
}

impl<W: Write + Send> JsonlReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, value: &Value) -> Result<(), BoxError> {
        serde_json::to_writer(&mut self.out, value).context("serialize json line")?;
        self.out.write_all(b"\n").context("write json line")
    }
}

impl<W: Write + Send> SampleSink for JsonlReporter<W> {
    fn add_throughput(&mut self, sample: ThroughputSample) -> Result<(), BoxError> {
        self.write_line(&json!({
            "type": "throughput",
            "ts": unix_millis(sample.ts),
            "rate": sample.rate,
        }))
    }

    fn add_queue_length(&mut self, sample: QueueLengthSample) -> Result<(), BoxError> {
        self.write_line(&json!({
            "type": "queue_length",
            "ts": unix_millis(sample.ts),
            "length": sample.length,
        }))
    }
}

impl<W: Write + Send> Reporter for JsonlReporter<W> {
    fn on_attack_start(&mut self, attack: &AttackInfo) -> Result<(), BoxError> {
        self.write_line(&json!({
            "type": "attack",
            "pacer": attack.pacer,
            "duration_ms": attack.duration.as_millis(),
            "concurrency": attack.concurrency,
            "max_hits": attack.max_hits,
            "run_id": format!("{:016x}", attack.run_id),
        }))
    }

    fn on_attack_report(&mut self, m: &AttackMetrics) -> Result<(), BoxError> {
        let l = &m.latencies;
        self.write_line(&json!({
            "type": "report",
            "hits": m.hits,
            "successes": m.successes,
            "rate": m.rate(),
            "throughput": m.throughput(),
            "success_ratio": m.success_ratio(),
            "duration_ms": {
                "total": m.duration().as_millis(),
                "attack": m.attack.as_millis(),
                "wait": m.wait.as_millis(),
            },
            "latencies_us": {
                "min": l.min.as_micros(),
                "mean": l.mean.as_micros(),
                "p50": l.p50.as_micros(),
                "p95": l.p95.as_micros(),
                "p99": l.p99.as_micros(),
                "max": l.max.as_micros(),
            },
            "errors": m.errors,
        }))
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<(), BoxError> {
        self.write_line(&json!({
            "type": "final",
            "hits": summary.hits,
            "recorded": summary.recorded,
            "duplicates": summary.duplicates,
            "receive_span_ms": summary.receive_span.as_millis(),
            "peak_throughput": summary.peak_throughput,
            "mean_throughput": summary.mean_throughput,
            "detection_delay_ms": summary.detection_delay.map(|d| d.as_millis()),
        }))?;
        self.out.flush().context("flush report")
    }
}
