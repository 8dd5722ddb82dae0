use std::{
    io::Write,
    time::{Duration, SystemTime},
};

use rama::error::{BoxError, ErrorContext as _};
use thrpt_lib::{
    attack::AttackMetrics,
    sample::{QueueLengthSample, SampleSink, ThroughputSample},
};

use super::{AttackInfo, Reporter, RunSummary};

/// Reports for humans, with samples downsampled to one line per second.
pub struct HumanReporter<W> {
    out: W,
    throughput: PerSecondMax,
    queue_length: PerSecondMax,
}

impl<W: Write + Send> HumanReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            throughput: PerSecondMax::default(),
            queue_length: PerSecondMax::default(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_throughput(&mut self, (second, max): (u64, f64)) -> Result<(), BoxError> {
        writeln!(self.out, "throughput  t=+{second}s  peak {max:.0} events/s")
            .context("write throughput line")
    }

    fn write_queue_length(&mut self, (second, max): (u64, f64)) -> Result<(), BoxError> {
        writeln!(self.out, "queue       t=+{second}s  max length {max:.0}")
            .context("write queue length line")
    }
}

impl<W: Write + Send> SampleSink for HumanReporter<W> {
    fn add_throughput(&mut self, sample: ThroughputSample) -> Result<(), BoxError> {
        match self.throughput.push(sample.ts, sample.rate) {
            Some(completed) => self.write_throughput(completed),
            None => Ok(()),
        }
    }

    fn add_queue_length(&mut self, sample: QueueLengthSample) -> Result<(), BoxError> {
        match self.queue_length.push(sample.ts, sample.length) {
            Some(completed) => self.write_queue_length(completed),
            None => Ok(()),
        }
    }
}

impl<W: Write + Send> Reporter for HumanReporter<W> {
    fn on_attack_start(&mut self, attack: &AttackInfo) -> Result<(), BoxError> {
        write!(
            self.out,
            "attack {} for {:?} (concurrency {}",
            attack.pacer, attack.duration, attack.concurrency,
        )
        .context("write attack line")?;
        if let Some(max_hits) = attack.max_hits {
            write!(self.out, ", max {max_hits} hits").context("write attack line")?;
        }
        writeln!(self.out, ", run {:016x})", attack.run_id).context("write attack line")
    }

    fn on_attack_report(&mut self, m: &AttackMetrics) -> Result<(), BoxError> {
        let l = &m.latencies;
        writeln!(
            self.out,
            "Requests      [total, rate, throughput]          {}, {:.2}, {:.2}\n\
             Duration      [total, attack, wait]              {:?}, {:?}, {:?}\n\
             Latencies     [min, mean, 50, 95, 99, max]       {:?}, {:?}, {:?}, {:?}, {:?}, {:?}\n\
             Success       [ratio]                            {:.2}%",
            m.hits,
            m.rate(),
            m.throughput(),
            m.duration(),
            m.attack,
            m.wait,
            l.min,
            l.mean,
            l.p50,
            l.p95,
            l.p99,
            l.max,
            m.success_ratio() * 100.,
        )
        .context("write attack report")?;

        writeln!(self.out, "Error Set:").context("write attack report")?;
        for (err, count) in &m.errors {
            writeln!(self.out, "{err} (x{count})").context("write attack report")?;
        }
        Ok(())
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<(), BoxError> {
        if let Some(completed) = self.throughput.flush() {
            self.write_throughput(completed)?;
        }
        if let Some(completed) = self.queue_length.flush() {
            self.write_queue_length(completed)?;
        }

        writeln!(
            self.out,
            "received {} of {} events ({} duplicates) over {:?}\n\
             throughput peak {:.0} events/s, mean {:.1} events/s",
            summary.recorded,
            summary.hits,
            summary.duplicates,
            summary.receive_span,
            summary.peak_throughput,
            summary.mean_throughput,
        )
        .context("write summary")?;
        match summary.detection_delay {
            Some(delay) => writeln!(self.out, "end of traffic detected {delay:?} after last event"),
            None => writeln!(self.out, "drill cancelled before the end of traffic"),
        }
        .context("write summary")?;

        self.out.flush().context("flush report")
    }
}

/// Maximum value per whole second elapsed since the first sample.
#[derive(Debug, Default)]
struct PerSecondMax {
    origin: Option<SystemTime>,
    current: Option<(u64, f64)>,
}

impl PerSecondMax {
    /// Returns the previous second once a sample of a later second arrives.
    fn push(&mut self, ts: SystemTime, value: f64) -> Option<(u64, f64)> {
        let origin = *self.origin.get_or_insert(ts);
        let second = ts
            .duration_since(origin)
            .unwrap_or(Duration::ZERO)
            .as_secs();

        match self.current {
            Some((current, max)) if current == second => {
                self.current = Some((current, max.max(value)));
                None
            }
            Some((current, max)) if current < second => {
                self.current = Some((second, value));
                Some((current, max))
            }
            // late sample, count it in the current second
            Some((current, max)) => {
                self.current = Some((current, max.max(value)));
                None
            }
            None => {
                self.current = Some((second, value));
                None
            }
        }
    }

    fn flush(&mut self) -> Option<(u64, f64)> {
        self.current.take()
    }
}
