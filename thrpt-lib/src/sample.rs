//! Measurement samples and the sink they are published to.

use std::time::SystemTime;

use rama::error::BoxError;

/// Instantaneous receive throughput at the time an event arrived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    pub ts: SystemTime,
    /// Events received within the trailing window ending at `ts`.
    pub rate: f64,
}

/// Depth of the recorder ingestion queue at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueLengthSample {
    pub ts: SystemTime,
    pub length: f64,
}

/// Destination of the samples produced during a run,
/// e.g. a reporter or a metrics backend client.
pub trait SampleSink: Send {
    fn add_throughput(&mut self, sample: ThroughputSample) -> Result<(), BoxError>;

    fn add_queue_length(&mut self, sample: QueueLengthSample) -> Result<(), BoxError>;
}

impl<S: SampleSink + ?Sized> SampleSink for Box<S> {
    fn add_throughput(&mut self, sample: ThroughputSample) -> Result<(), BoxError> {
        (**self).add_throughput(sample)
    }

    fn add_queue_length(&mut self, sample: QueueLengthSample) -> Result<(), BoxError> {
        (**self).add_queue_length(sample)
    }
}

/// Sink keeping every sample in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub throughput: Vec<ThroughputSample>,
    pub queue_length: Vec<QueueLengthSample>,
}

impl SampleSink for MemorySink {
    fn add_throughput(&mut self, sample: ThroughputSample) -> Result<(), BoxError> {
        self.throughput.push(sample);
        Ok(())
    }

    fn add_queue_length(&mut self, sample: QueueLengthSample) -> Result<(), BoxError> {
        self.queue_length.push(sample);
        Ok(())
    }
}
