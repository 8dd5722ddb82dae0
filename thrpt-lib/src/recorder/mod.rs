//! Asynchronous recording of received events.
//!
//! Producers (e.g. the request handlers of a receiver) call
//! [`EventRecorder::record`], which only timestamps the event and pushes it
//! onto a bounded queue. A single [`RecorderWorker`] drains that queue and
//! commits every event into the [`EventStore`], rejecting duplicate IDs.

use std::{
    collections::{HashMap, hash_map::Entry},
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::SystemTime,
};

use parking_lot::RwLock;
use rama::telemetry::tracing;
use tokio::{sync::mpsc, time::Instant};

use crate::{profiler::QueueProfiler, quiescence::EventCounter};


/// Size pre-allocated to the event store when none is given.
pub const DEFAULT_STORE_SIZE: usize = 1000;

/// Capacity of the queue received events wait in before being committed.
pub const RECEIVE_BUFFER_SIZE: usize = 100;

/// Receive time of every recorded event, keyed by event ID.
pub type EventStore = HashMap<String, SystemTime>;

/// What the worker does when an event ID is received a second time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Stop recording and return [`RecordError::DuplicateEventId`].
    #[default]
    Abort,
    /// Log a warning, keep the first receive time and continue.
    Warn,
}

/// Cloneable handle used to record events and observe the recorded ones.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    tx: mpsc::Sender<ReceivedEvent>,
    shared: Arc<Shared>,
    clock: Clock,
}

/// Consumer side of an [`EventRecorder`], committing queued events.
#[derive(Debug)]
pub struct RecorderWorker {
    rx: mpsc::Receiver<ReceivedEvent>,
    shared: Arc<Shared>,
    policy: DuplicatePolicy,
}

#[derive(Debug)]
struct Shared {
    events: RwLock<EventStore>,
    duplicates: AtomicU64,
}

#[derive(Debug)]
struct ReceivedEvent {
    id: String,
    received_at: SystemTime,
}

/// Wall clock anchored to the (tokio) monotonic clock,
/// so receive times never go backwards within a run.
#[derive(Debug, Clone, Copy)]
struct Clock {
    wall: SystemTime,
    mono: Instant,
}

impl Clock {
    fn new() -> Self {
        Self {
            wall: SystemTime::now(),
            mono: Instant::now(),
        }
    }

    fn now(&self) -> SystemTime {
        self.wall + self.mono.elapsed()
    }
}

impl EventRecorder {
    /// Creates a recorder whose store is pre-sized for `store_size` events
    /// ([`DEFAULT_STORE_SIZE`] when zero).
    pub fn new(store_size: usize, policy: DuplicatePolicy) -> (Self, RecorderWorker) {
        let store_size = if store_size == 0 {
            DEFAULT_STORE_SIZE
        } else {
            store_size
        };

        let (tx, rx) = mpsc::channel(RECEIVE_BUFFER_SIZE);
        let shared = Arc::new(Shared {
            events: RwLock::new(EventStore::with_capacity(store_size)),
            duplicates: AtomicU64::new(0),
        });

        (
            Self {
                tx,
                shared: shared.clone(),
                clock: Clock::new(),
            },
            RecorderWorker { rx, shared, policy },
        )
    }

    /// Records the reception of the event with the given ID.
    ///
    /// The receive time is taken now, before queueing, so time spent in the
    /// queue is not measured. Waits only when the queue is full. Once the
    /// worker has stopped the event is discarded.
    pub async fn record(&self, id: impl Into<String>) {
        let event = ReceivedEvent {
            id: id.into(),
            received_at: self.clock.now(),
        };

        if let Err(err) = self.tx.send(event).await {
            tracing::debug!(event.id = %err.0.id, "event recorder stopped: discard event");
        }
    }

    /// Current time on the clock receive times are taken from.
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    /// Snapshot of the events recorded so far.
    pub fn recorded(&self) -> EventStore {
        self.shared.events.read().clone()
    }

    pub fn recorded_count(&self) -> usize {
        self.shared.events.read().len()
    }

    /// Duplicate IDs observed under [`DuplicatePolicy::Warn`].
    pub fn duplicates(&self) -> u64 {
        self.shared.duplicates.load(Ordering::Relaxed)
    }
}

impl EventCounter for EventRecorder {
    fn recorded_count(&self) -> usize {
        EventRecorder::recorded_count(self)
    }
}

impl QueueProfiler for EventRecorder {
    /// Not exact: producers may be sending concurrently while the length is
    /// read, which is fine for a rough view of how the worker copes with the flow.
    fn queue_length(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    fn now(&self) -> SystemTime {
        EventRecorder::now(self)
    }
}

impl RecorderWorker {
    /// Commits queued events until `cancel` resolves or every [`EventRecorder`]
    /// handle is dropped.
    ///
    /// Events still queued at cancellation are not committed.
    pub async fn run<F>(mut self, cancel: F) -> Result<(), RecordError>
    where
        F: Future,
    {
        let mut cancel = std::pin::pin!(cancel);

        loop {
            let event = tokio::select! {
                biased;

                _ = cancel.as_mut() => {
                    tracing::debug!("exit event recorder: cancelled");
                    return Ok(());
                }

                maybe_event = self.rx.recv() => {
                    let Some(event) = maybe_event else {
                        tracing::debug!("exit event recorder: all recorders dropped");
                        return Ok(());
                    };
                    event
                }
            };

            self.commit(event)?;
        }
    }

    fn commit(&self, event: ReceivedEvent) -> Result<(), RecordError> {
        let duplicate = {
            let mut events = self.shared.events.write();
            match events.entry(event.id) {
                Entry::Vacant(entry) => {
                    entry.insert(event.received_at);
                    None
                }
                Entry::Occupied(entry) => Some(entry.key().clone()),
            }
        };

        let Some(id) = duplicate else {
            return Ok(());
        };

        match self.policy {
            DuplicatePolicy::Abort => Err(RecordError::DuplicateEventId { id }),
            DuplicatePolicy::Warn => {
                let duplicates = self.shared.duplicates.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    event.id = %id,
                    %duplicates,
                    "received duplicate event ID: keep first receive time",
                );
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum RecordError {
    /// The same event ID was received twice,
    /// a defect of the load generator or of the system under test.
    DuplicateEventId { id: String },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::DuplicateEventId { id } => {
                write!(f, "received duplicate event ID {id}")
            }
        }
    }
}

impl std::error::Error for RecordError {}
