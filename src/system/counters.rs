use std::sync::atomic::{AtomicU64, Ordering};

/// Per-system event counters, readable at any time through
/// [`ActorSystem::counter_value`](crate::system::ActorSystem::counter_value).
///
/// All counters are local to one system instance and measure scheduling
/// activity, which makes them useful for sizing the worker pool and
/// choosing between the scheduler variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Counter {
    /// Messages dispatched by the worker pool.
    MessagesProcessed,
    /// Pushes to the shared queue that found a sleeping worker to wake
    /// (blocking scheduler only).
    ThreadsPulsed,
    /// Times a worker actually woke from its condition-variable wait
    /// (blocking scheduler only).
    ThreadsWoken,
    /// High-water mark of queued messages over all mailboxes.
    MailboxQueueMax,
    /// Mailboxes enqueued to a worker's local queue.
    LocalPushes,
    /// Mailboxes enqueued to the shared queue.
    SharedPushes,
    /// Back-off steps taken by idle workers (non-blocking scheduler
    /// only).
    Yields,
}

const COUNTERS: usize = 7;

impl Counter {
    fn index(self) -> usize {
        self as usize
    }
}

pub(crate) struct CounterSet {
    values: [AtomicU64; COUNTERS],
}

impl CounterSet {
    pub fn new() -> Self {
        CounterSet {
            values: Default::default(),
        }
    }

    pub fn increment(&self, counter: Counter) {
        self.values[counter.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_max(&self, counter: Counter, value: u64) {
        self.values[counter.index()].fetch_max(value, Ordering::Relaxed);
    }

    pub fn value(&self, counter: Counter) -> u64 {
        self.values[counter.index()].load(Ordering::Relaxed)
    }

    pub fn reset_all(&self) {
        for value in &self.values {
            value.store(0, Ordering::Relaxed);
        }
    }
}
