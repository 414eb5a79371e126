use std::collections::VecDeque;
use std::hint;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use config::Config;
use parking_lot::{Condvar, Mutex};

use crate::actor::ActorCell;
use crate::kernel::worker::WorkerContext;
use crate::system::{Counter, CounterSet};

/// Which scheduler implementation a system runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerVariant {
    /// Workers sleep on a condition variable when there is no work.
    Blocking,
    /// Workers poll with a progressive back-off instead of sleeping on a
    /// condition variable.
    NonBlocking,
}

impl FromStr for SchedulerVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocking" => Ok(SchedulerVariant::Blocking),
            "non_blocking" => Ok(SchedulerVariant::NonBlocking),
            other => Err(format!("unknown scheduler variant: {}", other)),
        }
    }
}

/// How a non-blocking worker backs off when the queues are empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum YieldStrategy {
    /// Scales from a pause instruction up to a 1 ms sleep.
    Polite,
    /// Yields to other threads under pressure but never sleeps.
    Strong,
    /// Only ever pauses, in deepening batches. Maximum responsiveness,
    /// maximum CPU burn.
    Aggressive,
}

impl FromStr for YieldStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "polite" => Ok(YieldStrategy::Polite),
            "strong" => Ok(YieldStrategy::Strong),
            "aggressive" => Ok(YieldStrategy::Aggressive),
            other => Err(format!("unknown yield strategy: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub variant: SchedulerVariant,
    pub yield_strategy: YieldStrategy,
}

impl SchedulerConfig {
    pub(crate) fn from_config(config: &Config) -> Result<Self, String> {
        Ok(SchedulerConfig {
            variant: config.get_string("scheduler.variant").unwrap().parse()?,
            yield_strategy: config
                .get_string("scheduler.yield_strategy")
                .unwrap()
                .parse()?,
        })
    }
}

pub(crate) enum Pop {
    Work(Arc<ActorCell>),
    Idle,
    Shutdown,
}

/// The two-level work queue over ready mailboxes.
///
/// Both implementations share the shape: `pop` always drains the calling
/// worker's local queue before touching the shared queue, and only the
/// shared queue is synchronized. Local queues are owned by exactly one
/// worker and need no lock; pushing to them happens through the worker
/// context, not through this trait.
pub(crate) trait Scheduler: Send + Sync {
    /// Enqueues a ready mailbox on the shared queue. This is the only
    /// entry point available outside a worker context.
    fn push_shared(&self, cell: Arc<ActorCell>);

    /// Fetches the next ready mailbox for this worker, observing the
    /// variant's wait policy when both queues are empty.
    fn pop(&self, worker: &mut WorkerContext) -> Pop;

    /// Makes all current and future `pop` calls return `Pop::Shutdown`,
    /// waking any sleeping workers.
    fn shutdown(&self);
}

pub(crate) fn make_scheduler(
    config: &SchedulerConfig,
    counters: Arc<CounterSet>,
) -> Arc<dyn Scheduler> {
    match config.variant {
        SchedulerVariant::Blocking => Arc::new(BlockingScheduler {
            shared: Mutex::new(BlockingShared {
                queue: VecDeque::new(),
                sleepers: 0,
                shutdown: false,
            }),
            available: Condvar::new(),
            counters,
        }),
        SchedulerVariant::NonBlocking => Arc::new(SpinningScheduler {
            shared: Mutex::new(VecDeque::new()),
            shutdown: AtomicBool::new(false),
            strategy: config.yield_strategy,
            counters,
        }),
    }
}

/// Condition-variable scheduler: workers sleep when idle and producers
/// pulse them awake.
pub(crate) struct BlockingScheduler {
    shared: Mutex<BlockingShared>,
    available: Condvar,
    counters: Arc<CounterSet>,
}

struct BlockingShared {
    queue: VecDeque<Arc<ActorCell>>,
    sleepers: u32,
    shutdown: bool,
}

impl Scheduler for BlockingScheduler {
    fn push_shared(&self, cell: Arc<ActorCell>) {
        let mut shared = self.shared.lock();
        shared.queue.push_back(cell);
        if shared.sleepers > 0 {
            self.counters.increment(Counter::ThreadsPulsed);
        }
        drop(shared);
        self.available.notify_one();
    }

    fn pop(&self, worker: &mut WorkerContext) -> Pop {
        if let Some(cell) = worker.local.pop_front() {
            return Pop::Work(cell);
        }

        let mut shared = self.shared.lock();
        loop {
            if shared.shutdown {
                return Pop::Shutdown;
            }
            if let Some(cell) = shared.queue.pop_front() {
                return Pop::Work(cell);
            }
            shared.sleepers += 1;
            self.available.wait(&mut shared);
            shared.sleepers -= 1;
            self.counters.increment(Counter::ThreadsWoken);
        }
    }

    fn shutdown(&self) {
        let mut shared = self.shared.lock();
        shared.shutdown = true;
        drop(shared);
        self.available.notify_all();
    }
}

/// Spin-polling scheduler: no condition variable, just a progressive
/// back-off governed by the configured yield strategy.
pub(crate) struct SpinningScheduler {
    shared: Mutex<VecDeque<Arc<ActorCell>>>,
    shutdown: AtomicBool,
    strategy: YieldStrategy,
    counters: Arc<CounterSet>,
}

impl Scheduler for SpinningScheduler {
    fn push_shared(&self, cell: Arc<ActorCell>) {
        self.shared.lock().push_back(cell);
    }

    fn pop(&self, worker: &mut WorkerContext) -> Pop {
        if let Some(cell) = worker.local.pop_front() {
            worker.backoff = 0;
            return Pop::Work(cell);
        }

        if let Some(cell) = self.shared.lock().pop_front() {
            worker.backoff = 0;
            return Pop::Work(cell);
        }

        if self.shutdown.load(Ordering::Acquire) {
            return Pop::Shutdown;
        }

        worker.backoff += 1;
        self.counters.increment(Counter::Yields);
        backoff(self.strategy, worker.backoff);
        Pop::Idle
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

/// One step of progressive back-off.
///
/// The ladders follow the classic smart-spin shape: short pauses first,
/// then batches of pauses, then thread yields, then (politely) a real
/// sleep. The counter resets whenever a mailbox is actually dequeued.
fn backoff(strategy: YieldStrategy, counter: u32) {
    match strategy {
        YieldStrategy::Polite => {
            if counter < 10 {
                hint::spin_loop();
            } else if counter < 20 {
                for _ in 0..50 {
                    hint::spin_loop();
                }
            } else if counter < 22 {
                thread::yield_now();
            } else if counter < 24 {
                thread::sleep(Duration::from_millis(0));
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }
        YieldStrategy::Strong => {
            if counter < 10 {
                hint::spin_loop();
            } else if counter < 20 {
                for _ in 0..50 {
                    hint::spin_loop();
                }
            } else if counter < 22 {
                thread::yield_now();
            } else {
                thread::sleep(Duration::from_millis(0));
            }
        }
        YieldStrategy::Aggressive => {
            if counter < 10 {
                hint::spin_loop();
            } else if counter < 20 {
                for _ in 0..50 {
                    hint::spin_loop();
                }
            } else if counter < 22 {
                for _ in 0..100 {
                    hint::spin_loop();
                }
            } else {
                for _ in 0..200 {
                    hint::spin_loop();
                }
            }
        }
    }
}
