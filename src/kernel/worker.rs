use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use config::Config;
use log::{debug, trace};

use crate::actor::ActorCell;
use crate::kernel::cache::MessageCache;
use crate::kernel::dispatch;
use crate::kernel::scheduler::Pop;
use crate::system::SystemCore;

/// Per-worker state. Owned by exactly one thread and never shared: the
/// local work queue needs no lock, and the message cache is why the hot
/// send path inside handlers allocates without synchronization.
pub(crate) struct WorkerContext {
    pub local: VecDeque<Arc<ActorCell>>,
    pub cache: MessageCache,
    pub backoff: u32,
}

impl WorkerContext {
    pub fn new(cache: MessageCache) -> Self {
        WorkerContext {
            local: VecDeque::new(),
            cache,
            backoff: 0,
        }
    }
}

/// The fixed-size pool of worker threads executing dispatches.
pub(crate) struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(core: &Arc<SystemCore>, config: &ThreadPoolConfig) -> WorkerPool {
        debug!("starting worker pool: {} threads", config.pool_size);

        let mut handles = Vec::with_capacity(config.pool_size);
        for i in 0..config.pool_size {
            let core = Arc::clone(core);
            let name = format!("worker-{}", i);
            trace!("spawning {}", name);
            let mut builder = thread::Builder::new().name(name);
            if config.stack_size > 0 {
                builder = builder.stack_size(config.stack_size);
            }
            let handle = builder.spawn(move || worker_loop(core)).unwrap();
            handles.push(handle);
        }
        WorkerPool { handles }
    }

    /// Joins every worker to completion. The scheduler must have been shut
    /// down first so the workers can observe the request.
    pub fn stop(mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        debug!("worker pool stopped");
    }
}

fn worker_loop(core: Arc<SystemCore>) {
    let mut worker = WorkerContext::new(MessageCache::new(
        core.allocator.clone(),
        &core.cache_config,
    ));

    loop {
        // Checked before every pop so a shutdown also preempts work
        // already sitting in this worker's local queue; leftovers are
        // diverted to the fallback handler by the shutdown sweep.
        if core.is_shutting_down() {
            break;
        }
        match core.scheduler.pop(&mut worker) {
            Pop::Work(cell) => dispatch::process_mailbox(&cell, &mut worker, &core),
            Pop::Idle => {}
            Pop::Shutdown => break,
        }
    }

    trace!(
        "{} exiting",
        thread::current().name().unwrap_or("worker")
    );
}

#[derive(Clone, Debug)]
pub struct ThreadPoolConfig {
    pub pool_size: usize,
    pub stack_size: usize,
}

impl From<&Config> for ThreadPoolConfig {
    fn from(config: &Config) -> Self {
        ThreadPoolConfig {
            pool_size: config.get_int("dispatcher.pool_size").unwrap() as usize,
            stack_size: config.get_int("dispatcher.stack_size").unwrap() as usize,
        }
    }
}
