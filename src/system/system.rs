use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::prelude::*;
use config::Config;
use log::{debug, info, trace, warn};
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use uuid::Uuid;

use crate::actor::{ActorCell, Dock};
use crate::actor::Context;
use crate::actor::{Directory, DirectoryConfig};
use crate::actor::{Actor, ActorProducer, CreateError};
use crate::address::{Address, AddressDomain};
use crate::alloc::{AllocatorHandle, SystemAllocator};
use crate::kernel::cache::{CacheConfig, MessageCache};
use crate::kernel::message::{
    AnyMessage, MessageConfig, MessageIdentity, MessageRegistry, MessageRef,
};
use crate::kernel::scheduler::{
    make_scheduler, Scheduler, SchedulerConfig, SchedulerVariant, YieldStrategy,
};
use crate::kernel::sender;
use crate::kernel::worker::{ThreadPoolConfig, WorkerPool};
use crate::load_config;
use crate::system::{
    Counter, CounterSet, DeadLetter, FallbackFn, Receiver, ReceiverCore, SystemError,
};
use crate::Message;

pub struct ProtoSystem {
    id: Uuid,
    name: String,
    config: Config,
    debug: bool,
    started_at: DateTime<Utc>,
}

/// Everything a system owns: directories, registry, scheduler, worker
/// pool, fallback slot, caches and counters. Shared behind one `Arc` by
/// the public handle and every worker thread.
pub(crate) struct SystemCore {
    pub(crate) proto: ProtoSystem,
    pub(crate) actors: Directory<ActorCell>,
    pub(crate) receivers: Directory<ReceiverCore>,
    pub(crate) registry: MessageRegistry,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pool: Mutex<Option<WorkerPool>>,
    fallback: RwLock<Arc<FallbackFn>>,
    pub(crate) global_cache: Mutex<MessageCache>,
    pub(crate) allocator: AllocatorHandle,
    pub(crate) cache_config: CacheConfig,
    pub(crate) counters: Arc<CounterSet>,
    shutting_down: AtomicBool,
}

impl SystemCore {
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Hands a dead letter to the fallback handler. The handler is cloned
    /// out of the slot first so user code never runs under the lock.
    pub(crate) fn dead_letter(&self, letter: &DeadLetter<'_>) {
        let fallback = self.fallback.read().clone();
        (fallback)(letter);
    }
}

/// Gathered per-subsystem settings, parsed once at construction.
pub(crate) struct SystemSettings {
    pub thread_pool: ThreadPoolConfig,
    pub scheduler: SchedulerConfig,
    pub directory: DirectoryConfig,
    pub cache: CacheConfig,
    pub messages: MessageConfig,
}

impl SystemSettings {
    fn from_config(config: &Config) -> Result<Self, SystemError> {
        Ok(SystemSettings {
            thread_pool: ThreadPoolConfig::from(config),
            scheduler: SchedulerConfig::from_config(config).map_err(SystemError::InvalidConfig)?,
            directory: DirectoryConfig::from(config),
            cache: CacheConfig::from(config),
            messages: MessageConfig::from_config(config).map_err(SystemError::InvalidConfig)?,
        })
    }
}

/// Builder for an [`ActorSystem`], combining the configuration file with
/// programmatic overrides.
#[derive(Default)]
pub struct SystemBuilder {
    name: Option<String>,
    cfg: Option<Config>,
    workers: Option<usize>,
    scheduler: Option<SchedulerVariant>,
    yield_strategy: Option<YieldStrategy>,
    max_actors: Option<u32>,
    max_receivers: Option<u32>,
    identity: Option<MessageIdentity>,
    fallback: Option<Arc<FallbackFn>>,
    allocator: Option<AllocatorHandle>,
}

impl SystemBuilder {
    pub fn new() -> Self {
        SystemBuilder::default()
    }

    pub fn create(self) -> Result<ActorSystem, SystemError> {
        let name = self.name.unwrap_or_else(|| "troupe".to_string());
        let cfg = self.cfg.unwrap_or_else(load_config);
        let mut settings = SystemSettings::from_config(&cfg)?;

        if let Some(workers) = self.workers {
            settings.thread_pool.pool_size = workers;
        }
        if let Some(variant) = self.scheduler {
            settings.scheduler.variant = variant;
        }
        if let Some(strategy) = self.yield_strategy {
            settings.scheduler.yield_strategy = strategy;
        }
        if let Some(max_actors) = self.max_actors {
            settings.directory.max_actors = max_actors;
        }
        if let Some(max_receivers) = self.max_receivers {
            settings.directory.max_receivers = max_receivers;
        }
        if let Some(identity) = self.identity {
            settings.messages.identity = identity;
        }

        ActorSystem::create_with(&name, cfg, settings, self.fallback, self.allocator)
    }

    pub fn name(self, name: &str) -> Self {
        SystemBuilder {
            name: Some(name.to_string()),
            ..self
        }
    }

    pub fn cfg(self, cfg: Config) -> Self {
        SystemBuilder {
            cfg: Some(cfg),
            ..self
        }
    }

    /// Size of the worker-thread pool.
    pub fn workers(self, workers: usize) -> Self {
        SystemBuilder {
            workers: Some(workers),
            ..self
        }
    }

    pub fn scheduler(self, variant: SchedulerVariant) -> Self {
        SystemBuilder {
            scheduler: Some(variant),
            ..self
        }
    }

    /// Back-off policy for idle workers. Only observed by the
    /// non-blocking scheduler.
    pub fn yield_strategy(self, strategy: YieldStrategy) -> Self {
        SystemBuilder {
            yield_strategy: Some(strategy),
            ..self
        }
    }

    pub fn max_actors(self, max_actors: u32) -> Self {
        SystemBuilder {
            max_actors: Some(max_actors),
            ..self
        }
    }

    pub fn max_receivers(self, max_receivers: u32) -> Self {
        SystemBuilder {
            max_receivers: Some(max_receivers),
            ..self
        }
    }

    pub fn message_identity(self, identity: MessageIdentity) -> Self {
        SystemBuilder {
            identity: Some(identity),
            ..self
        }
    }

    /// Installs the fallback handler invoked for every dead letter.
    pub fn fallback<F>(self, f: F) -> Self
    where
        F: for<'m> Fn(&DeadLetter<'m>) + Send + Sync + 'static,
    {
        SystemBuilder {
            fallback: Some(Arc::new(f)),
            ..self
        }
    }

    /// Replaces the allocator behind the message caches.
    pub fn allocator(self, allocator: AllocatorHandle) -> Self {
        SystemBuilder {
            allocator: Some(allocator),
            ..self
        }
    }
}

/// The actor runtime coordinator.
///
/// An `ActorSystem` owns the actor and receiver directories, the message
/// registry, the scheduler and the worker-thread pool. It is a cheap
/// clone-able handle; all clones drive the same system. A process may run
/// several independent systems side by side.
///
/// Call [`shutdown`](ActorSystem::shutdown) when done: it stops the
/// workers and diverts every message still queued to the fallback handler.
#[derive(Clone)]
pub struct ActorSystem {
    pub(crate) core: Arc<SystemCore>,
}

impl std::fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSystem").finish()
    }
}

impl ActorSystem {
    /// Create a new `ActorSystem` instance with default configuration.
    pub fn new() -> Result<ActorSystem, SystemError> {
        ActorSystem::create("troupe", load_config())
    }

    /// Create a new `ActorSystem` instance with the provided name.
    pub fn with_name(name: &str) -> Result<ActorSystem, SystemError> {
        ActorSystem::create(name, load_config())
    }

    /// Create a new `ActorSystem` instance bypassing default config
    /// behavior.
    pub fn with_config(name: &str, config: Config) -> Result<ActorSystem, SystemError> {
        ActorSystem::create(name, config)
    }

    fn create(name: &str, config: Config) -> Result<ActorSystem, SystemError> {
        let settings = SystemSettings::from_config(&config)?;
        ActorSystem::create_with(name, config, settings, None, None)
    }

    pub(crate) fn create_with(
        name: &str,
        config: Config,
        settings: SystemSettings,
        fallback: Option<Arc<FallbackFn>>,
        allocator: Option<AllocatorHandle>,
    ) -> Result<ActorSystem, SystemError> {
        validate_name(name)?;

        let debug = config.get_bool("debug").unwrap();
        let proto = ProtoSystem {
            id: Uuid::new_v4(),
            name: name.to_string(),
            config,
            debug,
            started_at: Utc::now(),
        };

        let allocator = allocator.unwrap_or_else(|| Arc::new(SystemAllocator));
        let counters = Arc::new(CounterSet::new());
        let scheduler = make_scheduler(&settings.scheduler, counters.clone());

        let core = Arc::new(SystemCore {
            proto,
            actors: Directory::new(AddressDomain::Actor, settings.directory.max_actors),
            receivers: Directory::new(AddressDomain::Receiver, settings.directory.max_receivers),
            registry: MessageRegistry::new(settings.messages.identity),
            scheduler,
            pool: Mutex::new(None),
            fallback: RwLock::new(fallback.unwrap_or_else(default_fallback)),
            global_cache: Mutex::new(MessageCache::new(allocator.clone(), &settings.cache)),
            allocator,
            cache_config: settings.cache,
            counters,
            shutting_down: AtomicBool::new(false),
        });

        let pool = WorkerPool::start(&core, &settings.thread_pool);
        *core.pool.lock() = Some(pool);

        let system = ActorSystem { core };
        if system.core.proto.debug {
            debug!(
                "actor system [{}] [{}] started with {} workers",
                system.id(),
                name,
                settings.thread_pool.pool_size
            );
        }
        Ok(system)
    }

    /// Creates an actor and returns its address.
    ///
    /// The directory slot is reserved first so the actor learns its own
    /// address through the `pre_start` context; only once `pre_start` has
    /// registered the handlers does the address begin to resolve.
    pub fn actor_of<P>(&self, props: P) -> Result<Address, CreateError>
    where
        P: ActorProducer,
    {
        if self.core.is_shutting_down() {
            return Err(CreateError::ShuttingDown);
        }

        let address = self
            .core
            .actors
            .reserve()
            .map_err(|_| CreateError::DirectoryExhausted)?;
        trace!("attempting to create actor at {}", address);

        let mut actor = match panic::catch_unwind(|| props.produce()) {
            Ok(actor) => actor,
            Err(_) => {
                self.core.actors.cancel(address);
                return Err(CreateError::Panicked);
            }
        };

        let cell = Arc::new(ActorCell::new(address));
        {
            let mut dock = cell.dock.lock();
            let Dock { table, .. } = &mut *dock;

            let started = {
                let mut ctx =
                    Context::new(address, Address::null(), &self.core, &mut table.scratch, None);
                panic::catch_unwind(AssertUnwindSafe(|| actor.pre_start(&mut ctx)))
            };
            if started.is_err() {
                self.core.actors.cancel(address);
                return Err(CreateError::Panicked);
            }

            table.validate();
            dock.actor = Some(Box::new(actor));
        }

        self.core.actors.install(address, cell);
        trace!("actor created: {}", address);
        Ok(address)
    }

    /// Stops the actor at `address`.
    ///
    /// The address stops resolving immediately; a dispatch already in
    /// flight finishes its current handler. Messages still queued in the
    /// mailbox are passed to the fallback handler, then `post_stop` runs.
    /// Returns false when the address does not resolve.
    pub fn stop(&self, address: Address) -> bool {
        match self.core.actors.retire(address) {
            Some(cell) => {
                trace!("stopping actor {}", address);
                // Divert the backlog first: the queue needs no dock access,
                // so this does not wait for an in-flight handler.
                for envelope in cell.mailbox.drain() {
                    self.dead_letter_envelope(address, envelope);
                }
                // Taking the dock waits for the current dispatch, if any,
                // to complete; post_stop then runs on this thread.
                let actor = cell.dock.lock().actor.take();
                if let Some(mut actor) = actor {
                    actor.post_stop();
                }
                true
            }
            None => {
                warn!("cannot stop unknown actor {}", address);
                false
            }
        }
    }

    /// Sends `msg` from `from` to `to`.
    ///
    /// Returns true when the message was accepted for delivery: queued on
    /// an actor's mailbox, or delivered synchronously to a receiver. On
    /// failure the value is diverted to the fallback handler and false is
    /// returned; an unregistered message type (under the `named` scheme)
    /// fails fast without diversion.
    pub fn send<M: Message>(&self, msg: M, from: Address, to: Address) -> bool {
        sender::send_message(&self.core, None, msg, from, to)
    }

    /// Creates a receiver registered with this system.
    pub fn receiver(&self) -> Result<Receiver, CreateError> {
        let address = self
            .core
            .receivers
            .reserve()
            .map_err(|_| CreateError::DirectoryExhausted)?;
        let receiver = Arc::new(ReceiverCore::new());
        self.core.receivers.install(address, receiver.clone());
        Ok(Receiver::new(address, receiver, self.clone()))
    }

    /// Registers message type `M` under `name`, for systems using the
    /// `named` identity scheme. Identity is the pooled name, so the same
    /// name always denotes the same wire identity.
    pub fn register_message<M: Message>(&self, name: &str) {
        self.core.registry.register::<M>(name);
    }

    /// Replaces the fallback handler invoked for every dead letter.
    ///
    /// The handler is normally installed once, at
    /// [`SystemBuilder::fallback`]; until then dead letters are logged.
    pub fn set_fallback<F>(&self, f: F)
    where
        F: for<'m> Fn(&DeadLetter<'m>) + Send + Sync + 'static,
    {
        *self.core.fallback.write() = Arc::new(f);
    }

    pub fn counter_value(&self, counter: Counter) -> u64 {
        self.core.counters.value(counter)
    }

    pub fn reset_counters(&self) {
        self.core.counters.reset_all();
    }

    /// Shuts the system down.
    ///
    /// Further sends fail immediately. Workers finish their current
    /// dispatch and are joined; every message still queued anywhere is
    /// then passed to the fallback handler exactly once, and each
    /// remaining actor's `post_stop` runs. Idempotent.
    pub fn shutdown(&self) {
        if self.core.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.core.proto.debug {
            debug!("actor system [{}] shutting down", self.name());
        }

        self.core.scheduler.shutdown();
        if let Some(pool) = self.core.pool.lock().take() {
            pool.stop();
        }

        // Workers are gone; drain what is left to the fallback handler.
        let mut cells = Vec::new();
        self.core.actors.for_each(|cell| cells.push(cell.clone()));
        for cell in cells {
            let actor = cell.dock.lock().actor.take();
            for envelope in cell.mailbox.drain() {
                self.dead_letter_envelope(cell.address(), envelope);
            }
            if let Some(mut actor) = actor {
                actor.post_stop();
            }
        }

        if self.core.proto.debug {
            debug!("actor system [{}] stopped", self.name());
        }
    }

    /// Returns the system name.
    pub fn name(&self) -> String {
        self.core.proto.name.clone()
    }

    /// Returns the UUID assigned to the system.
    pub fn id(&self) -> Uuid {
        self.core.proto.id
    }

    /// Returns the system start date.
    pub fn start_date(&self) -> &DateTime<Utc> {
        &self.core.proto.started_at
    }

    /// Returns the number of seconds since the system started.
    pub fn uptime(&self) -> u64 {
        (Utc::now() - *self.start_date()).num_seconds() as u64
    }

    pub fn config(&self) -> &Config {
        &self.core.proto.config
    }

    /// Number of live actors.
    pub fn actor_count(&self) -> u32 {
        self.core.actors.len()
    }

    pub(crate) fn registry(&self) -> &MessageRegistry {
        &self.core.registry
    }

    pub(crate) fn retire_receiver(&self, address: Address) {
        self.core.receivers.retire(address);
    }

    fn dead_letter_envelope(&self, to: Address, envelope: MessageRef) {
        let letter = DeadLetter {
            to,
            msg: AnyMessage::from_envelope(&envelope),
        };
        self.core.dead_letter(&letter);
        let mut cache = self.core.global_cache.lock();
        envelope.destroy(&mut cache);
    }
}

/// System names lead every log line and name the config file section for
/// the instance, so they must start with a letter and stay within
/// letters, digits, `_` and `-`.
fn validate_name(name: &str) -> Result<(), SystemError> {
    let rgx = Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]*$").unwrap();
    if rgx.is_match(name) {
        Ok(())
    } else {
        Err(SystemError::InvalidName(name.into()))
    }
}

fn log_dead_letter(letter: &DeadLetter<'_>) {
    info!("{:?}", letter);
}

fn default_fallback() -> Arc<FallbackFn> {
    Arc::new(log_dead_letter)
}
