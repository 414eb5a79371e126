#![crate_name = "troupe"]
#![deny(clippy::all)]
#![allow(clippy::new_without_default)]
#![allow(clippy::new_ret_no_self)]
#![allow(clippy::module_inception)]

pub mod actor;
pub mod address;
pub mod alloc;
pub mod kernel;
pub mod system;

use std::env;
use std::fmt::Debug;

use config::{Config, File};

pub fn load_config() -> Config {
    let builder = Config::builder()
        .set_default("debug", true)
        .unwrap()
        .set_default("dispatcher.pool_size", 2)
        .unwrap()
        .set_default("dispatcher.stack_size", 0)
        .unwrap()
        .set_default("scheduler.variant", "blocking")
        .unwrap()
        .set_default("scheduler.yield_strategy", "polite")
        .unwrap()
        .set_default("directory.max_actors", 4096)
        .unwrap()
        .set_default("directory.max_receivers", 1024)
        .unwrap()
        .set_default("message_cache.max_pools", 32)
        .unwrap()
        .set_default("message_cache.blocks_per_pool", 16)
        .unwrap()
        .set_default("messages.identity", "implicit")
        .unwrap();

    // load the system config
    // troupe.toml contains settings for anything related to the actor runtime and its modules
    let path = env::var("TROUPE_CONF").unwrap_or_else(|_| "config/troupe.toml".into());
    builder
        .add_source(File::with_name(&path).required(false))
        .build()
        .unwrap()
}

/// Types that can be sent as messages.
///
/// Any `Debug + Send + 'static` type is a message. `Debug` is required so
/// that undeliverable messages can be reported through the fallback handler
/// and the dead letter log.
pub trait Message: Debug + Send + 'static {}
impl<T: Debug + Send + 'static> Message for T {}

pub mod actors {
    pub use crate::actor::{
        Actor, ActorProducer, BoxActorProd, Context, CreateError, HandlerId, Props,
    };
    pub use crate::address::{Address, AddressDomain};
    pub use crate::alloc::{Allocator, AllocatorHandle, SystemAllocator};
    pub use crate::kernel::message::{AnyMessage, MessageIdentity};
    pub use crate::kernel::scheduler::{SchedulerVariant, YieldStrategy};
    pub use crate::system::{
        ActorSystem, Counter, DeadLetter, Receiver, SystemBuilder, SystemError,
    };
    pub use crate::Message;
}
