mod actor;
mod cell;
mod context;
mod directory;
mod handler;

use std::error::Error;
use std::fmt;

pub use self::actor::{Actor, ActorArgs, ActorProducer, BoxActorProd, Props};
pub use self::context::Context;
pub use self::handler::HandlerId;

pub(crate) use self::actor::AnyActor;
pub(crate) use self::cell::{ActorCell, Dock};
pub(crate) use self::directory::{Directory, DirectoryConfig};
pub(crate) use self::handler::{DefaultFn, Handler, HandlerScratch, HandlerTable, InvokeFn};

/// Error type when an actor fails to start during `actor_of`.
pub enum CreateError {
    /// The actor's factory method or `pre_start` panicked.
    Panicked,
    /// The directory is at its configured capacity.
    DirectoryExhausted,
    /// The system is shutting down and accepts no new registrations.
    ShuttingDown,
}

impl CreateError {
    fn reason(&self) -> &str {
        match *self {
            CreateError::Panicked => {
                "Failed to create actor. Cause: Actor panicked while starting"
            }
            CreateError::DirectoryExhausted => {
                "Failed to create actor. Cause: Actor directory is at capacity"
            }
            CreateError::ShuttingDown => {
                "Failed to create actor. Cause: System is shutting down"
            }
        }
    }
}

impl Error for CreateError {}

impl fmt::Display for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.reason())
    }
}

impl fmt::Debug for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.reason())
    }
}
