mod counters;
mod receiver;
mod system;

use std::error::Error;
use std::fmt;

use crate::address::Address;
use crate::kernel::message::AnyMessage;

pub use self::counters::Counter;
pub use self::receiver::Receiver;
pub use self::system::{ActorSystem, SystemBuilder};

pub(crate) use self::counters::CounterSet;
pub(crate) use self::receiver::ReceiverCore;
pub(crate) use self::system::SystemCore;

/// A message the runtime could not deliver to a handler: the destination
/// did not resolve, no handler (and no default handler) matched, the send
/// raced a shutdown, or the system was drained with the message still
/// queued.
///
/// Dead letters are passed to the system's fallback handler exactly once
/// per message and are never silently dropped.
pub struct DeadLetter<'m> {
    pub to: Address,
    pub msg: AnyMessage<'m>,
}

impl DeadLetter<'_> {
    /// The address the message was sent from.
    pub fn sender(&self) -> Address {
        self.msg.sender()
    }
}

impl fmt::Debug for DeadLetter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DeadLetter")
            .field("from", &self.msg.sender())
            .field("to", &self.to)
            .field("msg", &self.msg)
            .finish()
    }
}

/// The framework-wide fallback handler.
pub(crate) type FallbackFn = dyn for<'m> Fn(&DeadLetter<'m>) + Send + Sync;

pub enum SystemError {
    InvalidName(String),
    InvalidConfig(String),
}

impl SystemError {
    fn reason(&self) -> &str {
        match *self {
            SystemError::InvalidName(_) => {
                "Failed to create actor system. Cause: Invalid actor system name"
            }
            SystemError::InvalidConfig(_) => {
                "Failed to create actor system. Cause: Invalid configuration"
            }
        }
    }
}

impl Error for SystemError {}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SystemError::InvalidName(ref name) => write!(f, "{} ({})", self.reason(), name),
            SystemError::InvalidConfig(ref detail) => write!(f, "{} ({})", self.reason(), detail),
        }
    }
}

impl fmt::Debug for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.reason())
    }
}
