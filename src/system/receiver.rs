use std::any::Any;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::address::Address;
use crate::kernel::message::MsgTypeId;
use crate::system::ActorSystem;
use crate::Message;

/// A non-actor message sink that a thread outside the worker pool can
/// block on.
///
/// Sends to a receiver bypass the scheduler entirely: the registered
/// handlers run synchronously on the sending thread, the received count
/// advances and any waiter is signalled. `wait` blocks only on the
/// receiver's own monitor, never on worker availability, which makes
/// receivers the natural way for a driving thread to collect results from
/// actors.
///
/// Dropping a receiver deregisters its address; later sends to it are
/// diverted to the fallback handler.
pub struct Receiver {
    address: Address,
    core: Arc<ReceiverCore>,
    system: ActorSystem,
}

pub(crate) struct ReceiverCore {
    state: Mutex<ReceiverState>,
    arrived: Condvar,
}

struct ReceiverState {
    handlers: Vec<ReceiverHandler>,
    received: u64,
    consumed: u64,
}

struct ReceiverHandler {
    type_id: MsgTypeId,
    invoke: Box<dyn Fn(&dyn Any, Address) + Send>,
}

impl ReceiverCore {
    pub(crate) fn new() -> Self {
        ReceiverCore {
            state: Mutex::new(ReceiverState {
                handlers: Vec::new(),
                received: 0,
                consumed: 0,
            }),
            arrived: Condvar::new(),
        }
    }

    /// Delivers one message on the calling thread: every matching handler
    /// runs, the received count advances, waiters are signalled. Messages
    /// with no matching handler still count.
    pub(crate) fn push(&self, value: &dyn Any, type_id: MsgTypeId, from: Address) {
        let mut state = self.state.lock();
        for handler in state.handlers.iter() {
            if handler.type_id == type_id {
                (handler.invoke)(value, from);
            }
        }
        state.received += 1;
        self.arrived.notify_all();
    }
}

impl Receiver {
    pub(crate) fn new(address: Address, core: Arc<ReceiverCore>, system: ActorSystem) -> Self {
        Receiver {
            address,
            core,
            system,
        }
    }

    /// The address actors and external senders deliver to.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Registers a handler for messages of type `M`. Handlers run on the
    /// sending thread, in registration order.
    ///
    /// # Panics
    /// Under the `named` identity scheme, if `M` was not registered with
    /// the system first.
    pub fn register<M, F>(&self, f: F)
    where
        M: Message,
        F: Fn(&M, Address) + Send + 'static,
    {
        let type_id = match self.system.registry().lookup::<M>() {
            Ok(type_id) => type_id,
            Err(err) => panic!("cannot register receiver handler: {}", err),
        };
        self.core.state.lock().handlers.push(ReceiverHandler {
            type_id,
            invoke: Box::new(move |value, from| {
                if let Some(msg) = value.downcast_ref::<M>() {
                    f(msg, from);
                }
            }),
        });
    }

    /// Blocks until one more message has arrived since the previous wait.
    pub fn wait(&self) {
        self.wait_for(1)
    }

    /// Blocks until `n` more messages have arrived since the previous
    /// wait.
    pub fn wait_for(&self, n: u64) {
        let mut state = self.core.state.lock();
        while state.received - state.consumed < n {
            self.core.arrived.wait(&mut state);
        }
        state.consumed += n;
    }

    /// Total messages delivered to this receiver so far.
    pub fn count(&self) -> u64 {
        self.core.state.lock().received
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.system.retire_receiver(self.address);
    }
}
