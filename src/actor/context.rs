use std::any::Any;

use crate::actor::actor::Actor;
use crate::actor::handler::{HandlerId, HandlerScratch};
use crate::address::Address;
use crate::kernel::message::AnyMessage;
use crate::kernel::sender;
use crate::kernel::worker::WorkerContext;
use crate::system::SystemCore;
use crate::Message;

/// The actor's view of the system during `pre_start` and while one of its
/// handlers is running.
///
/// Handler registration and deregistration through the context is
/// deferred: changes are merged into the live handler table just before
/// the next message is dispatched to this actor. A handler may therefore
/// freely deregister itself, or register new handlers, without
/// invalidating the dispatch in progress.
pub struct Context<'a> {
    myself: Address,
    sender: Address,
    core: &'a SystemCore,
    scratch: &'a mut HandlerScratch,
    worker: Option<&'a mut WorkerContext>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        myself: Address,
        sender: Address,
        core: &'a SystemCore,
        scratch: &'a mut HandlerScratch,
        worker: Option<&'a mut WorkerContext>,
    ) -> Self {
        Context {
            myself,
            sender,
            core,
            scratch,
            worker,
        }
    }

    /// This actor's own address.
    pub fn myself(&self) -> Address {
        self.myself
    }

    /// The address the current message was sent from. Null during
    /// `pre_start`, and whenever the sender supplied no address.
    pub fn sender(&self) -> Address {
        self.sender
    }

    /// Sends `msg` to `to`, with this actor as the sender.
    ///
    /// Returns true when the message was accepted for delivery. On
    /// failure (no recipient, shutdown in progress, allocation failure)
    /// the value is passed to the fallback handler and false is returned.
    pub fn send<M: Message>(&mut self, msg: M, to: Address) -> bool {
        let myself = self.myself;
        sender::send_message(self.core, self.worker.as_deref_mut(), msg, myself, to)
    }

    /// Registers a handler for messages of type `M`.
    ///
    /// Handlers run in registration order; every registered handler whose
    /// message type matches runs for each message. The registration takes
    /// effect before the next message is dispatched to this actor.
    ///
    /// # Panics
    /// Under the `named` identity scheme, if `M` was not registered with
    /// the system first.
    pub fn register<A, M, F>(&mut self, f: F) -> HandlerId
    where
        A: Actor,
        M: Message,
        F: for<'c> Fn(&mut A, &M, &mut Context<'c>) + Send + 'static,
    {
        let type_id = match self.core.registry.lookup::<M>() {
            Ok(type_id) => type_id,
            Err(err) => panic!("cannot register handler: {}", err),
        };
        self.scratch.add(
            type_id,
            Box::new(move |actor: &mut dyn Any, envelope, ctx| {
                if let Some(actor) = actor.downcast_mut::<A>() {
                    if let Some(msg) = envelope.downcast_ref::<M>() {
                        f(actor, msg, ctx);
                    }
                }
            }),
        )
    }

    /// Deregisters a previously registered handler. Takes effect at the
    /// next handler-table validation; an in-progress dispatch still sees
    /// the handler.
    pub fn deregister(&mut self, id: HandlerId) {
        self.scratch.remove(id);
    }

    /// Installs the default handler, invoked for messages no registered
    /// handler matches. Replaces any previous default handler.
    pub fn set_default<A, F>(&mut self, f: F)
    where
        A: Actor,
        F: for<'c, 'm> Fn(&mut A, &AnyMessage<'m>, &mut Context<'c>) + Send + 'static,
    {
        self.scratch.set_default(Some(Box::new(
            move |actor: &mut dyn Any, msg, ctx| {
                if let Some(actor) = actor.downcast_mut::<A>() {
                    f(actor, msg, ctx);
                }
            },
        )));
    }

    /// Removes the default handler; unmatched messages go to the
    /// framework fallback handler instead.
    pub fn clear_default(&mut self) {
        self.scratch.set_default(None);
    }
}
