#![allow(unused_variables)]
use std::any::Any;
use std::fmt;
use std::panic::{RefUnwindSafe, UnwindSafe};
use std::sync::Arc;

use crate::actor::context::Context;

/// A stateful entity reached only through message dispatch.
///
/// An actor's handlers are registered in `pre_start`, which runs before the
/// actor can receive its first message. The system guarantees that at most
/// one message is dispatched to an actor at any time, so handlers get
/// `&mut self` without further synchronization.
///
/// ```
/// use troupe::actors::*;
///
/// #[derive(Debug)]
/// struct Add(u32);
///
/// struct Counter {
///     total: u32,
/// }
///
/// impl Actor for Counter {
///     fn pre_start(&mut self, ctx: &mut Context<'_>) {
///         ctx.register(|actor: &mut Counter, msg: &Add, _ctx| {
///             actor.total += msg.0;
///         });
///     }
/// }
///
/// let sys = SystemBuilder::new().name("example").create().unwrap();
/// let counter = sys.actor_of(Props::new(|| Counter { total: 0 })).unwrap();
/// assert!(sys.send(Add(3), Address::null(), counter));
/// sys.shutdown();
/// ```
pub trait Actor: Send + 'static {
    /// Invoked when the actor is being started by the system, before any
    /// message can reach it. Handler registration belongs here; the
    /// actor's own address is available as `ctx.myself()`.
    fn pre_start(&mut self, ctx: &mut Context<'_>) {}

    /// Invoked after the actor has been stopped and its remaining mailbox
    /// contents have been diverted to the fallback handler.
    fn post_stop(&mut self) {}
}

/// Object-safe view of an actor, stored in its cell between dispatches.
pub(crate) trait AnyActor: Send {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn post_stop(&mut self);
}

impl<A: Actor> AnyActor for A {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn post_stop(&mut self) {
        Actor::post_stop(self)
    }
}

/// Provides instances of `ActorProducer` for use when creating actors
/// (`actor_of`).
///
/// Actors are not created directly. Instead you provide an `ActorProducer`
/// that allows the `ActorSystem` to construct the actor in place once its
/// directory slot and address exist.
pub struct Props;

impl Props {
    /// Creates an `ActorProducer` with no factory method parameters.
    pub fn new<A, F>(creator: F) -> BoxActorProd<A>
    where
        A: Actor,
        F: Fn() -> A + Send + Sync + 'static,
    {
        Arc::new(ActorProps {
            creator: Box::new(creator),
        })
    }

    /// Creates an `ActorProducer` with factory method parameters.
    pub fn new_args<A, Args, F>(creator: F, args: Args) -> BoxActorProd<A>
    where
        A: Actor,
        Args: ActorArgs,
        F: Fn(Args) -> A + Send + Sync + 'static,
    {
        Arc::new(ActorPropsWithArgs {
            creator: Box::new(creator),
            args,
        })
    }
}

/// A shareable `ActorProducer`.
pub type BoxActorProd<A> = Arc<dyn ActorProducer<Actor = A>>;

/// The underlying actor factory used by `actor_of`.
///
/// # Panics
/// If the factory method panics, the panic is caught by the system and
/// `actor_of` returns `CreateError::Panicked`.
pub trait ActorProducer: Send + Sync + UnwindSafe + RefUnwindSafe {
    type Actor: Actor;

    fn produce(&self) -> Self::Actor;
}

impl<A: Actor> ActorProducer for Arc<dyn ActorProducer<Actor = A>> {
    type Actor = A;

    fn produce(&self) -> A {
        (**self).produce()
    }
}

pub struct ActorProps<A: Actor> {
    creator: Box<dyn Fn() -> A + Send + Sync>,
}

impl<A: Actor> UnwindSafe for ActorProps<A> {}
impl<A: Actor> RefUnwindSafe for ActorProps<A> {}

impl<A: Actor> ActorProducer for ActorProps<A> {
    type Actor = A;

    fn produce(&self) -> A {
        (self.creator)()
    }
}

impl<A: Actor> fmt::Debug for ActorProps<A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Props")
    }
}

pub struct ActorPropsWithArgs<A: Actor, Args: ActorArgs> {
    creator: Box<dyn Fn(Args) -> A + Send + Sync>,
    args: Args,
}

impl<A: Actor, Args: ActorArgs> UnwindSafe for ActorPropsWithArgs<A, Args> {}
impl<A: Actor, Args: ActorArgs> RefUnwindSafe for ActorPropsWithArgs<A, Args> {}

impl<A: Actor, Args: ActorArgs> ActorProducer for ActorPropsWithArgs<A, Args> {
    type Actor = A;

    fn produce(&self) -> A {
        (self.creator)(self.args.clone())
    }
}

impl<A: Actor, Args: ActorArgs> fmt::Debug for ActorPropsWithArgs<A, Args> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Props")
    }
}

pub trait ActorArgs: Clone + Send + Sync + 'static {}
impl<T: Clone + Send + Sync + 'static> ActorArgs for T {}
