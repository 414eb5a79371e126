use std::alloc::Layout;
use std::any::{Any, TypeId};
use std::error::Error;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::str::FromStr;

use config::Config;
use dashmap::DashMap;
use log::error;

use crate::address::Address;
use crate::kernel::cache::MessageCache;
use crate::Message;

/// How message types are identified on the wire between sender and
/// handler. Fixed per system at construction time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageIdentity {
    /// Types identify themselves by their compiler-assigned `TypeId`.
    Implicit,
    /// Every message type must be registered under a static string name
    /// before it can be sent; identity is the pooled name's pointer.
    Named,
}

impl FromStr for MessageIdentity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "implicit" => Ok(MessageIdentity::Implicit),
            "named" => Ok(MessageIdentity::Named),
            other => Err(format!("unknown message identity: {}", other)),
        }
    }
}

/// The type tag carried by every envelope and handler.
#[derive(Clone, Copy, Debug)]
pub enum MsgTypeId {
    Implicit(TypeId),
    Named(&'static str),
}

impl PartialEq for MsgTypeId {
    fn eq(&self, other: &MsgTypeId) -> bool {
        match (self, other) {
            (MsgTypeId::Implicit(a), MsgTypeId::Implicit(b)) => a == b,
            // Names are interned, so pointer identity is name identity.
            (MsgTypeId::Named(a), MsgTypeId::Named(b)) => std::ptr::eq(*a, *b),
            _ => false,
        }
    }
}

impl Eq for MsgTypeId {}

/// Error raised when a type is sent under the `named` identity scheme
/// without having been registered.
pub struct UnregisteredMessage {
    pub type_name: &'static str,
}

impl Error for UnregisteredMessage {}

impl fmt::Display for UnregisteredMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "message type {} has not been registered with the system",
            self.type_name
        )
    }
}

impl fmt::Debug for UnregisteredMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Per-system registry resolving Rust types to their wire identity.
pub(crate) struct MessageRegistry {
    identity: MessageIdentity,
    interned: DashMap<String, &'static str>,
    names: DashMap<TypeId, &'static str>,
}

impl MessageRegistry {
    pub fn new(identity: MessageIdentity) -> Self {
        MessageRegistry {
            identity,
            interned: DashMap::new(),
            names: DashMap::new(),
        }
    }

    fn intern(&self, name: &str) -> &'static str {
        if let Some(existing) = self.interned.get(name) {
            return *existing;
        }
        // A racing intern of the same name may leak one copy; the winner's
        // pointer is the identity from then on.
        let leaked: &'static str = Box::leak(name.to_string().into_boxed_str());
        *self.interned.entry(name.to_string()).or_insert(leaked)
    }

    pub fn register<M: Message>(&self, name: &str) {
        let name = self.intern(name);
        self.names.insert(TypeId::of::<M>(), name);
    }

    pub fn lookup<M: Message>(&self) -> Result<MsgTypeId, UnregisteredMessage> {
        match self.identity {
            MessageIdentity::Implicit => Ok(MsgTypeId::Implicit(TypeId::of::<M>())),
            MessageIdentity::Named => self
                .names
                .get(&TypeId::of::<M>())
                .map(|name| MsgTypeId::Named(*name))
                .ok_or_else(|| UnregisteredMessage {
                    type_name: std::any::type_name::<M>(),
                }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MessageConfig {
    pub identity: MessageIdentity,
}

impl MessageConfig {
    pub(crate) fn from_config(config: &Config) -> Result<Self, String> {
        let identity = config.get_string("messages.identity").unwrap().parse()?;
        Ok(MessageConfig { identity })
    }
}

/// Header at the front of every message block.
///
/// The value lives in the same block, directly after the header; the
/// function pointers recover the erased type's drop, `Any` view and
/// `Debug` formatting.
#[repr(C)]
struct MessageHeader {
    from: Address,
    type_id: MsgTypeId,
    rust_type: TypeId,
    layout: Layout,
    drop_value: unsafe fn(*mut MessageHeader),
    any_value: unsafe fn(*const MessageHeader) -> *const dyn Any,
    debug_value: unsafe fn(*const MessageHeader, &mut fmt::Formatter<'_>) -> fmt::Result,
}

#[repr(C)]
struct MessageNode<M> {
    header: MessageHeader,
    value: ManuallyDrop<M>,
}

unsafe fn drop_value<M>(header: *mut MessageHeader) {
    let node = header as *mut MessageNode<M>;
    ManuallyDrop::drop(&mut (*node).value);
}

unsafe fn any_value<M: Any>(header: *const MessageHeader) -> *const dyn Any {
    let node = header as *const MessageNode<M>;
    let value: &M = &(*node).value;
    value as &dyn Any as *const dyn Any
}

unsafe fn debug_value<M: fmt::Debug>(
    header: *const MessageHeader,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    let node = header as *const MessageNode<M>;
    let value: &M = &(*node).value;
    fmt::Debug::fmt(value, f)
}

/// An in-flight message: one cache-allocated block holding the sender
/// address, the type tag and the value itself.
///
/// A `MessageRef` is owned by the mailbox it sits in, then by the
/// dispatcher while its handlers run. It is consumed explicitly with
/// [`MessageRef::destroy`], which returns the block to a message cache;
/// every runtime path either hands the value to handlers or to the
/// fallback, then destroys the envelope exactly once.
pub(crate) struct MessageRef {
    node: NonNull<MessageHeader>,
}

// The constructor requires `M: Message`, which is `Send`; the block itself
// is exclusively owned.
unsafe impl Send for MessageRef {}

impl MessageRef {
    /// Allocates an envelope for `value`. On allocation failure the value
    /// is handed back so the caller can divert it to the fallback.
    pub fn allocate<M: Message>(
        cache: &mut MessageCache,
        value: M,
        from: Address,
        type_id: MsgTypeId,
    ) -> Result<MessageRef, M> {
        let layout = Layout::new::<MessageNode<M>>();
        let raw = match cache.allocate(layout) {
            Some(raw) => raw,
            None => return Err(value),
        };
        let node = raw.cast::<MessageNode<M>>();
        unsafe {
            node.as_ptr().write(MessageNode {
                header: MessageHeader {
                    from,
                    type_id,
                    rust_type: TypeId::of::<M>(),
                    layout,
                    drop_value: drop_value::<M>,
                    any_value: any_value::<M>,
                    debug_value: debug_value::<M>,
                },
                value: ManuallyDrop::new(value),
            });
        }
        Ok(MessageRef { node: node.cast() })
    }

    fn header(&self) -> &MessageHeader {
        unsafe { self.node.as_ref() }
    }

    pub fn sender(&self) -> Address {
        self.header().from
    }

    pub fn type_id(&self) -> MsgTypeId {
        self.header().type_id
    }

    pub fn is<M: Message>(&self) -> bool {
        self.header().rust_type == TypeId::of::<M>()
    }

    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        if self.is::<M>() {
            let node = self.node.as_ptr() as *const MessageNode<M>;
            Some(unsafe { &(*node).value })
        } else {
            None
        }
    }

    /// A type-erased view of the value, for the default and fallback
    /// handlers.
    pub fn any(&self) -> &dyn Any {
        unsafe { &*(self.header().any_value)(self.node.as_ptr()) }
    }

    /// Drops the value and returns the block to `cache`.
    pub fn destroy(self, cache: &mut MessageCache) {
        let node = self.node;
        std::mem::forget(self);
        unsafe {
            let layout = (*node.as_ptr()).layout;
            ((*node.as_ptr()).drop_value)(node.as_ptr());
            cache.free(node.cast(), layout);
        }
    }
}

impl fmt::Debug for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        unsafe { (self.header().debug_value)(self.node.as_ptr(), f) }
    }
}

impl Drop for MessageRef {
    fn drop(&mut self) {
        // Every runtime path destroys envelopes explicitly through a
        // cache; hitting this drop means one leaked. The block cannot be
        // freed here (no allocator at hand), so report it.
        error!("message envelope leaked: {:?}", self);
    }
}

/// A borrowed, type-erased view of a message, handed to default handlers
/// and carried inside [`DeadLetter`](crate::system::DeadLetter).
pub struct AnyMessage<'m> {
    from: Address,
    body: Body<'m>,
}

enum Body<'m> {
    Envelope(&'m MessageRef),
    Value {
        any: &'m dyn Any,
        debug: &'m dyn fmt::Debug,
    },
}

impl<'m> AnyMessage<'m> {
    pub(crate) fn from_envelope(envelope: &'m MessageRef) -> Self {
        AnyMessage {
            from: envelope.sender(),
            body: Body::Envelope(envelope),
        }
    }

    pub(crate) fn from_value(
        from: Address,
        any: &'m dyn Any,
        debug: &'m dyn fmt::Debug,
    ) -> Self {
        AnyMessage {
            from,
            body: Body::Value { any, debug },
        }
    }

    /// The address the message was sent from.
    pub fn sender(&self) -> Address {
        self.from
    }

    pub fn is<M: Message>(&self) -> bool {
        self.downcast_ref::<M>().is_some()
    }

    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        match &self.body {
            Body::Envelope(envelope) => envelope.any().downcast_ref::<M>(),
            Body::Value { any, .. } => any.downcast_ref::<M>(),
        }
    }
}

impl fmt::Debug for AnyMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.body {
            Body::Envelope(envelope) => fmt::Debug::fmt(envelope, f),
            Body::Value { debug, .. } => debug.fmt(f),
        }
    }
}
