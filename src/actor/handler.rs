use std::any::Any;
use std::fmt;

use crate::actor::context::Context;
use crate::kernel::message::{AnyMessage, MessageRef, MsgTypeId};

/// Identifies one registered handler on one actor, for deregistration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandlerId(u32);

pub(crate) type InvokeFn =
    Box<dyn for<'c> Fn(&mut dyn Any, &MessageRef, &mut Context<'c>) + Send>;

pub(crate) type DefaultFn =
    Box<dyn for<'c, 'm> Fn(&mut dyn Any, &AnyMessage<'m>, &mut Context<'c>) + Send>;

pub(crate) struct Handler {
    pub id: HandlerId,
    pub type_id: MsgTypeId,
    pub marked: bool,
    pub invoke: InvokeFn,
}

/// Handler mutations requested while a dispatch is running.
///
/// Handlers may register and deregister handlers (including themselves)
/// from inside a handler body. Applying such changes immediately would
/// invalidate the dispatch loop's iteration over the live list, so they
/// are parked here and merged by `validate` just before the next message
/// is dispatched to the actor.
pub(crate) struct HandlerScratch {
    next_id: u32,
    additions: Vec<Handler>,
    removals: Vec<HandlerId>,
    default_change: Option<Option<DefaultFn>>,
}

/// The per-actor handler table: live handlers in registration order, the
/// optional default handler and the deferred-change scratch.
pub(crate) struct HandlerTable {
    pub entries: Vec<Handler>,
    pub default: Option<DefaultFn>,
    pub scratch: HandlerScratch,
}

impl HandlerScratch {
    pub fn add(&mut self, type_id: MsgTypeId, invoke: InvokeFn) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.additions.push(Handler {
            id,
            type_id,
            marked: false,
            invoke,
        });
        id
    }

    pub fn remove(&mut self, id: HandlerId) {
        self.removals.push(id);
    }

    pub fn set_default(&mut self, handler: Option<DefaultFn>) {
        self.default_change = Some(handler);
    }
}

impl HandlerTable {
    pub fn new() -> Self {
        HandlerTable {
            entries: Vec::new(),
            default: None,
            scratch: HandlerScratch {
                next_id: 0,
                additions: Vec::new(),
                removals: Vec::new(),
                default_change: None,
            },
        }
    }

    /// Merges pending changes into the live list. New handlers are spliced
    /// in first so a registration immediately followed by a deregistration
    /// of the same id resolves to "gone"; tombstoned handlers are then
    /// dropped, freeing their closures.
    pub fn validate(&mut self) {
        let scratch = &mut self.scratch;
        if scratch.additions.is_empty()
            && scratch.removals.is_empty()
            && scratch.default_change.is_none()
        {
            return;
        }

        self.entries.append(&mut scratch.additions);
        for id in scratch.removals.drain(..) {
            if let Some(handler) = self.entries.iter_mut().find(|h| h.id == id) {
                handler.marked = true;
            }
        }
        self.entries.retain(|h| !h.marked);

        if let Some(default) = scratch.default_change.take() {
            self.default = default;
        }
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("entries", &self.entries.len())
            .field("default", &self.default.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::TypeId;

    fn noop() -> InvokeFn {
        Box::new(|_, _, _| {})
    }

    fn id_of<T: 'static>() -> MsgTypeId {
        MsgTypeId::Implicit(TypeId::of::<T>())
    }

    #[test]
    fn test_additions_splice_in_registration_order() {
        let mut table = HandlerTable::new();
        let a = table.scratch.add(id_of::<u32>(), noop());
        let b = table.scratch.add(id_of::<u64>(), noop());
        table.validate();

        assert_eq!(table.entries.len(), 2);
        assert_eq!(table.entries[0].id, a);
        assert_eq!(table.entries[1].id, b);
    }

    #[test]
    fn test_removal_is_deferred_until_validate() {
        let mut table = HandlerTable::new();
        let a = table.scratch.add(id_of::<u32>(), noop());
        table.validate();
        assert_eq!(table.entries.len(), 1);

        // Deregistration parks in the scratch; the live list is untouched
        // until the next validation.
        table.scratch.remove(a);
        assert_eq!(table.entries.len(), 1);
        table.validate();
        assert!(table.entries.is_empty());
    }

    #[test]
    fn test_register_then_deregister_before_validate() {
        let mut table = HandlerTable::new();
        let a = table.scratch.add(id_of::<u32>(), noop());
        table.scratch.remove(a);
        table.validate();
        assert!(table.entries.is_empty());
    }

    #[test]
    fn test_default_handler_change_deferred() {
        let mut table = HandlerTable::new();
        table.scratch.set_default(Some(Box::new(|_, _, _| {})));
        assert!(table.default.is_none());
        table.validate();
        assert!(table.default.is_some());

        table.scratch.set_default(None);
        table.validate();
        assert!(table.default.is_none());
    }
}
