use parking_lot::Mutex;

use crate::actor::actor::AnyActor;
use crate::actor::handler::HandlerTable;
use crate::address::Address;
use crate::kernel::mailbox::Mailbox;

/// The runtime half of an actor: its mailbox plus the dock holding the
/// actor object and handler table between dispatches.
///
/// Cells are shared (`Arc`) between the directory slot and whichever work
/// queue the mailbox is currently enqueued on. The dock mutex is
/// uncontended in steady state because a mailbox is dispatched by at most
/// one worker at a time; it only arbitrates between a dispatch and a
/// concurrent `stop`.
pub(crate) struct ActorCell {
    address: Address,
    pub mailbox: Mailbox,
    pub dock: Mutex<Dock>,
}

pub(crate) struct Dock {
    /// The parked actor. Taken by `stop`; a dispatch finding it gone
    /// diverts the message to the fallback handler.
    pub actor: Option<Box<dyn AnyActor>>,
    pub table: HandlerTable,
}

impl ActorCell {
    pub fn new(address: Address) -> Self {
        ActorCell {
            address,
            mailbox: Mailbox::new(),
            dock: Mutex::new(Dock {
                actor: None,
                table: HandlerTable::new(),
            }),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }
}
