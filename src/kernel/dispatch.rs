use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::error;

use crate::actor::{ActorCell, Dock};
use crate::actor::Context;
use crate::actor::HandlerTable;
use crate::kernel::message::AnyMessage;
use crate::kernel::worker::WorkerContext;
use crate::system::{Counter, DeadLetter, SystemCore};

/// Processes exactly one message from `cell`'s mailbox on this worker.
///
/// The directory slot is pinned for the whole dispatch, so a concurrent
/// stop cannot recycle the slot (and hand its index to a new actor) while
/// handlers are running. Handler panics are caught here: the pin, the dock
/// lock and the envelope are all released normally and the worker returns
/// to its scheduling loop with intact runtime state.
pub(crate) fn process_mailbox(cell: &Arc<ActorCell>, worker: &mut WorkerContext, core: &SystemCore) {
    // The head message stays counted in the mailbox until `finish`, which
    // is what keeps concurrent senders from scheduling the mailbox a
    // second time. An empty mailbox here means a concurrent stop drained
    // it already.
    let envelope = match cell.mailbox.take_front() {
        Some(envelope) => envelope,
        None => return,
    };

    core.counters.increment(Counter::MessagesProcessed);
    let address = cell.address();

    let mut handled = false;
    if let Some((_entity, _pin)) = core.actors.pin(address) {
        let mut dock = cell.dock.lock();
        let Dock { actor, table } = &mut *dock;
        if let Some(actor_box) = actor.as_mut() {
            table.validate();

            let HandlerTable {
                entries,
                default,
                scratch,
            } = table;
            let any_actor = actor_box.as_any_mut();
            let mut ctx =
                Context::new(address, envelope.sender(), core, scratch, Some(&mut *worker));

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let mut matched = false;
                for handler in entries.iter() {
                    if handler.type_id == envelope.type_id() {
                        (handler.invoke)(&mut *any_actor, &envelope, &mut ctx);
                        matched = true;
                    }
                }
                if !matched {
                    if let Some(default) = default {
                        let view = AnyMessage::from_envelope(&envelope);
                        (default)(&mut *any_actor, &view, &mut ctx);
                        matched = true;
                    }
                }
                matched
            }));

            handled = match outcome {
                Ok(matched) => matched,
                Err(_) => {
                    error!(
                        "actor {} panicked while handling {:?}; worker resumes",
                        address, envelope
                    );
                    true
                }
            };
        }
    }

    if !handled {
        // Deregistered between send and dispatch, or no handler matched
        // and no default handler was installed.
        let letter = DeadLetter {
            to: address,
            msg: AnyMessage::from_envelope(&envelope),
        };
        core.dead_letter(&letter);
    }

    // The dispatch token is ours until `finish`; nobody else can enqueue
    // this mailbox in between, so the local push needs no mailbox lock.
    if cell.mailbox.finish() {
        worker.local.push_back(cell.clone());
        core.counters.increment(Counter::LocalPushes);
    }

    envelope.destroy(&mut worker.cache);
}
