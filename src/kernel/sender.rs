use log::warn;

use crate::address::{Address, AddressDomain};
use crate::kernel::message::{AnyMessage, MessageRef};
use crate::kernel::worker::WorkerContext;
use crate::system::{Counter, DeadLetter, SystemCore};
use crate::Message;

/// The send pipeline, shared by `ActorSystem::send` and `Context::send`.
///
/// Worker-context sends allocate from the calling worker's message cache
/// and, when the destination mailbox was idle, enqueue it to that worker's
/// local queue. Sends from outside the pool use the system's global cache
/// and always enqueue to the shared queue. Receiver addresses bypass the
/// scheduler entirely: handlers run synchronously on the calling thread.
pub(crate) fn send_message<M: Message>(
    core: &SystemCore,
    worker: Option<&mut WorkerContext>,
    msg: M,
    from: Address,
    to: Address,
) -> bool {
    // Identity is checked first: an unregistered type fails fast, before
    // anything is allocated or queued, and is not diverted.
    let type_id = match core.registry.lookup::<M>() {
        Ok(type_id) => type_id,
        Err(err) => {
            warn!("send to {} refused: {}", to, err);
            return false;
        }
    };

    if core.is_shutting_down() {
        divert(core, from, to, &msg);
        return false;
    }

    match to.domain() {
        AddressDomain::Receiver => match core.receivers.get(to) {
            Some(receiver) => {
                receiver.push(&msg, type_id, from);
                true
            }
            None => {
                divert(core, from, to, &msg);
                false
            }
        },
        AddressDomain::Actor => {
            let cell = match core.actors.get(to) {
                Some(cell) => cell,
                None => {
                    divert(core, from, to, &msg);
                    return false;
                }
            };

            let (envelope, worker) = match worker {
                Some(worker) => {
                    match MessageRef::allocate(&mut worker.cache, msg, from, type_id) {
                        Ok(envelope) => (envelope, Some(worker)),
                        Err(value) => {
                            divert(core, from, to, &value);
                            return false;
                        }
                    }
                }
                None => {
                    let result = {
                        let mut cache = core.global_cache.lock();
                        MessageRef::allocate(&mut cache, msg, from, type_id)
                    };
                    match result {
                        Ok(envelope) => (envelope, None),
                        Err(value) => {
                            divert(core, from, to, &value);
                            return false;
                        }
                    }
                }
            };

            let push = cell.mailbox.push(envelope);
            core.counters
                .record_max(Counter::MailboxQueueMax, u64::from(push.count));

            if push.was_empty {
                match worker {
                    Some(worker) => {
                        worker.local.push_back(cell.clone());
                        core.counters.increment(Counter::LocalPushes);
                    }
                    None => {
                        core.scheduler.push_shared(cell.clone());
                        core.counters.increment(Counter::SharedPushes);
                    }
                }
            }
            true
        }
    }
}

fn divert<M: Message>(core: &SystemCore, from: Address, to: Address, value: &M) {
    let letter = DeadLetter {
        to,
        msg: AnyMessage::from_value(from, value, value),
    };
    core.dead_letter(&letter);
}
