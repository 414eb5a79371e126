use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::kernel::fault;
use crate::kernel::message::MessageRef;

/// A per-actor FIFO of unprocessed messages plus its scheduling state.
///
/// The message count doubles as the scheduling token. A mailbox must be
/// enqueued on exactly one work queue whenever it has unprocessed messages
/// and is not being dispatched, and never more than once:
///
/// - `push` reports whether the count went from zero to one; only that
///   sender enqueues the mailbox.
/// - `take_front` removes the head message for dispatch but leaves the
///   count untouched, so concurrent senders observe a busy mailbox and do
///   not enqueue it.
/// - `finish` decrements the count once the dispatch is over and reports
///   whether messages remain, in which case the dispatching worker (the
///   sole owner of the token at that point) re-enqueues the mailbox.
///
/// FIFO order between any one sender and this mailbox follows from the
/// queue lock; ordering across senders is whatever the lock arbitration
/// yields.
pub(crate) struct Mailbox {
    inner: Mutex<MailboxInner>,
}

struct MailboxInner {
    queue: VecDeque<MessageRef>,
    count: u32,
}

pub(crate) struct PushResult {
    /// The mailbox had no unprocessed messages before this push; the
    /// caller must enqueue it to a work queue.
    pub was_empty: bool,
    /// Queue depth after the push, for the high-water counter.
    pub count: u32,
}

impl Mailbox {
    pub fn new() -> Self {
        Mailbox {
            inner: Mutex::new(MailboxInner {
                queue: VecDeque::new(),
                count: 0,
            }),
        }
    }

    pub fn push(&self, envelope: MessageRef) -> PushResult {
        let mut inner = self.inner.lock();
        inner.queue.push_back(envelope);
        inner.count += 1;
        PushResult {
            was_empty: inner.count == 1,
            count: inner.count,
        }
    }

    /// Removes the head message for dispatch. The message stays counted
    /// until the matching `finish`.
    pub fn take_front(&self) -> Option<MessageRef> {
        self.inner.lock().queue.pop_front()
    }

    /// Completes a dispatch started by `take_front`. Returns true when
    /// messages remain and the mailbox must be re-enqueued.
    pub fn finish(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.count == 0 {
            fault("mailbox finish without a message in flight");
        }
        inner.count -= 1;
        inner.count > 0
    }

    /// Empties the queue, for diversion to the fallback handler. A message
    /// currently being dispatched is not in the queue and stays counted
    /// until its `finish`.
    pub fn drain(&self) -> Vec<MessageRef> {
        let mut inner = self.inner.lock();
        let drained: Vec<MessageRef> = inner.queue.drain(..).collect();
        inner.count -= drained.len() as u32;
        drained
    }

    pub fn count(&self) -> u32 {
        self.inner.lock().count
    }
}
