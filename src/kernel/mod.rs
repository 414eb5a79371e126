pub mod cache;
pub mod dispatch;
pub mod mailbox;
pub mod message;
pub mod pool;
pub mod scheduler;
pub mod sender;
pub mod worker;

use log::error;

/// Reports a broken runtime invariant and aborts.
///
/// Invariant violations indicate a bug in the runtime itself, not in user
/// code; continuing would risk corrupted scheduling state, so the process
/// is taken down with a clear message instead.
pub(crate) fn fault(msg: &str) -> ! {
    error!("runtime invariant violated: {}", msg);
    std::process::abort();
}
