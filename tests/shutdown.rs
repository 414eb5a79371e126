use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use troupe::actors::*;

#[derive(Debug)]
struct Work(u32);

#[derive(Debug)]
struct Block;

/// Counts each work item, slowly.
struct Slow {
    handled: Arc<AtomicUsize>,
}

impl Actor for Slow {
    fn pre_start(&mut self, ctx: &mut Context<'_>) {
        ctx.register(|actor: &mut Slow, _: &Work, _ctx| {
            actor.handled.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
        });
    }
}

#[test]
fn test_shutdown_drains_backlog_to_fallback() {
    const BACKLOG: usize = 10_000;

    let handled = Arc::new(AtomicUsize::new(0));
    let diverted = Arc::new(AtomicUsize::new(0));

    let sys = {
        let diverted = diverted.clone();
        SystemBuilder::new()
            .name("backlog")
            .workers(2)
            .fallback(move |letter| {
                if letter.msg.is::<Work>() {
                    diverted.fetch_add(1, Ordering::SeqCst);
                }
            })
            .create()
            .unwrap()
    };

    let slow = sys
        .actor_of(Props::new_args(
            |handled| Slow { handled },
            handled.clone(),
        ))
        .unwrap();

    for i in 0..BACKLOG {
        assert!(sys.send(Work(i as u32), Address::null(), slow));
    }

    // Let at least one dispatch land, then pull the plug.
    while handled.load(Ordering::SeqCst) == 0 {
        thread::yield_now();
    }
    sys.shutdown();

    // Every accepted message was either handled or diverted, exactly
    // once; with a 1 ms handler the backlog cannot have drained.
    let handled = handled.load(Ordering::SeqCst);
    let diverted = diverted.load(Ordering::SeqCst);
    assert!(handled >= 1);
    assert!(diverted >= 1);
    assert_eq!(handled + diverted, BACKLOG);
}

#[test]
fn test_send_after_shutdown_is_diverted() {
    let diverted = Arc::new(AtomicUsize::new(0));
    let sys = {
        let diverted = diverted.clone();
        SystemBuilder::new()
            .name("after-shutdown")
            .fallback(move |letter| {
                if letter.msg.is::<Work>() {
                    diverted.fetch_add(1, Ordering::SeqCst);
                }
            })
            .create()
            .unwrap()
    };
    let handled = Arc::new(AtomicUsize::new(0));
    let slow = sys
        .actor_of(Props::new_args(
            |handled| Slow { handled },
            handled.clone(),
        ))
        .unwrap();

    sys.shutdown();
    assert!(!sys.send(Work(1), Address::null(), slow));
    assert_eq!(diverted.load(Ordering::SeqCst), 1);

    // Shutdown is idempotent.
    sys.shutdown();
}

#[test]
fn test_stop_drains_queued_messages_and_runs_post_stop() {
    let diverted = Arc::new(AtomicUsize::new(0));
    let sys = {
        let diverted = diverted.clone();
        SystemBuilder::new()
            .name("stop-drain")
            .workers(1)
            .fallback(move |letter| {
                if letter.msg.is::<Work>() {
                    diverted.fetch_add(1, Ordering::SeqCst);
                }
            })
            .create()
            .unwrap()
    };

    /// Blocks the single worker on request, so messages can pile up
    /// behind it; records its stop.
    struct Plug {
        entered: Arc<AtomicBool>,
        release: Arc<AtomicBool>,
        stopped: Arc<AtomicBool>,
    }
    impl Actor for Plug {
        fn pre_start(&mut self, ctx: &mut Context<'_>) {
            ctx.register(|actor: &mut Plug, _: &Block, _ctx| {
                actor.entered.store(true, Ordering::SeqCst);
                while !actor.release.load(Ordering::SeqCst) {
                    thread::yield_now();
                }
            });
            ctx.register(|_: &mut Plug, _: &Work, _ctx| {});
        }
        fn post_stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    let entered = Arc::new(AtomicBool::new(false));
    let release = Arc::new(AtomicBool::new(false));
    let stopped = Arc::new(AtomicBool::new(false));
    let plug = sys
        .actor_of(Props::new_args(
            |(entered, release, stopped)| Plug {
                entered,
                release,
                stopped,
            },
            (entered.clone(), release.clone(), stopped.clone()),
        ))
        .unwrap();

    assert!(sys.send(Block, Address::null(), plug));
    while !entered.load(Ordering::SeqCst) {
        thread::yield_now();
    }

    // The worker is parked inside the Block handler; these five queue up.
    for i in 0..5 {
        assert!(sys.send(Work(i), Address::null(), plug));
    }

    // stop() drains the backlog immediately, then waits for the in-flight
    // Block handler before running post_stop; release it from the side.
    let releaser = {
        let release = release.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            release.store(true, Ordering::SeqCst);
        })
    };
    assert!(sys.stop(plug));
    releaser.join().unwrap();

    assert_eq!(diverted.load(Ordering::SeqCst), 5);
    assert!(stopped.load(Ordering::SeqCst));
    sys.shutdown();
}
