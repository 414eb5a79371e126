use std::sync::{Arc, Mutex};
use std::thread;

use troupe::actors::*;

#[derive(Debug)]
struct Ball(u32);

#[derive(Debug)]
struct Done;

/// Echoes every ball straight back to its sender.
struct Echo;

impl Actor for Echo {
    fn pre_start(&mut self, ctx: &mut Context<'_>) {
        ctx.register(|_: &mut Echo, msg: &Ball, ctx| {
            let sender = ctx.sender();
            ctx.send(Ball(msg.0), sender);
        });
    }
}

/// Counts a ball down against the echo until it reaches zero, then
/// reports completion.
struct Driver {
    echo: Address,
    report: Address,
}

impl Actor for Driver {
    fn pre_start(&mut self, ctx: &mut Context<'_>) {
        ctx.register(|actor: &mut Driver, msg: &Ball, ctx| {
            if msg.0 == 0 {
                ctx.send(Done, actor.report);
            } else {
                ctx.send(Ball(msg.0 - 1), actor.echo);
            }
        });
    }
}

/// Forwards every ball to a collector address.
struct Forwarder {
    collector: Address,
}

impl Actor for Forwarder {
    fn pre_start(&mut self, ctx: &mut Context<'_>) {
        ctx.register(|actor: &mut Forwarder, msg: &Ball, ctx| {
            let collector = actor.collector;
            ctx.send(Ball(msg.0), collector);
        });
    }
}

fn forwarder_props(collector: Address) -> BoxActorProd<Forwarder> {
    Props::new_args(|collector| Forwarder { collector }, collector)
}

#[test]
fn test_ping_pong() {
    const ROUNDS: u32 = 50_000;

    let sys = SystemBuilder::new()
        .name("ping-pong")
        .workers(2)
        .create()
        .unwrap();
    let rx = sys.receiver().unwrap();
    rx.register(|_: &Done, _| {});

    let echo = sys.actor_of(Props::new(|| Echo)).unwrap();
    let driver = sys
        .actor_of(Props::new_args(
            |(echo, report)| Driver { echo, report },
            (echo, rx.address()),
        ))
        .unwrap();

    assert!(sys.send(Ball(ROUNDS), driver, echo));
    rx.wait();

    // The echo and the driver each dispatched balls ROUNDS..=0.
    assert_eq!(
        sys.counter_value(Counter::MessagesProcessed),
        u64::from(ROUNDS + 1) * 2
    );
    sys.shutdown();
}

#[test]
fn test_per_sender_fifo() {
    let sys = SystemBuilder::new()
        .name("fifo")
        .workers(2)
        .create()
        .unwrap();
    let rx = sys.receiver().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        rx.register(move |msg: &Ball, _| seen.lock().unwrap().push(msg.0));
    }

    let forwarder = sys.actor_of(forwarder_props(rx.address())).unwrap();
    for i in 0..200 {
        assert!(sys.send(Ball(i), Address::null(), forwarder));
    }
    rx.wait_for(200);

    // One sender, one mailbox: program order is preserved end to end.
    let seen = seen.lock().unwrap();
    assert_eq!(*seen, (0..200).collect::<Vec<u32>>());
    sys.shutdown();
}

#[test]
fn test_address_reuse_is_generation_safe() {
    let sys = SystemBuilder::new()
        .name("reuse")
        .max_actors(1)
        .create()
        .unwrap();
    let rx = sys.receiver().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        rx.register(move |msg: &Ball, _| seen.lock().unwrap().push(msg.0));
    }

    let first = sys.actor_of(forwarder_props(rx.address())).unwrap();
    assert!(sys.send(Ball(1), Address::null(), first));
    rx.wait();

    assert!(sys.stop(first));

    // The dispatcher's slot pin can outlive stop() by an instant; with a
    // capacity-one directory the slot becomes reusable at the last unpin.
    let second = loop {
        match sys.actor_of(forwarder_props(rx.address())) {
            Ok(address) => break address,
            Err(_) => thread::yield_now(),
        }
    };

    // The capacity-one directory reuses the slot; the generation moves on.
    assert_eq!(second.index(), first.index());
    assert!(second.generation() > first.generation());

    // The stale address must not reach the new actor.
    assert!(!sys.send(Ball(99), Address::null(), first));
    assert!(sys.send(Ball(2), Address::null(), second));
    rx.wait();

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![1, 2]);
    sys.shutdown();
}

#[test]
fn test_directory_capacity() {
    let sys = SystemBuilder::new()
        .name("capacity")
        .max_actors(2)
        .create()
        .unwrap();

    let a = sys.actor_of(Props::new(|| Echo)).unwrap();
    let _b = sys.actor_of(Props::new(|| Echo)).unwrap();
    let err = sys.actor_of(Props::new(|| Echo)).unwrap_err();
    assert!(matches!(err, CreateError::DirectoryExhausted));

    // Stopping one frees capacity.
    assert!(sys.stop(a));
    assert!(sys.actor_of(Props::new(|| Echo)).is_ok());
    sys.shutdown();
}

#[test]
fn test_panicking_factory_reports_create_error() {
    let sys = SystemBuilder::new().name("panics").create().unwrap();

    let err = sys
        .actor_of(Props::new(|| -> Echo { panic!("factory failure") }))
        .unwrap_err();
    assert!(matches!(err, CreateError::Panicked));
    assert_eq!(sys.actor_count(), 0);

    // The reserved slot was returned; creation still works.
    assert!(sys.actor_of(Props::new(|| Echo)).is_ok());
    assert_eq!(sys.actor_count(), 1);
    sys.shutdown();
}

#[test]
fn test_stop_returns_false_for_unknown_address() {
    let sys = SystemBuilder::new().name("unknown-stop").create().unwrap();
    let actor = sys.actor_of(Props::new(|| Echo)).unwrap();

    assert!(sys.stop(actor));
    assert!(!sys.stop(actor));
    assert!(!sys.stop(Address::null()));
    sys.shutdown();
}

#[test]
fn test_system_name_rules() {
    // Names lead log lines: a letter first, then letters, digits, - or _.
    let sys = SystemBuilder::new().name("ping-pong_2").create().unwrap();
    sys.shutdown();

    for bad in ["", "9lives", "-dash", "has space", "dot.name"] {
        let err = SystemBuilder::new().name(bad).create().unwrap_err();
        assert!(matches!(err, SystemError::InvalidName(_)));
    }
}

#[test]
fn test_independent_systems_coexist() {
    let left = SystemBuilder::new().name("left").create().unwrap();
    let right = SystemBuilder::new().name("right").create().unwrap();
    assert_ne!(left.id(), right.id());

    let left_rx = left.receiver().unwrap();
    let right_rx = right.receiver().unwrap();
    left_rx.register(|_: &Ball, _| {});
    right_rx.register(|_: &Ball, _| {});

    let left_fwd = left.actor_of(forwarder_props(left_rx.address())).unwrap();
    let right_fwd = right.actor_of(forwarder_props(right_rx.address())).unwrap();

    assert!(left.send(Ball(1), Address::null(), left_fwd));
    assert!(right.send(Ball(2), Address::null(), right_fwd));
    left_rx.wait();
    right_rx.wait();

    // Counters are per system, not per process.
    assert_eq!(left.counter_value(Counter::MessagesProcessed), 1);
    assert_eq!(right.counter_value(Counter::MessagesProcessed), 1);

    left.shutdown();
    right.shutdown();
}

#[test]
fn test_create_after_shutdown_fails() {
    let sys = SystemBuilder::new().name("closed").create().unwrap();
    sys.shutdown();

    let err = sys.actor_of(Props::new(|| Echo)).unwrap_err();
    assert!(matches!(err, CreateError::ShuttingDown));
}
