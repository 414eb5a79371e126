use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::thread_rng;

use troupe::actors::*;

#[derive(Debug)]
struct Value(u32);

/// Forwards every value to a collector address.
struct Relay {
    collector: Address,
}

impl Actor for Relay {
    fn pre_start(&mut self, ctx: &mut Context<'_>) {
        ctx.register(|actor: &mut Relay, msg: &Value, ctx| {
            let collector = actor.collector;
            ctx.send(Value(msg.0), collector);
        });
    }
}

#[test]
fn test_fan_out_collects_every_value() {
    const VALUES: u32 = 10_000;
    const RELAYS: usize = 16;

    let sys = SystemBuilder::new()
        .name("fan-out")
        .workers(4)
        .create()
        .unwrap();
    let rx = sys.receiver().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        rx.register(move |msg: &Value, _| seen.lock().unwrap().push(msg.0));
    }

    let relays: Vec<Address> = (0..RELAYS)
        .map(|_| {
            sys.actor_of(Props::new_args(
                |collector| Relay { collector },
                rx.address(),
            ))
            .unwrap()
        })
        .collect();

    let mut order: Vec<u32> = (0..VALUES).collect();
    order.shuffle(&mut thread_rng());
    for i in order {
        let relay = relays[i as usize % RELAYS];
        assert!(sys.send(Value(i), Address::null(), relay));
    }
    rx.wait_for(u64::from(VALUES));

    // Exactly the multiset 0..VALUES arrived, once each.
    let mut seen = seen.lock().unwrap().clone();
    seen.sort_unstable();
    assert_eq!(seen, (0..VALUES).collect::<Vec<u32>>());
    sys.shutdown();
}

#[test]
fn test_direct_send_delivers_on_calling_thread() {
    let sys = SystemBuilder::new().name("direct").create().unwrap();
    let rx = sys.receiver().unwrap();

    let thread_names = Arc::new(Mutex::new(Vec::new()));
    {
        let thread_names = thread_names.clone();
        rx.register(move |_: &Value, _| {
            let name = thread::current().name().unwrap_or("unnamed").to_string();
            thread_names.lock().unwrap().push(name);
        });
    }

    // Sends to a receiver bypass the scheduler: the handler runs here.
    assert!(sys.send(Value(1), Address::null(), rx.address()));
    assert_eq!(rx.count(), 1);
    rx.wait();

    let current = thread::current().name().unwrap_or("unnamed").to_string();
    assert_eq!(*thread_names.lock().unwrap(), vec![current]);
    sys.shutdown();
}

#[test]
fn test_wait_advances_relative_to_previous_wait() {
    let sys = SystemBuilder::new().name("waits").create().unwrap();
    let rx = sys.receiver().unwrap();

    for i in 0..3 {
        assert!(sys.send(Value(i), Address::null(), rx.address()));
    }
    rx.wait_for(3);
    assert_eq!(rx.count(), 3);

    for i in 0..2 {
        assert!(sys.send(Value(i), Address::null(), rx.address()));
    }
    rx.wait_for(2);
    assert_eq!(rx.count(), 5);
    sys.shutdown();
}

#[test]
fn test_wait_blocks_until_message_arrives() {
    let sys = SystemBuilder::new().name("blocking-wait").create().unwrap();
    let rx = Arc::new(sys.receiver().unwrap());
    rx.register(|_: &Value, _| {});

    let sender = {
        let sys = sys.clone();
        let to = rx.address();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            assert!(sys.send(Value(7), Address::null(), to));
        })
    };

    rx.wait();
    assert_eq!(rx.count(), 1);
    sender.join().unwrap();
    sys.shutdown();
}

#[test]
fn test_send_to_dropped_receiver_fails() {
    let sys = SystemBuilder::new().name("dropped").create().unwrap();
    let rx = sys.receiver().unwrap();
    let address = rx.address();
    drop(rx);

    assert!(!sys.send(Value(1), Address::null(), address));
    sys.shutdown();
}

#[test]
fn test_unmatched_messages_still_count() {
    let sys = SystemBuilder::new().name("unmatched").create().unwrap();
    let rx = sys.receiver().unwrap();
    rx.register(|_: &Value, _| {});

    // A message type with no registered handler advances the count all
    // the same.
    assert!(sys.send("stray".to_string(), Address::null(), rx.address()));
    rx.wait();
    assert_eq!(rx.count(), 1);
    sys.shutdown();
}
