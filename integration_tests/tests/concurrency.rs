mod common;

use std::collections::HashSet;
use std::thread;

use console_runtime::{Interpreter, RawValue};

use common::test_proxy;

const PRODUCERS: usize = 4;
const PER_PRODUCER: usize = 250;

#[test]
fn concurrent_enqueue_and_drain_loses_nothing() {
    let mut console = Interpreter::new();
    console.register_variable("total", 0);
    let (mut proxy, sink) = test_proxy(console);

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let queue = proxy.queue_handle();
            thread::spawn(move || {
                for n in 0..PER_PRODUCER {
                    assert!(queue.enqueue(0, format!("total = total + 1; {}", producer * 1000 + n)));
                }
            })
        })
        .collect();

    let mut frame = 0;
    let mut ran = 0;
    while producers.iter().any(|producer| !producer.is_finished()) {
        frame += 1;
        ran += proxy.process_pending_commands(frame);
    }
    for producer in producers {
        producer.join().expect("producer thread");
    }
    ran += proxy.process_pending_commands(frame + 1);

    assert_eq!(ran, PRODUCERS * PER_PRODUCER);
    assert_eq!(
        proxy.interpreter().variable("total").and_then(|v| v.raw_value()),
        Some(RawValue::Int((PRODUCERS * PER_PRODUCER) as i64))
    );

    let tags: HashSet<String> = sink
        .outputs()
        .iter()
        .filter_map(|output| output.lines().nth(1).map(str::to_string))
        .collect();
    assert_eq!(tags.len(), PRODUCERS * PER_PRODUCER);

    let stats = proxy.stats();
    assert_eq!(stats.received, (PRODUCERS * PER_PRODUCER) as u64);
    assert_eq!(stats.executed, stats.received);
    assert_eq!(stats.failed, 0);
}

#[test]
fn per_producer_order_is_preserved() {
    let mut console = Interpreter::new();
    console.register_variable("seen", -1);
    let (mut proxy, sink) = test_proxy(console);

    let queue = proxy.queue_handle();
    let producer = thread::spawn(move || {
        for n in 0..200 {
            queue.enqueue(0, format!("seen = {n}"));
        }
    });
    producer.join().expect("producer thread");
    proxy.process_pending_commands(1);

    let expected: Vec<String> = (0..200).map(|n| format!("seen = {n}")).collect();
    assert_eq!(sink.outputs(), expected);
}
