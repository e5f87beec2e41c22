//! Delivery-order and lifecycle tests for the message bus

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use troupe_bus::{AgentId, Delivery, Message, MessageBus, payload};

fn id(s: &str) -> AgentId {
    AgentId::parse(s).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_recipient_order_survives_concurrent_traffic() {
    const N: u64 = 200;

    let bus = Arc::new(MessageBus::new());
    let target = bus.open(id("target"));
    let noise_sinks: Vec<_> = (0..4).map(|i| bus.open(id(&format!("sink-{i}")))).collect();

    // Unrelated producers hammer other mailboxes and broadcast.
    let mut noise = Vec::new();
    for i in 0..4 {
        let bus = Arc::clone(&bus);
        noise.push(tokio::spawn(async move {
            for n in 0..N {
                bus.send(Message::direct(
                    id(&format!("noise-{i}")),
                    id(&format!("sink-{}", n % 4)),
                    payload(json!({ "n": n })),
                ));
                if n % 10 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }

    let producer = {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move {
            for n in 0..N {
                bus.send(Message::direct(
                    id("producer"),
                    id("target"),
                    payload(json!({ "seq": n })),
                ));
                if n % 7 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    let mut expected = 0u64;
    while expected < N {
        match target.recv_timeout(Duration::from_secs(2)).await {
            Delivery::Message(m) => {
                assert_eq!(m.sender_id, id("producer"));
                assert_eq!(m.payload["seq"], json!(expected));
                expected += 1;
            }
            other => panic!("stalled at {expected}: {other:?}"),
        }
    }

    producer.await.unwrap();
    for task in noise {
        task.await.unwrap();
    }
    drop(noise_sinks);
    drop(target);
    assert!(bus.is_empty());
}

#[tokio::test]
async fn test_broadcast_reaches_every_other_mailbox() {
    let bus = Arc::new(MessageBus::new());
    let names = ["a", "b", "c", "d"];
    let boxes: Vec<_> = names.iter().map(|n| bus.open(id(n))).collect();

    bus.send(Message::broadcast(id("c"), payload(json!({"content": "all hands"}))));

    for (name, mailbox) in names.iter().zip(&boxes) {
        let delivery = mailbox.recv_timeout(Duration::from_millis(50)).await;
        if *name == "c" {
            assert!(matches!(delivery, Delivery::Idle));
        } else {
            match delivery {
                Delivery::Message(m) => assert_eq!(m.text("content"), Some("all hands")),
                other => panic!("{name} missed broadcast: {other:?}"),
            }
        }
    }
}

#[tokio::test]
async fn test_sends_after_unregister_are_dropped() {
    let bus = Arc::new(MessageBus::new());
    bus.register(&id("gone"));
    bus.unregister(&id("gone"));

    bus.send(Message::direct(id("x"), id("gone"), payload(json!({}))));
    assert!(!bus.is_registered(&id("gone")));

    // A later registration starts with an empty queue.
    let fresh = bus.open(id("gone"));
    assert!(matches!(
        fresh.recv_timeout(Duration::from_millis(30)).await,
        Delivery::Idle
    ));
}
