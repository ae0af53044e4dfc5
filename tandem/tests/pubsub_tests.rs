//! PUB/SUB filtering, fan-out and slow-subscriber behaviour.

use std::thread;
use std::time::{Duration, Instant};
use tandem::prelude::*;
use tandem::Bytes;

fn pub_sub(ctx: &Context, addr: &str, topics: &[&str]) -> (Socket, Socket) {
    let publisher = ctx.socket(SocketType::Pub).unwrap();
    let endpoint = publisher.bind(addr).unwrap();

    let subscriber = ctx.socket(SocketType::Sub).unwrap();
    for topic in topics {
        subscriber.subscribe(topic).unwrap();
    }
    subscriber.connect(&endpoint.to_string()).unwrap();
    (publisher, subscriber)
}

/// Publish `msg` until `subscriber` sees something, for TCP where the
/// connection and its subscriptions settle asynchronously.
fn publish_until_received(publisher: &Socket, subscriber: &Socket, msg: &str) -> Message {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        publisher.send(msg, Flags::NONE).unwrap();
        match subscriber.recv(Flags::DONTWAIT) {
            Ok(received) => return received,
            Err(SocketError::WouldBlock) if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => panic!("nothing received: {e}"),
        }
    }
}

#[test]
fn empty_prefix_receives_everything() {
    let ctx = Context::new();
    let (publisher, subscriber) = pub_sub(&ctx, "inproc://all", &[""]);

    for i in 0..10 {
        publisher.send(format!("message {i}"), Flags::NONE).unwrap();
    }
    for i in 0..10 {
        assert_eq!(
            subscriber.recv(Flags::NONE).unwrap(),
            format!("message {i}").as_str()
        );
    }
}

#[test]
fn topic_filtering() {
    let ctx = Context::new();
    let (publisher, subscriber) = pub_sub(&ctx, "inproc://topic", &["x"]);

    publisher.send("message", Flags::NONE).unwrap();
    assert!(matches!(
        subscriber.recv(Flags::DONTWAIT),
        Err(SocketError::WouldBlock)
    ));

    publisher.send("xmessage", Flags::NONE).unwrap();
    assert_eq!(subscriber.recv(Flags::DONTWAIT).unwrap(), "xmessage");
}

#[test]
fn no_subscription_receives_nothing() {
    let ctx = Context::new();
    let (publisher, subscriber) = pub_sub(&ctx, "inproc://none", &[]);

    publisher.send("anything", Flags::NONE).unwrap();
    assert!(matches!(
        subscriber.recv(Flags::DONTWAIT),
        Err(SocketError::WouldBlock)
    ));
}

#[test]
fn tcp_topic_filtering() {
    let ctx = Context::new();
    let (publisher, subscriber) = pub_sub(&ctx, "tcp://127.0.0.1:*", &["x"]);

    assert_eq!(
        publish_until_received(&publisher, &subscriber, "xmessage"),
        "xmessage"
    );

    subscriber
        .set_option(SocketOption::RecvTimeout(Some(Duration::from_secs(5))))
        .unwrap();
    publisher.send("message", Flags::NONE).unwrap();
    publisher.send("xmessage 2", Flags::NONE).unwrap();

    // Retries may still be in flight; "message" must never show up.
    loop {
        let received = subscriber.recv(Flags::NONE).unwrap();
        assert_ne!(received, "message");
        if received == "xmessage 2" {
            break;
        }
    }
}

#[test]
fn tcp_subscribe_after_connect() {
    let ctx = Context::new();
    let publisher = ctx.socket(SocketType::Pub).unwrap();
    let endpoint = publisher.bind("tcp://127.0.0.1:*").unwrap();

    let subscriber = ctx.socket(SocketType::Sub).unwrap();
    subscriber
        .set_option(SocketOption::RecvTimeout(Some(Duration::from_secs(5))))
        .unwrap();
    subscriber.connect(&endpoint.to_string()).unwrap();
    subscriber.subscribe("x").unwrap();
    thread::sleep(Duration::from_millis(100));

    publisher.send("message", Flags::NONE).unwrap();
    assert!(matches!(
        subscriber.recv(Flags::DONTWAIT),
        Err(SocketError::WouldBlock)
    ));

    publisher.send("xmessage", Flags::NONE).unwrap();
    assert_eq!(subscriber.recv(Flags::NONE).unwrap(), "xmessage");
}

#[test]
fn tcp_subscriptions_beyond_publisher_queue_are_applied() {
    let ctx = Context::new();
    let publisher = ctx.socket(SocketType::Pub).unwrap();
    publisher.set_option(SocketOption::RecvHwm(2)).unwrap();
    let endpoint = publisher.bind("tcp://127.0.0.1:*").unwrap();

    let subscriber = ctx.socket(SocketType::Sub).unwrap();
    for i in 0..20 {
        subscriber.subscribe(format!("t{i}")).unwrap();
    }
    subscriber.subscribe("x").unwrap();
    subscriber.connect(&endpoint.to_string()).unwrap();

    // Each send applies what the publisher has queued so far.
    assert_eq!(
        publish_until_received(&publisher, &subscriber, "xmessage"),
        "xmessage"
    );
}

#[test]
fn subscribe_after_connect() {
    let ctx = Context::new();
    let (publisher, subscriber) = pub_sub(&ctx, "inproc://late-sub", &[]);

    publisher.send("weather sunny", Flags::NONE).unwrap();
    subscriber.subscribe("weather").unwrap();
    publisher.send("weather rain", Flags::NONE).unwrap();

    assert_eq!(subscriber.recv(Flags::DONTWAIT).unwrap(), "weather rain");
    assert!(subscriber.recv(Flags::DONTWAIT).is_err());
}

#[test]
fn unsubscribe_stops_delivery() {
    let ctx = Context::new();
    let (publisher, subscriber) = pub_sub(&ctx, "inproc://unsub", &["a"]);

    publisher.send("a1", Flags::NONE).unwrap();
    assert_eq!(subscriber.recv(Flags::DONTWAIT).unwrap(), "a1");

    subscriber.unsubscribe("a").unwrap();
    publisher.send("a2", Flags::NONE).unwrap();
    assert!(matches!(
        subscriber.recv(Flags::DONTWAIT),
        Err(SocketError::WouldBlock)
    ));

    // Unknown prefixes are ignored.
    subscriber.unsubscribe("never").unwrap();
}

#[test]
fn subscriptions_are_counted() {
    let ctx = Context::new();
    let (publisher, subscriber) = pub_sub(&ctx, "inproc://counted", &["a", "a"]);
    assert_eq!(subscriber.subscriptions(), vec![Bytes::from_static(b"a")]);

    subscriber.unsubscribe("a").unwrap();
    publisher.send("a still", Flags::NONE).unwrap();
    assert_eq!(subscriber.recv(Flags::DONTWAIT).unwrap(), "a still");

    subscriber.unsubscribe("a").unwrap();
    assert!(subscriber.subscriptions().is_empty());
    publisher.send("a gone", Flags::NONE).unwrap();
    assert!(subscriber.recv(Flags::DONTWAIT).is_err());
}

#[test]
fn fan_out_to_several_subscribers() {
    let ctx = Context::new();
    let publisher = ctx.socket(SocketType::Pub).unwrap();
    publisher.bind("inproc://fan-out").unwrap();

    let subscribe = |topic: &str| {
        let s = ctx.socket(SocketType::Sub).unwrap();
        s.subscribe(topic).unwrap();
        s.connect("inproc://fan-out").unwrap();
        s
    };
    let everything = subscribe("");
    let sports = subscribe("sports");
    let news = subscribe("news");

    publisher.send("sports: 2-1", Flags::NONE).unwrap();
    publisher.send("news: calm", Flags::NONE).unwrap();

    assert_eq!(everything.recv(Flags::DONTWAIT).unwrap(), "sports: 2-1");
    assert_eq!(everything.recv(Flags::DONTWAIT).unwrap(), "news: calm");
    assert_eq!(sports.recv(Flags::DONTWAIT).unwrap(), "sports: 2-1");
    assert!(sports.recv(Flags::DONTWAIT).is_err());
    assert_eq!(news.recv(Flags::DONTWAIT).unwrap(), "news: calm");
    assert!(news.recv(Flags::DONTWAIT).is_err());
}

#[test]
fn slow_subscriber_drops_instead_of_blocking() {
    let ctx = Context::new();
    let publisher = ctx.socket(SocketType::Pub).unwrap();
    publisher.set_option(SocketOption::SendHwm(10)).unwrap();
    publisher.bind("inproc://slow").unwrap();

    let subscriber = ctx.socket(SocketType::Sub).unwrap();
    subscriber.set_option(SocketOption::RecvHwm(10)).unwrap();
    subscriber.subscribe("").unwrap();
    subscriber.connect("inproc://slow").unwrap();

    let started = Instant::now();
    for i in 0..100 {
        publisher.send(format!("{i}"), Flags::NONE).unwrap();
    }
    assert!(started.elapsed() < Duration::from_secs(1));

    // Both marks together bound the queue; the oldest messages survive.
    for i in 0..20 {
        assert_eq!(subscriber.recv(Flags::DONTWAIT).unwrap(), format!("{i}").as_str());
    }
    assert!(matches!(
        subscriber.recv(Flags::DONTWAIT),
        Err(SocketError::WouldBlock)
    ));
}

#[test]
fn fair_queues_across_publishers() {
    let ctx = Context::new();
    let left = ctx.socket(SocketType::Pub).unwrap();
    let right = ctx.socket(SocketType::Pub).unwrap();
    left.bind("inproc://left").unwrap();
    right.bind("inproc://right").unwrap();

    let subscriber = ctx.socket(SocketType::Sub).unwrap();
    subscriber.subscribe("").unwrap();
    subscriber.connect("inproc://left").unwrap();
    subscriber.connect("inproc://right").unwrap();

    for i in 0..3 {
        left.send(format!("L{i}"), Flags::NONE).unwrap();
        right.send(format!("R{i}"), Flags::NONE).unwrap();
    }

    let received: Vec<String> = (0..6)
        .map(|_| subscriber.recv(Flags::DONTWAIT).unwrap().to_string())
        .collect();

    // Neither publisher is starved...
    assert_ne!(received[0].chars().next(), received[1].chars().next());
    // ...and each one's order is preserved.
    let from = |p: char| -> Vec<&String> { received.iter().filter(|m| m.starts_with(p)).collect() };
    assert_eq!(from('L'), ["L0", "L1", "L2"]);
    assert_eq!(from('R'), ["R0", "R1", "R2"]);
}

#[test]
fn lost_subscriber_is_pruned() {
    let ctx = Context::new();
    let (publisher, subscriber) = pub_sub(&ctx, "inproc://gone", &[""]);
    let monitor = publisher.monitor();
    assert_eq!(publisher.peer_count(), 1);

    drop(subscriber);
    publisher.send("into the void", Flags::NONE).unwrap();
    assert_eq!(publisher.peer_count(), 0);
    assert_eq!(
        monitor.try_recv().unwrap(),
        SocketEvent::Disconnected(Endpoint::Inproc("gone".into()))
    );
}

#[test]
fn blocked_recv_wakes_on_matching_message() {
    let ctx = Context::new();
    let (publisher, subscriber) = pub_sub(&ctx, "inproc://wake", &["hit"]);

    thread::scope(|s| {
        let receiver = s.spawn(|| subscriber.recv(Flags::NONE));
        thread::sleep(Duration::from_millis(30));
        publisher.send("miss", Flags::NONE).unwrap();
        publisher.send("hit", Flags::NONE).unwrap();
        assert_eq!(receiver.join().unwrap().unwrap(), "hit");
    });
}

#[test]
fn close_unblocks_pending_recv() {
    let ctx = Context::new();
    let (_publisher, subscriber) = pub_sub(&ctx, "inproc://close-sub", &[""]);

    thread::scope(|s| {
        let receiver = s.spawn(|| subscriber.recv(Flags::NONE));
        thread::sleep(Duration::from_millis(50));
        subscriber.close();
        assert!(matches!(
            receiver.join().unwrap(),
            Err(SocketError::ConnectionClosed)
        ));
    });
}

#[test]
fn wrong_direction_is_not_supported() {
    let ctx = Context::new();
    let (publisher, subscriber) = pub_sub(&ctx, "inproc://direction", &[""]);

    assert!(matches!(
        publisher.recv(Flags::DONTWAIT),
        Err(SocketError::NotSupported { .. })
    ));
    assert!(matches!(
        subscriber.send("up", Flags::NONE),
        Err(SocketError::NotSupported { .. })
    ));
    assert!(matches!(
        publisher.subscribe("x"),
        Err(SocketError::InvalidOption { .. })
    ));
}
